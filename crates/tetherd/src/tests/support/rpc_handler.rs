//! Debugger stand-in answering structured requests with fixed data.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tether_protocol::{Command, CommandResult, MemoryRegion, MemoryRegionRead};

use crate::dispatch::{RpcError, RpcHandler};
use crate::jobs::JobId;

const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Two regions resembling a loaded image.
#[must_use]
pub fn sample_regions() -> Vec<MemoryRegion> {
    vec![
        MemoryRegion {
            base: 0x40_0000,
            size: 0x1000,
            access: 0x2,
            name: "app.exe".to_owned(),
        },
        MemoryRegion {
            base: 0x40_1000,
            size: 0x5000,
            access: 0x20,
            name: "app.exe".to_owned(),
        },
    ]
}

/// Holds structured requests back while the simulated debugger is paused.
#[derive(Debug)]
pub struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    #[must_use]
    pub fn open() -> Arc<Self> {
        Arc::new(Self {
            open: Mutex::new(true),
            changed: Condvar::new(),
        })
    }

    pub fn set(&self, open: bool) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = open;
        self.changed.notify_all();
    }

    fn pass(&self) {
        let guard = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let (_guard, timeout) = self
            .changed
            .wait_timeout_while(guard, GATE_TIMEOUT, |open| !*open)
            .unwrap_or_else(PoisonError::into_inner);
        assert!(!timeout.timed_out(), "debugger stayed paused");
    }
}

/// Fills every requested region with a fixed byte.
fn filled(requested: &[MemoryRegionRead]) -> Result<Vec<MemoryRegionRead>, RpcError> {
    requested
        .iter()
        .map(|region| {
            let size = usize::try_from(region.size)
                .map_err(|_| RpcError::Failed(format!("region of {} bytes", region.size)))?;
            Ok(MemoryRegionRead {
                raw: vec![0xcc; size],
                ..region.clone()
            })
        })
        .collect()
}

/// Answers memory map and memory read requests, and refuses everything else.
#[derive(Debug)]
pub struct StubDebugger {
    gate: Arc<Gate>,
}

impl StubDebugger {
    #[must_use]
    pub const fn new(gate: Arc<Gate>) -> Self {
        Self { gate }
    }
}

impl RpcHandler for StubDebugger {
    fn handle(&self, _job_id: JobId, command: &Command) -> Result<Option<CommandResult>, RpcError> {
        self.gate.pass();
        match command {
            Command::GetMemoryMap => Ok(Some(CommandResult::MemoryMap(sample_regions()))),
            Command::ReadMemoryRegions(requested) => {
                Ok(Some(CommandResult::MemoryRegions(filled(requested)?)))
            }
            other => Err(RpcError::Failed(format!(
                "no debuggee for {:?}",
                other.request_type()
            ))),
        }
    }
}
