//! Structured request handling.
//!
//! The debugger integration decides what a memory map or a name batch means.
//! This crate only routes decoded commands to an [`RpcHandler`] and stores
//! whatever typed result it returns.

use tether_protocol::wire::RequestType;
use tether_protocol::{Command, CommandResult};

use super::RpcError;
use crate::jobs::JobId;

/// Domain handler for structured requests.
#[cfg_attr(test, mockall::automock)]
pub trait RpcHandler: Send + Sync {
    /// Runs `command` on behalf of `job_id`.
    ///
    /// `Ok(None)` is a success without a typed result, as for name and
    /// comment batches.
    ///
    /// # Errors
    ///
    /// Returns an [`RpcError`] describing why the request failed. The text
    /// is attached to the job's response.
    fn handle(&self, job_id: JobId, command: &Command) -> Result<Option<CommandResult>, RpcError>;
}

/// Handler installed when no debugger integration is present.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedRpcHandler;

impl RpcHandler for UnsupportedRpcHandler {
    fn handle(&self, _job_id: JobId, command: &Command) -> Result<Option<CommandResult>, RpcError> {
        Err(RpcError::Unsupported(
            command.request_type().unwrap_or(RequestType::Unknown),
        ))
    }
}
