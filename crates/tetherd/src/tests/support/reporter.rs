//! Test double for [`ServerReporter`] that records events for assertions.

use std::net::SocketAddr;
use std::sync::Mutex;

use tether_config::Config;

use crate::bootstrap::BootstrapError;
use crate::dispatch::IntakeError;
use crate::health::ServerReporter;
use crate::jobs::JobId;
use crate::transport::TransportError;

/// Server events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    BootstrapStarting,
    BootstrapSucceeded,
    BootstrapFailed(String),
    Listening(SocketAddr),
    PortRebound { requested: u16, actual: u16 },
    ClientAccepted(SocketAddr),
    ClientRejected(SocketAddr),
    ClientReplaced { previous: SocketAddr, next: SocketAddr },
    ClientClosed(SocketAddr),
    JobQueued { job_id: JobId, background: bool },
    JobDelivered { job_id: JobId, background: bool },
    ProtocolError(String),
    TransportError(String),
}

/// Records server events for assertions.
#[derive(Debug, Default)]
pub struct RecordingServerReporter {
    events: Mutex<Vec<ServerEvent>>,
}

impl RecordingServerReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<ServerEvent> {
        self.events
            .lock()
            .expect("server reporter mutex poisoned")
            .clone()
    }

    /// Counts recorded events matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&ServerEvent) -> bool) -> usize {
        self.events
            .lock()
            .expect("server reporter mutex poisoned")
            .iter()
            .filter(|event| predicate(event))
            .count()
    }

    fn record(&self, event: ServerEvent) {
        self.events
            .lock()
            .expect("server reporter mutex poisoned")
            .push(event);
    }
}

impl ServerReporter for RecordingServerReporter {
    fn bootstrap_starting(&self) {
        self.record(ServerEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(ServerEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(ServerEvent::BootstrapFailed(error.to_string()));
    }

    fn listening(&self, address: SocketAddr) {
        self.record(ServerEvent::Listening(address));
    }

    fn port_rebound(&self, requested: u16, actual: u16) {
        self.record(ServerEvent::PortRebound { requested, actual });
    }

    fn client_accepted(&self, peer: SocketAddr) {
        self.record(ServerEvent::ClientAccepted(peer));
    }

    fn client_rejected(&self, peer: SocketAddr) {
        self.record(ServerEvent::ClientRejected(peer));
    }

    fn client_replaced(&self, previous: SocketAddr, next: SocketAddr) {
        self.record(ServerEvent::ClientReplaced { previous, next });
    }

    fn client_closed(&self, peer: SocketAddr) {
        self.record(ServerEvent::ClientClosed(peer));
    }

    fn job_queued(&self, job_id: JobId, background: bool) {
        self.record(ServerEvent::JobQueued { job_id, background });
    }

    fn job_delivered(&self, job_id: JobId, background: bool) {
        self.record(ServerEvent::JobDelivered { job_id, background });
    }

    fn protocol_error(&self, _peer: SocketAddr, error: &IntakeError) {
        self.record(ServerEvent::ProtocolError(error.to_string()));
    }

    fn transport_error(&self, error: &TransportError) {
        self.record(ServerEvent::TransportError(error.to_string()));
    }
}
