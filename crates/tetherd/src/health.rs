//! Structured reporting of server lifecycle events.
//!
//! [`ServerReporter::port_rebound`] is the host notification raised when the
//! preferred port was taken and the server moved to another one.

use std::net::SocketAddr;
use std::sync::Arc;

use tether_config::Config;

use crate::bootstrap::BootstrapError;
use crate::dispatch::IntakeError;
use crate::jobs::JobId;
use crate::transport::TransportError;

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait ServerReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked once the listening socket is bound.
    fn listening(&self, address: SocketAddr);

    /// Invoked when the preferred port was unavailable.
    fn port_rebound(&self, requested: u16, actual: u16);

    /// Invoked when a peer becomes the active client.
    fn client_accepted(&self, peer: SocketAddr);

    /// Invoked when the allow-filter turns a peer away.
    fn client_rejected(&self, peer: SocketAddr);

    /// Invoked when a new client displaces the active one.
    fn client_replaced(&self, previous: SocketAddr, next: SocketAddr);

    /// Invoked when the active client connection is released.
    fn client_closed(&self, peer: SocketAddr);

    /// Invoked when a new job enters the queue.
    fn job_queued(&self, job_id: JobId, background: bool);

    /// Invoked after a job result was written to a client.
    fn job_delivered(&self, job_id: JobId, background: bool);

    /// Invoked when a client message is answered with an error.
    fn protocol_error(&self, peer: SocketAddr, error: &IntakeError);

    /// Invoked on socket failures. The loop keeps serving afterwards.
    fn transport_error(&self, error: &TransportError);
}

impl<T> ServerReporter for Arc<T>
where
    T: ServerReporter + ?Sized,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn listening(&self, address: SocketAddr) {
        (**self).listening(address);
    }

    fn port_rebound(&self, requested: u16, actual: u16) {
        (**self).port_rebound(requested, actual);
    }

    fn client_accepted(&self, peer: SocketAddr) {
        (**self).client_accepted(peer);
    }

    fn client_rejected(&self, peer: SocketAddr) {
        (**self).client_rejected(peer);
    }

    fn client_replaced(&self, previous: SocketAddr, next: SocketAddr) {
        (**self).client_replaced(previous, next);
    }

    fn client_closed(&self, peer: SocketAddr) {
        (**self).client_closed(peer);
    }

    fn job_queued(&self, job_id: JobId, background: bool) {
        (**self).job_queued(job_id, background);
    }

    fn job_delivered(&self, job_id: JobId, background: bool) {
        (**self).job_delivered(job_id, background);
    }

    fn protocol_error(&self, peer: SocketAddr, error: &IntakeError) {
        (**self).protocol_error(peer, error);
    }

    fn transport_error(&self, error: &TransportError) {
        (**self).transport_error(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredServerReporter;

impl StructuredServerReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ServerReporter for StructuredServerReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting server bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            listen = %config.listen_address(),
            ip_filter = %config.ip_filter,
            log_filter = %config.log_filter(),
            log_format = ?config.log_format(),
            "server bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "server bootstrap failed"
        );
    }

    fn listening(&self, address: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listening",
            %address,
            "server listening"
        );
    }

    fn port_rebound(&self, requested: u16, actual: u16) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "port_rebound",
            requested,
            actual,
            "serving port differs from the configured one"
        );
    }

    fn client_accepted(&self, peer: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "client_accepted",
            %peer,
            "client connected"
        );
    }

    fn client_rejected(&self, peer: SocketAddr) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "client_rejected",
            %peer,
            "client refused by IP filter"
        );
    }

    fn client_replaced(&self, previous: SocketAddr, next: SocketAddr) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "client_replaced",
            %previous,
            %next,
            "closing previous client in favour of new connection"
        );
    }

    fn client_closed(&self, peer: SocketAddr) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "client_closed",
            %peer,
            "client connection released"
        );
    }

    fn job_queued(&self, job_id: JobId, background: bool) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "job_queued",
            job_id,
            background,
            "new request pushed"
        );
    }

    fn job_delivered(&self, job_id: JobId, background: bool) {
        tracing::debug!(
            target: HEALTH_TARGET,
            event = "job_delivered",
            job_id,
            background,
            "response sent"
        );
    }

    fn protocol_error(&self, peer: SocketAddr, error: &IntakeError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "protocol_error",
            %peer,
            job_id = error.job_id(),
            error = %error,
            "request rejected"
        );
    }

    fn transport_error(&self, error: &TransportError) {
        tracing::warn!(
            target: HEALTH_TARGET,
            event = "transport_error",
            error = %error,
            "socket error"
        );
    }
}
