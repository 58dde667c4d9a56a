//! Job server for the tether protocol.
//!
//! `tetherd` listens on TCP for a single client at a time. Every inbound
//! message is an `Execute` envelope that either submits a script, submits an
//! RPC request, or polls an earlier job. Submitted work is queued in
//! [`jobs::JobQueue`] and run on a dedicated executor thread by an embedded
//! Rhai engine; RPC requests are routed to an [`dispatch::RpcHandler`]
//! supplied by the host. The network thread delivers each finished result to
//! the client that is waiting for it.
//!
//! Startup follows a fixed sequence: load layered configuration through
//! [`tether_config`], install structured telemetry, bind the listening port,
//! then start the executor and network threads. Lifecycle events are routed
//! through a [`ServerReporter`] so operators and tests can observe them.

mod bootstrap;
pub mod dispatch;
mod health;
pub mod jobs;
mod process;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, Runtime, ShutdownFailure, StaticConfigLoader,
    SystemConfigLoader, bootstrap_with,
};
pub use health::{ServerReporter, StructuredServerReporter};
pub use process::{LaunchError, ShutdownError, ShutdownSignal, SystemShutdownSignal, run_daemon};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{Server, ServerHandle, ServerSettings, TransportError};

#[cfg(test)]
mod tests;
