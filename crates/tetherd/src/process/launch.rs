//! Supervises server launch sequencing and runtime orchestration.

use std::sync::Arc;

use tracing::info;

use crate::bootstrap::{ConfigLoader, SystemConfigLoader, bootstrap_with};
use crate::dispatch::{RpcHandler, UnsupportedRpcHandler};
use crate::health::{ServerReporter, StructuredServerReporter};

use super::PROCESS_TARGET;
use super::errors::LaunchError;
use super::shutdown::{ShutdownSignal, SystemShutdownSignal};

/// Collaborators required to launch the server runtime.
pub(crate) struct LaunchPlan<L, S> {
    pub(crate) loader: L,
    pub(crate) shutdown: S,
    pub(crate) reporter: Arc<dyn ServerReporter>,
    pub(crate) handler: Arc<dyn RpcHandler>,
}

/// Runs the server using the production collaborators.
///
/// No debugger is attached in the standalone binary, so RPC requests are
/// answered with an unsupported-request error.
///
/// # Errors
///
/// Returns a [`LaunchError`] when bootstrap, binding or shutdown fails.
pub fn run_daemon() -> Result<(), LaunchError> {
    let plan = LaunchPlan {
        loader: SystemConfigLoader,
        shutdown: SystemShutdownSignal,
        reporter: Arc::new(StructuredServerReporter::new()),
        handler: Arc::new(UnsupportedRpcHandler),
    };
    run_daemon_with(plan)
}

/// Runs the server with injected collaborators.
pub(crate) fn run_daemon_with<L, S>(plan: LaunchPlan<L, S>) -> Result<(), LaunchError>
where
    L: ConfigLoader,
    S: ShutdownSignal,
{
    let LaunchPlan {
        loader,
        shutdown,
        reporter,
        handler,
    } = plan;

    info!(target: PROCESS_TARGET, "starting server runtime");
    let daemon = bootstrap_with(&loader, reporter)?;
    let runtime = daemon.start(handler)?;
    info!(
        target: PROCESS_TARGET,
        address = %runtime.local_addr(),
        "server ready"
    );

    let waited = shutdown.wait();
    let stopped = runtime.shutdown();
    waited?;
    stopped?;
    info!(target: PROCESS_TARGET, "shutdown sequence completed");
    Ok(())
}
