//! Server bootstrap orchestration.

use std::net::SocketAddr;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;

use tether_config::{Config, IpFilter, IpFilterParseError};

use crate::dispatch::{
    Executor, ExecutorError, ExecutorHandle, RhaiScriptHost, RpcHandler, work_channel,
};
use crate::health::ServerReporter;
use crate::jobs::JobQueue;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{Server, ServerHandle, ServerSettings, TransportError};

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the server configuration.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that reads defaults, the config file, the environment and the
/// command line.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader that hands out a configuration resolved elsewhere.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps an already resolved configuration.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The configured allow-filter is malformed.
    #[error("invalid IP filter: {source}")]
    IpFilter {
        /// Underlying parse error.
        #[source]
        source: IpFilterParseError,
    },
}

/// Result of a successful bootstrap invocation.
pub struct Daemon {
    config: Config,
    settings: ServerSettings,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn ServerReporter>,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Settings the server will run with.
    #[must_use]
    pub const fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Starts the executor and the network thread.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the listening socket cannot be
    /// bound. The executor is stopped again in that case.
    pub fn start(self, handler: Arc<dyn RpcHandler>) -> Result<Runtime, TransportError> {
        let Self {
            settings, reporter, ..
        } = self;
        let queue = JobQueue::new();
        let (signal, work) = work_channel();
        let host = RhaiScriptHost::new(queue.clone(), handler);
        let executor = Executor::new(queue.clone(), host).spawn(work);
        let server = Server::bind(settings, queue.clone(), Arc::new(signal), reporter)?;
        Ok(Runtime {
            server: server.start(),
            executor,
            queue,
        })
    }
}

/// The running server: network thread, executor thread and their queue.
pub struct Runtime {
    server: ServerHandle,
    executor: ExecutorHandle,
    queue: JobQueue,
}

impl Runtime {
    /// Address clients connect to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Replaces the allow-filter for future connections.
    pub fn set_ip_filter(&self, filter: IpFilter) {
        self.server.set_ip_filter(filter);
    }

    /// Allow-filter currently applied to new connections.
    #[must_use]
    pub fn ip_filter(&self) -> IpFilter {
        self.server.ip_filter()
    }

    /// Shared job queue.
    #[must_use]
    pub const fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Stops both threads and waits for them.
    ///
    /// # Errors
    ///
    /// Reports the first thread that panicked. Both threads are joined
    /// regardless.
    pub fn shutdown(self) -> Result<(), ShutdownFailure> {
        let Self {
            server, executor, ..
        } = self;
        server.stop();
        executor.stop();
        let network = server.join();
        let execution = executor.join();
        network?;
        execution?;
        Ok(())
    }
}

/// A thread that failed to stop cleanly.
#[derive(Debug, Error)]
pub enum ShutdownFailure {
    /// The network thread panicked.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The executor thread panicked.
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Bootstraps the server using the supplied collaborators.
///
/// # Errors
///
/// Returns a [`BootstrapError`] when configuration, telemetry or the
/// allow-filter cannot be set up. The reporter sees the failure first.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn ServerReporter>,
) -> Result<Daemon, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let settings = match ServerSettings::from_config(&config) {
        Ok(settings) => settings,
        Err(source) => {
            let error = BootstrapError::IpFilter { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    reporter.bootstrap_succeeded(&config);
    Ok(Daemon {
        config,
        settings,
        telemetry,
        reporter,
    })
}
