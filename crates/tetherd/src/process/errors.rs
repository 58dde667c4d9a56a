//! Defines the unified error surface for server launch and supervision.

use std::sync::Arc;

use ortho_config::OrthoError;
use thiserror::Error;

use crate::bootstrap::{BootstrapError, ShutdownFailure};
use crate::transport::TransportError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Bootstrapping the server failed.
    #[error("server bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// The listening socket could not be bound.
    #[error("server transport failed: {source}")]
    Transport {
        /// Underlying transport error.
        #[source]
        source: TransportError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// A server thread did not stop cleanly.
    #[error("server threads failed to stop: {source}")]
    Stop {
        /// Thread that failed.
        #[source]
        source: ShutdownFailure,
    },
}

impl From<Arc<OrthoError>> for LaunchError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Config { source }
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        match source {
            BootstrapError::Configuration { source } => Self::Config { source },
            other => Self::Bootstrap { source: other },
        }
    }
}

impl From<TransportError> for LaunchError {
    fn from(source: TransportError) -> Self {
        Self::Transport { source }
    }
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<ShutdownFailure> for LaunchError {
    fn from(source: ShutdownFailure) -> Self {
        Self::Stop { source }
    }
}
