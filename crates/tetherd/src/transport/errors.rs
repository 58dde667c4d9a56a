//! Error types for socket operations.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced while binding, serving or tearing down connections.
///
/// None of these stop the event loop; they are reported and the affected
/// connection is dropped.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured host could not be resolved.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Host as configured.
        host: String,
        /// Port as configured.
        port: u16,
        /// Resolver error.
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no addresses.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Host as configured.
        host: String,
        /// Port as configured.
        port: u16,
    },
    /// Binding failed for a reason other than the port being taken.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address the bind was attempted on.
        addr: SocketAddr,
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// Every port from the requested one upwards was taken.
    #[error("no free port from {first} upwards on {host}")]
    PortsExhausted {
        /// Host the scan ran on.
        host: String,
        /// First port tried.
        first: u16,
    },
    /// A socket option could not be applied.
    #[error("failed to configure socket: {source}")]
    Configure {
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// Accepting a pending connection failed.
    #[error("failed to accept connection: {source}")]
    Accept {
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// Reading from the client failed.
    #[error("failed to read from {peer}: {source}")]
    Read {
        /// Client address.
        peer: SocketAddr,
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// Writing to the client failed.
    #[error("failed to send to {peer}: {source}")]
    Send {
        /// Client address.
        peer: SocketAddr,
        /// Socket error.
        #[source]
        source: io::Error,
    },
    /// The client stopped draining a delivery.
    #[error("sending to {peer} did not complete within {timeout:?}")]
    SendTimeout {
        /// Client address.
        peer: SocketAddr,
        /// Configured send bound.
        timeout: Duration,
    },
    /// An inbound message grew past the configured cap.
    #[error("message from {peer} exceeds {limit} bytes")]
    MessageTooLarge {
        /// Client address.
        peer: SocketAddr,
        /// Configured cap in bytes.
        limit: usize,
    },
    /// The network thread panicked and could not be joined cleanly.
    #[error("server thread panicked")]
    ThreadPanic,
}
