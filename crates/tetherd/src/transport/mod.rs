//! TCP transport for the job protocol.
//!
//! One thread owns the listening socket and at most one client connection.
//! It accepts clients, reads whole messages with the read-until-idle
//! framer, passes them to request intake, and on every tick delivers the
//! result of the job the client is waiting for.

mod errors;
mod event_loop;
mod framer;
mod listener;
mod server;

pub use self::errors::TransportError;
pub use self::server::{Server, ServerHandle, ServerSettings};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
