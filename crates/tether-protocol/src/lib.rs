//! Wire protocol shared by the tether server and its clients.
//!
//! A client sends one serialized [`wire::Execute`] per logical message and
//! receives one serialized [`wire::Response`] per delivery. Structured
//! requests travel inside `Execute::rpc_request` as a [`wire::RpcRequest`];
//! their typed results travel back inside `Response::rpc_result`.
//!
//! [`Command`] is the typed face of the protocol: it serializes requests and
//! parses responses, applying the per-kind validation rules on the way in.

mod client;
mod commands;
mod errors;
pub mod wire;

pub use client::{
    CONNECTION_TIMEOUT, Client, DEFAULT_IDLE_TIMEOUT, DEFAULT_RESPONSE_TIMEOUT, Session,
};
pub use commands::{
    Command, CommandResponse, CommandResult, ExternalRef, ExternalRefsQuery, ExternalRefsReport,
    MAX_LABEL_BYTES, MemoryRegion, MemoryRegionRead, NameBatch, NameEntry, PeExport, PeHeaders,
    PeHeadersQuery, PeSection, PointerRecord, ResponseHeader, truncate_label,
};
pub use errors::{ClientError, CodecError};

/// Version reported to scripts and in startup logs.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");
