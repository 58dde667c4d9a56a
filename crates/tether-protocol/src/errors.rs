//! Error types for command serialization and response parsing.

use thiserror::Error;

use crate::wire::RequestType;

/// Errors surfaced by the command codec.
///
/// Parsing never panics past the codec boundary. A failed parse leaves the
/// caller's command untouched, so no partial result is ever observed.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The response buffer was empty.
    #[error("response envelope is empty")]
    EmptyEnvelope,

    /// An envelope or payload could not be decoded.
    #[error("failed to decode {what}: {source}")]
    Decode {
        /// Which message failed to decode.
        what: &'static str,
        /// Underlying protobuf error.
        #[source]
        source: prost::DecodeError,
    },

    /// An envelope could not be encoded.
    #[error("failed to encode {what}: {source}")]
    Encode {
        /// Which message failed to encode.
        what: &'static str,
        /// Underlying protobuf error.
        #[source]
        source: prost::EncodeError,
    },

    /// A region read result disagrees with the region that was requested.
    #[error(
        "region {index} mismatch: requested {expected_base:#x}+{expected_size:#x}, \
         received {actual_base:#x}+{actual_size:#x}"
    )]
    RegionMismatch {
        /// Position of the offending record.
        index: usize,
        /// Base of the requested region.
        expected_base: u64,
        /// Size of the requested region.
        expected_size: u64,
        /// Base reported by the debugger.
        actual_base: u64,
        /// Size reported by the debugger.
        actual_size: u64,
    },

    /// The request envelope carries a type the codec does not know.
    #[error("unsupported request type {0:?}")]
    UnsupportedRequest(RequestType),

    /// The payload does not match the declared request type.
    #[error("payload does not match request type {0:?}")]
    PayloadMismatch(RequestType),
}

impl CodecError {
    /// Wraps a protobuf decode error.
    #[must_use]
    pub const fn decode(what: &'static str, source: prost::DecodeError) -> Self {
        Self::Decode { what, source }
    }

    /// Returns `true` for errors raised by the positional region check.
    #[must_use]
    pub const fn is_consistency_error(&self) -> bool {
        matches!(self, Self::RegionMismatch { .. })
    }
}

/// Errors surfaced by the blocking [`crate::Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server address could not be resolved.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        /// Endpoint as given by the caller.
        endpoint: String,
        /// Underlying resolver error.
        #[source]
        source: std::io::Error,
    },

    /// The connection could not be established.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint the client dialled.
        endpoint: String,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// Reading from or writing to the connection failed.
    #[error("connection I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// No response arrived before the deadline.
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),

    /// The server closed the connection without responding.
    #[error("server closed the connection without a response")]
    Closed,

    /// The response could not be parsed.
    #[error(transparent)]
    Codec(#[from] CodecError),
}
