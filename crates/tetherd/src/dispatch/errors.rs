//! Error types for request intake and job execution.
//!
//! Intake errors are answered to the client as the `error` text of a
//! response. Their display strings are therefore part of the wire contract
//! and kept identical to what deployed clients expect.

use thiserror::Error;

use tether_protocol::CodecError;
use tether_protocol::wire::RequestType;

use crate::jobs::JobId;

/// Errors raised while turning an inbound message into a job or a poll.
///
/// A rejected submission still consumes a job id. The job is recorded as
/// finished with the error reply so the id stays meaningful to the client.
#[derive(Debug, Error)]
pub enum IntakeError {
    /// The message is not a serialized `Execute` envelope.
    #[error("Unable to parse command")]
    Decode {
        /// Id recorded for the rejected message.
        job_id: JobId,
        /// Protobuf failure.
        #[source]
        source: prost::DecodeError,
    },

    /// A structured request arrived together with script source.
    #[error("RPC request can't have 'script' value")]
    ScriptConflict {
        /// Id recorded for the rejected message.
        job_id: JobId,
    },

    /// A poll named a job the queue does not hold.
    #[error("Job not found")]
    JobNotFound(JobId),
}

impl IntakeError {
    /// Job id echoed in the error reply.
    #[must_use]
    pub const fn job_id(&self) -> JobId {
        match self {
            Self::Decode { job_id, .. } | Self::ScriptConflict { job_id } => *job_id,
            Self::JobNotFound(job_id) => *job_id,
        }
    }

    /// Job recorded for the rejected message, which the caller retires once
    /// the reply is sent. Polls for unknown jobs record nothing.
    #[must_use]
    pub const fn recorded_job(&self) -> Option<JobId> {
        match self {
            Self::Decode { job_id, .. } | Self::ScriptConflict { job_id } => Some(*job_id),
            Self::JobNotFound(_) => None,
        }
    }
}

/// Errors surfaced by structured request handlers.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The job's parameters could not be decoded into a command.
    #[error("failed to decode RPC request: {0}")]
    Codec(#[from] CodecError),

    /// The job holding the parameters no longer exists.
    #[error("job {0} not found")]
    MissingJob(JobId),

    /// The host does not implement the request kind.
    #[error("request type {0:?} is not supported by this host")]
    Unsupported(RequestType),

    /// The handler ran and reported a failure.
    #[error("{0}")]
    Failed(String),
}

/// Errors raised while managing the executor thread.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The thread running scripts panicked outside a job.
    #[error("executor thread panicked")]
    ThreadPanic,
}
