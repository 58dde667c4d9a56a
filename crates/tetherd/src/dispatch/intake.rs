//! Turns one inbound message into a queued job or a poll answer.

use std::sync::Arc;

use prost::Message;

use tether_protocol::wire::{Execute, JobStatus, Response};

use super::{CommandSignal, IntakeError, rpc_entry_script};
use crate::jobs::{Delivery, Job, JobId, JobQueue, PollOutcome};

/// What the network loop should do with an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeAction {
    /// A new job entered the queue and the executor was signalled.
    ///
    /// Background submissions are acknowledged at once with a PENDING
    /// response carrying the job id, so the client can poll it later.
    Queued {
        /// Newly allocated id.
        job_id: JobId,
        /// Whether the job survives delivery.
        background: bool,
        /// Immediate acknowledgement, if any.
        ack: Option<Vec<u8>>,
    },
    /// A poll found the job still running.
    Pending {
        /// Polled job.
        job_id: JobId,
        /// Serialized PENDING response.
        reply: Vec<u8>,
        /// Whether the job survives delivery, in which case the connection
        /// keeps waiting for it.
        background: bool,
    },
    /// A poll found the job finished. The caller acknowledges the result
    /// once it has been sent.
    Delivered(Delivery),
}

/// Request intake shared by every connection.
#[derive(Clone)]
pub struct Intake {
    queue: JobQueue,
    signal: Arc<dyn CommandSignal>,
}

impl Intake {
    /// Builds intake over the shared queue.
    #[must_use]
    pub fn new(queue: JobQueue, signal: Arc<dyn CommandSignal>) -> Self {
        Self { queue, signal }
    }

    /// Handles one logical message.
    ///
    /// A message naming a `job_id` with neither script nor structured
    /// request is a poll and never allocates an id. Everything else becomes
    /// a new job, including submissions that are rejected: those are stored
    /// already finished, holding the error reply, and never reach the
    /// executor.
    ///
    /// # Errors
    ///
    /// Returns an [`IntakeError`] when the message cannot be decoded, when a
    /// structured request also carries script source, or when a poll names
    /// an unknown job.
    pub fn accept(&self, message: &[u8]) -> Result<IntakeAction, IntakeError> {
        let command = Execute::decode(message).map_err(|source| {
            self.reject(String::new(), Vec::new(), |job_id| IntakeError::Decode {
                job_id,
                source: source.clone(),
            })
        })?;
        if !command.rpc_request.is_empty() && !command.script.is_empty() {
            let script = String::from_utf8_lossy(&command.script).into_owned();
            return Err(self.reject(script, command.rpc_request, |job_id| {
                IntakeError::ScriptConflict { job_id }
            }));
        }
        match command.job_id {
            Some(job_id) if command.is_poll() => self.poll(job_id),
            _ => Ok(self.enqueue(command)),
        }
    }

    /// Records a rejected submission under a fresh id and returns the error
    /// naming it.
    fn reject(
        &self,
        script: String,
        params: Vec<u8>,
        rejection: impl Fn(JobId) -> IntakeError,
    ) -> IntakeError {
        let job_id = self.queue.push_with(|id| {
            Job::new(id, script, params, false).with_result(error_response(&rejection(id)))
        });
        rejection(job_id)
    }

    fn poll(&self, job_id: JobId) -> Result<IntakeAction, IntakeError> {
        match self.queue.poll(job_id) {
            PollOutcome::NotFound => Err(IntakeError::JobNotFound(job_id)),
            PollOutcome::Pending { background } => Ok(IntakeAction::Pending {
                job_id,
                reply: pending_response(job_id),
                background,
            }),
            PollOutcome::Finished(delivery) => Ok(IntakeAction::Delivered(delivery)),
        }
    }

    fn enqueue(&self, command: Execute) -> IntakeAction {
        let Execute {
            script,
            script_extern_obj,
            rpc_request,
            background,
            ..
        } = command;
        let structured = !rpc_request.is_empty();
        let job_id = self.queue.push_with(|id| {
            let source = if structured {
                rpc_entry_script(id)
            } else {
                String::from_utf8_lossy(&script).into_owned()
            };
            Job::new(id, source, rpc_request, background).with_extern_object(script_extern_obj)
        });
        self.signal.command_available(job_id);
        IntakeAction::Queued {
            job_id,
            background,
            ack: background.then(|| pending_response(job_id)),
        }
    }
}

/// Serialized PENDING response for `job_id`.
#[must_use]
pub fn pending_response(job_id: JobId) -> Vec<u8> {
    Response {
        job_id: Some(job_id),
        job_status: Some(JobStatus::Pending as i32),
        ..Response::default()
    }
    .encode_to_vec()
}

/// Serialized response reporting an intake error to the client.
#[must_use]
pub fn error_response(error: &IntakeError) -> Vec<u8> {
    Response {
        job_id: Some(error.job_id()),
        error: Some(error.to_string()),
        ..Response::default()
    }
    .encode_to_vec()
}
