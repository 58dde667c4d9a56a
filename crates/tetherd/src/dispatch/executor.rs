//! Execution thread.
//!
//! The executor receives job ids from the work channel, copies the job out of
//! the queue, runs it through a [`ScriptHost`] without holding the queue
//! lock, and stores the finished response back into the queue. The network
//! thread picks the response up on its next tick.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select};
use prost::Message;
use tracing::{debug, warn};

use tether_protocol::wire::{JobStatus, Response};

use super::{DISPATCH_TARGET, ExecutorError};
use crate::jobs::{JobId, JobQueue, JobSnapshot, SideChannel};

/// Error text attached to every response whose script did not complete.
pub const GENERIC_FAILURE: &str = "An error occurred";

/// Output streams captured while a script ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    /// Text printed to standard output.
    pub std_out: String,
    /// Text printed to standard error.
    pub std_err: String,
}

/// How a script run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The script ran to completion.
    Completed(Captured),
    /// The script raised an error. Output produced before it is kept.
    Failed {
        /// Output captured up to the failure.
        captured: Captured,
        /// Host-specific description.
        reason: String,
    },
    /// The host itself faulted while running the script.
    Trapped {
        /// Output captured before the fault. Standard error is replaced by
        /// the fault description in the response.
        captured: Captured,
        /// Description of the fault.
        reason: String,
    },
}

/// Runs one job and reports how it went.
#[cfg_attr(test, mockall::automock)]
pub trait ScriptHost: Send {
    /// Executes the job. Typed results and errors are written to the queue
    /// by id while the script runs.
    fn run(&mut self, job: &JobSnapshot) -> ExecutionOutcome;
}

/// Drives a [`ScriptHost`] from the work channel.
pub struct Executor<H> {
    queue: JobQueue,
    host: H,
}

impl<H: ScriptHost> Executor<H> {
    /// Builds an executor over a shared queue.
    #[must_use]
    pub const fn new(queue: JobQueue, host: H) -> Self {
        Self { queue, host }
    }

    /// Runs one job and marks it finished. Returns `false` when the job is no
    /// longer queued, either before the run or after it.
    pub fn execute(&mut self, job_id: JobId) -> bool {
        let Some(job) = self.queue.snapshot(job_id) else {
            debug!(target: DISPATCH_TARGET, job_id, "job vanished before execution");
            return false;
        };
        let host = &mut self.host;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| host.run(&job)))
            .unwrap_or_else(|payload| ExecutionOutcome::Trapped {
                captured: Captured::default(),
                reason: panic_reason(payload.as_ref()),
            });
        let side_channel = self.queue.side_channel(job_id).unwrap_or_default();
        let response = finished_response(job_id, outcome, side_channel);
        self.queue.mark_finished(job_id, response.encode_to_vec())
    }

    /// Moves the executor onto its own thread.
    #[must_use = "dropping the handle stops the executor"]
    pub fn spawn(self, work: Receiver<JobId>) -> ExecutorHandle
    where
        H: 'static,
    {
        let (stop, stopped) = bounded(1);
        let handle = thread::spawn(move || self.run(&work, &stopped));
        ExecutorHandle {
            stop,
            handle: Some(handle),
        }
    }

    fn run(mut self, work: &Receiver<JobId>, stopped: &Receiver<()>) {
        debug!(target: DISPATCH_TARGET, "executor active");
        loop {
            select! {
                recv(work) -> message => match message {
                    Ok(job_id) => {
                        if !self.execute(job_id) {
                            debug!(target: DISPATCH_TARGET, job_id, "result discarded");
                        }
                    }
                    Err(_) => break,
                },
                recv(stopped) -> _ => break,
            }
        }
        debug!(target: DISPATCH_TARGET, "executor stopped");
    }
}

/// Handle to the executor thread.
pub struct ExecutorHandle {
    stop: Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ExecutorHandle {
    /// Asks the executor to stop once the job in flight, if any, completes.
    pub fn stop(&self) {
        // A full channel means a stop is already pending.
        if let Err(TrySendError::Disconnected(())) = self.stop.try_send(()) {
            debug!(target: DISPATCH_TARGET, "executor already exited");
        }
    }

    /// Waits for the executor thread to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::ThreadPanic`] if the thread panicked.
    pub fn join(mut self) -> Result<(), ExecutorError> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ExecutorError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ExecutorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Builds the FINISHED response stored for a completed run.
///
/// A failed run carries [`GENERIC_FAILURE`]. An error reported by the script
/// through the side channel is appended after `\r\n`, or stands alone when
/// the run itself succeeded.
pub(crate) fn finished_response(
    job_id: JobId,
    outcome: ExecutionOutcome,
    side_channel: SideChannel,
) -> Response {
    let (captured, failed) = match outcome {
        ExecutionOutcome::Completed(captured) => (captured, false),
        ExecutionOutcome::Failed { captured, reason } => {
            debug!(target: DISPATCH_TARGET, job_id, %reason, "script failed");
            (captured, true)
        }
        ExecutionOutcome::Trapped { captured, reason } => {
            warn!(target: DISPATCH_TARGET, job_id, %reason, "script host trapped");
            let std_err = format!("An exception occurred: {reason}");
            (Captured { std_err, ..captured }, true)
        }
    };
    let reported = side_channel.error.filter(|text| !text.is_empty());
    let error = match (failed, reported) {
        (true, Some(text)) => Some(format!("{GENERIC_FAILURE}\r\n{text}")),
        (true, None) => Some(GENERIC_FAILURE.to_owned()),
        (false, text) => text,
    };
    Response {
        job_id: Some(job_id),
        std_out: captured.std_out,
        std_err: captured.std_err,
        error,
        job_status: Some(JobStatus::Finished as i32),
        rpc_result: side_channel.binary_result,
    }
}

pub(crate) fn panic_reason(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown fault".to_owned())
}
