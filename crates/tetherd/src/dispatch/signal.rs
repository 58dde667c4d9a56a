//! "Command available" notification from the network thread to the executor.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::jobs::JobId;

/// Raised by intake once a new job is queued and ready to run.
#[cfg_attr(test, mockall::automock)]
pub trait CommandSignal: Send + Sync {
    /// Announces that `job_id` is waiting for execution.
    fn command_available(&self, job_id: JobId);
}

/// Signal backed by the executor's work channel.
#[derive(Debug, Clone)]
pub struct ChannelSignal {
    sender: Sender<JobId>,
}

impl ChannelSignal {
    /// Wraps the sending half of a work channel.
    #[must_use]
    pub const fn new(sender: Sender<JobId>) -> Self {
        Self { sender }
    }
}

impl CommandSignal for ChannelSignal {
    fn command_available(&self, job_id: JobId) {
        if self.sender.send(job_id).is_err() {
            tracing::warn!(
                target: super::DISPATCH_TARGET,
                job_id,
                "executor is gone, job stays queued without running"
            );
        }
    }
}

/// Creates the work channel shared by intake and the executor.
#[must_use]
pub fn work_channel() -> (ChannelSignal, Receiver<JobId>) {
    let (sender, receiver) = unbounded();
    (ChannelSignal::new(sender), receiver)
}
