//! Job records and the shared queue that owns them.
//!
//! The network thread creates jobs and consumes their results; the executor
//! thread runs them and marks them finished. Both go through [`JobQueue`],
//! which serialises every access behind one lock.

mod queue;

pub use queue::JobQueue;

/// Server-assigned job identifier.
pub type JobId = u64;

/// One unit of work and its delivery state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: JobId,
    script: String,
    params: Vec<u8>,
    extern_object: Vec<u8>,
    background: bool,
    finished: bool,
    result: Vec<u8>,
    binary_result: Vec<u8>,
    error: Option<String>,
}

impl Job {
    /// Creates an unfinished job.
    #[must_use]
    pub fn new(id: JobId, script: impl Into<String>, params: Vec<u8>, background: bool) -> Self {
        Self {
            id,
            script: script.into(),
            params,
            extern_object: Vec::new(),
            background,
            finished: false,
            result: Vec::new(),
            binary_result: Vec::new(),
            error: None,
        }
    }

    /// Attaches the JSON extern object bound into the script environment.
    #[must_use]
    pub fn with_extern_object(mut self, extern_object: Vec<u8>) -> Self {
        self.extern_object = extern_object;
        self
    }

    /// Stores a finished result up front, for jobs that are answered without
    /// running.
    #[must_use]
    pub fn with_result(mut self, result: Vec<u8>) -> Self {
        self.result = result;
        self.finished = true;
        self
    }

    /// Identifier.
    #[must_use]
    pub const fn id(&self) -> JobId {
        self.id
    }

    /// Whether the job survives delivery.
    #[must_use]
    pub const fn is_background(&self) -> bool {
        self.background
    }

    /// Whether a result is waiting to be delivered.
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.finished
    }

    /// Serialized response stored by the last completion.
    #[must_use]
    pub fn result(&self) -> &[u8] {
        &self.result
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            script: self.script.clone(),
            params: self.params.clone(),
            extern_object: self.extern_object.clone(),
            background: self.background,
        }
    }

    fn side_channel(&self) -> SideChannel {
        SideChannel {
            binary_result: self.binary_result.clone(),
            error: self.error.clone(),
        }
    }

    fn delivery(&self) -> Delivery {
        Delivery {
            job_id: self.id,
            result: self.result.clone(),
            background: self.background,
        }
    }

    /// Clears per-delivery state so a background job can finish again.
    fn rearm(&mut self) {
        self.finished = false;
        self.result.clear();
        self.binary_result.clear();
        self.error = None;
    }
}

/// Copy of the fields an execution host needs, taken under the queue lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    /// Identifier.
    pub id: JobId,
    /// Script source to run.
    pub script: String,
    /// Serialized structured request, empty for plain scripts.
    pub params: Vec<u8>,
    /// JSON extern object, possibly empty.
    pub extern_object: Vec<u8>,
    /// Whether the job survives delivery.
    pub background: bool,
}

/// Data a running script hands back besides its output streams.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SideChannel {
    /// Serialized typed result.
    pub binary_result: Vec<u8>,
    /// Error text reported by the script.
    pub error: Option<String>,
}

/// A finished job's result, copied out of the queue for sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Job the result belongs to.
    pub job_id: JobId,
    /// Serialized response.
    pub result: Vec<u8>,
    /// Whether the job stays in the queue after this delivery.
    pub background: bool,
}

/// Answer to a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// No job has that id.
    NotFound,
    /// The job exists but has not finished.
    Pending {
        /// Whether the job survives delivery.
        background: bool,
    },
    /// The job finished. The result stays queued until acknowledged.
    Finished(Delivery),
}
