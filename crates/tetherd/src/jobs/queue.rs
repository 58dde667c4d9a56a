//! Shared job queue with encapsulated locking.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Delivery, Job, JobId, JobSnapshot, PollOutcome, SideChannel};

#[derive(Debug, Default)]
struct QueueState {
    last_id: JobId,
    jobs: BTreeMap<JobId, Job>,
}

impl QueueState {
    fn acknowledge(&mut self, id: JobId) -> bool {
        let Some(job) = self.jobs.get_mut(&id).filter(|job| job.finished) else {
            return false;
        };
        if job.background {
            job.rearm();
        } else {
            self.jobs.remove(&id);
        }
        true
    }
}

/// Queue of jobs shared by the network and executor threads.
///
/// Ids are allocated here, start at 1, and are never reused for the life of
/// the queue. Cloning the queue shares the underlying state.
#[derive(Clone, Debug, Default)]
pub struct JobQueue {
    inner: Arc<Mutex<QueueState>>,
}

impl JobQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // A panic elsewhere never leaves a job half-written, so the state
        // behind a poisoned lock is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_job<R>(&self, id: JobId, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        self.lock().jobs.get_mut(&id).map(f)
    }

    /// Allocates the next id and stores the job built for it.
    #[must_use = "the id is the only handle on the new job"]
    pub fn push_with(&self, build: impl FnOnce(JobId) -> Job) -> JobId {
        let mut state = self.lock();
        state.last_id += 1;
        let id = state.last_id;
        let mut job = build(id);
        job.id = id;
        state.jobs.insert(id, job);
        id
    }

    /// Whether a job with `id` exists.
    #[must_use]
    pub fn contains(&self, id: JobId) -> bool {
        self.lock().jobs.contains_key(&id)
    }

    /// Number of jobs held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Whether the queue holds no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().jobs.is_empty()
    }

    /// Highest id handed out so far.
    #[must_use]
    pub fn last_id(&self) -> JobId {
        self.lock().last_id
    }

    /// Copy of a job, for inspection.
    #[must_use]
    pub fn find(&self, id: JobId) -> Option<Job> {
        self.lock().jobs.get(&id).cloned()
    }

    /// Copies the fields needed to execute a job.
    #[must_use]
    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        self.with_job(id, |job| job.snapshot())
    }

    /// Serialized structured request of a job.
    #[must_use]
    pub fn params(&self, id: JobId) -> Option<Vec<u8>> {
        self.with_job(id, |job| job.params.clone())
    }

    /// Stores the typed result produced by a script. Returns `false` when the
    /// job no longer exists.
    #[must_use]
    pub fn set_binary_result(&self, id: JobId, bytes: Vec<u8>) -> bool {
        self.with_job(id, |job| job.binary_result = bytes).is_some()
    }

    /// Stores an error reported by a script. Returns `false` when the job no
    /// longer exists.
    #[must_use]
    pub fn set_error(&self, id: JobId, text: impl Into<String>) -> bool {
        self.with_job(id, |job| job.error = Some(text.into())).is_some()
    }

    /// Typed result and error reported by a script so far.
    #[must_use]
    pub fn side_channel(&self, id: JobId) -> Option<SideChannel> {
        self.with_job(id, |job| job.side_channel())
    }

    /// Stores the serialized response and flags the job finished. Returns
    /// `false` when the job no longer exists.
    #[must_use]
    pub fn mark_finished(&self, id: JobId, result: Vec<u8>) -> bool {
        self.with_job(id, |job| {
            job.result = result;
            job.finished = true;
        })
        .is_some()
    }

    /// Copies the result of a finished job without consuming it.
    #[must_use]
    pub fn peek_finished(&self, id: JobId) -> Option<Delivery> {
        self.lock()
            .jobs
            .get(&id)
            .filter(|job| job.finished)
            .map(Job::delivery)
    }

    /// Records that a finished job's result reached the client.
    ///
    /// A background job is rearmed and keeps its id; any other job is
    /// removed. Returns `false` when the job is missing or unfinished.
    #[must_use]
    pub fn acknowledge(&self, id: JobId) -> bool {
        self.lock().acknowledge(id)
    }

    /// Reports a job's state. A finished result is copied, not consumed;
    /// call [`JobQueue::acknowledge`] once it has been sent.
    #[must_use]
    pub fn poll(&self, id: JobId) -> PollOutcome {
        let state = self.lock();
        match state.jobs.get(&id) {
            None => PollOutcome::NotFound,
            Some(job) if job.finished => PollOutcome::Finished(job.delivery()),
            Some(job) => PollOutcome::Pending {
                background: job.background,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn queue() -> JobQueue {
        JobQueue::new()
    }

    fn push(queue: &JobQueue, background: bool) -> JobId {
        queue.push_with(|id| Job::new(id, format!("job {id}"), Vec::new(), background))
    }

    #[rstest]
    fn ids_increase_and_are_never_reused(queue: JobQueue) {
        let first = push(&queue, false);
        let second = push(&queue, false);
        assert!(queue.mark_finished(second, vec![1]));
        assert!(queue.acknowledge(second));
        let third = push(&queue, false);
        assert_eq!((first, second, third), (1, 2, 3));
        assert_eq!(queue.last_id(), 3);
    }

    #[rstest]
    fn concurrent_pushes_yield_unique_ids(queue: JobQueue) {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || (0..50).map(|_| push(&queue, false)).collect::<Vec<_>>())
            })
            .collect();
        let mut ids: Vec<JobId> = workers
            .into_iter()
            .flat_map(|worker| worker.join().expect("worker thread"))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 200);
        assert_eq!(ids.first(), Some(&1));
        assert_eq!(ids.last(), Some(&200));
    }

    #[rstest]
    fn unfinished_job_is_pending(queue: JobQueue) {
        let id = push(&queue, false);
        assert_eq!(queue.poll(id), PollOutcome::Pending { background: false });
        assert!(queue.peek_finished(id).is_none());
        assert!(!queue.acknowledge(id));
        assert!(queue.contains(id));
    }

    #[rstest]
    fn finished_job_is_delivered_once(queue: JobQueue) {
        let id = push(&queue, false);
        assert!(queue.mark_finished(id, b"done".to_vec()));
        let PollOutcome::Finished(delivery) = queue.poll(id) else {
            panic!("expected a finished job");
        };
        assert_eq!(delivery.result, b"done");
        assert!(!delivery.background);
        assert!(queue.contains(id), "result stays until acknowledged");

        assert!(queue.acknowledge(id));
        assert_eq!(queue.poll(id), PollOutcome::NotFound);
        assert!(!queue.acknowledge(id));
    }

    #[rstest]
    fn background_job_rearms_after_delivery(queue: JobQueue) {
        let id = push(&queue, true);
        assert!(queue.set_binary_result(id, vec![7]));
        assert!(queue.set_error(id, "partial"));
        assert!(queue.mark_finished(id, b"first".to_vec()));

        let delivery = queue.peek_finished(id).expect("finished job");
        assert_eq!(delivery.result, b"first");
        assert!(delivery.background);
        assert!(queue.acknowledge(id));

        let job = queue.find(id).expect("background job retained");
        assert!(!job.is_finished());
        assert!(job.result().is_empty());
        assert_eq!(queue.side_channel(id), Some(SideChannel::default()));
        assert_eq!(queue.poll(id), PollOutcome::Pending { background: true });

        assert!(queue.mark_finished(id, b"second".to_vec()));
        let PollOutcome::Finished(again) = queue.poll(id) else {
            panic!("expected the job to finish again");
        };
        assert_eq!(again.result, b"second");
        assert!(queue.acknowledge(id));
        assert!(queue.contains(id));
    }

    #[rstest]
    fn peek_leaves_the_result_in_place(queue: JobQueue) {
        let id = push(&queue, false);
        assert!(queue.peek_finished(id).is_none());
        assert!(queue.mark_finished(id, b"done".to_vec()));
        let first = queue.peek_finished(id).expect("finished job");
        let second = queue.peek_finished(id).expect("still there");
        assert_eq!(first, second);
    }

    #[rstest]
    fn side_channel_updates_need_a_live_job(queue: JobQueue) {
        assert!(!queue.set_binary_result(9, vec![1]));
        assert!(!queue.set_error(9, "gone"));
        assert!(!queue.mark_finished(9, Vec::new()));
        assert!(queue.side_channel(9).is_none());
    }
}
