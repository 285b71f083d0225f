//! Single-assignment future for the final records of a job or job array.

use crate::JobError;
use cluster_types::{JobId, JobInfo};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

type Outcome = Result<Vec<JobInfo>, JobError>;

struct Shared {
    outcome: Mutex<Option<Outcome>>,
    /// Wakes threads in `blocking_wait`.
    cond: Condvar,
    /// Wakes tasks in `wait`.
    notify: Notify,
}

/// Eventual completion of one job or job array.
///
/// On success the result holds the final record of every array element (one record
/// for a plain job). A non-zero exit is still a success; failures are reserved for
/// jobs the manager gave up on. Clones share the same state.
#[derive(Clone)]
pub struct JobFuture {
    job_id: JobId,
    shared: Arc<Shared>,
}

impl JobFuture {
    pub(crate) fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            shared: Arc::new(Shared {
                outcome: Mutex::new(None),
                cond: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Non-blocking: true once a result or failure is set.
    pub fn is_done(&self) -> bool {
        self.lock().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&*self.lock(), Some(Err(JobError::Cancelled { .. })))
    }

    /// The outcome if already settled.
    pub fn try_result(&self) -> Option<Outcome> {
        self.lock().clone()
    }

    /// Wait until the job is settled.
    pub async fn wait(&self) -> Outcome {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a completion in between is not missed.
            notified.as_mut().enable();
            if let Some(outcome) = self.try_result() {
                return outcome;
            }
            notified.await;
        }
    }

    /// Like [`wait`](Self::wait), failing with [`JobError::Timeout`] after `limit`.
    pub async fn wait_timeout(&self, limit: Duration) -> Outcome {
        match tokio::time::timeout(limit, self.wait()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(JobError::Timeout(limit)),
        }
    }

    /// Block the current thread until settled, or until `limit` elapses.
    ///
    /// For callers outside an async runtime; inside one, use [`wait`](Self::wait).
    pub fn blocking_wait(&self, limit: Option<Duration>) -> Outcome {
        let guard = self.lock();
        match limit {
            None => {
                let guard = self
                    .shared
                    .cond
                    .wait_while(guard, |o| o.is_none())
                    .unwrap_or_else(PoisonError::into_inner);
                (*guard).clone().unwrap_or(Err(JobError::Timeout(Duration::ZERO)))
            }
            Some(limit) => {
                let (guard, _) = self
                    .shared
                    .cond
                    .wait_timeout_while(guard, limit, |o| o.is_none())
                    .unwrap_or_else(PoisonError::into_inner);
                (*guard).clone().unwrap_or(Err(JobError::Timeout(limit)))
            }
        }
    }

    /// Release local waiters with [`JobError::Cancelled`]. Does not touch the job on the
    /// cluster. Returns false if the future was already settled.
    pub fn cancel(&self) -> bool {
        self.settle(Err(JobError::Cancelled {
            job_id: self.job_id,
        }))
        .is_ok()
    }

    pub(crate) fn complete(&self, infos: Vec<JobInfo>) -> Result<(), JobError> {
        self.settle(Ok(infos))
    }

    pub(crate) fn fail(&self, error: JobError) -> Result<(), JobError> {
        self.settle(Err(error))
    }

    fn settle(&self, outcome: Outcome) -> Result<(), JobError> {
        {
            let mut slot = self.lock();
            if slot.is_some() {
                return Err(JobError::AlreadyCompleted {
                    job_id: self.job_id,
                });
            }
            *slot = Some(outcome);
        }
        self.shared.cond.notify_all();
        self.shared.notify.notify_waiters();
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Outcome>> {
        self.shared
            .outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for JobFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobFuture")
            .field("job_id", &self.job_id)
            .field("done", &self.is_done())
            .finish()
    }
}
