//! Job manager: submits jobs, tracks them in a map, reconciles the map against cluster status.

use crate::{JobError, JobFuture, JobMetadata, ManagerConfig, ManagerError};
use chrono::{DateTime, Utc};
use cluster_types::{ArrayIndex, ClusterError, JobId, JobInfo, JobSyncApi, JobTemplate, KillOption};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

type MetadataMap = HashMap<JobId, Arc<JobMetadata>>;

/// What one call to [`JobManager::check_jobs`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckSummary {
    /// Another check was already running; nothing was done.
    pub skipped: bool,
    /// Jobs that were seen but are not finished yet.
    pub updated: Vec<JobId>,
    /// Jobs whose futures were completed with their final records.
    pub completed: Vec<JobId>,
    /// Jobs whose futures were failed as zombies.
    pub zombies: Vec<JobId>,
    /// Finished jobs dropped from tracking after the retention window.
    pub evicted: Vec<JobId>,
}

impl CheckSummary {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Manager for submitting and monitoring cluster jobs.
///
/// Call [`check_jobs`](Self::check_jobs) periodically (usually through a
/// [`crate::JobMonitor`]) so that futures of submitted jobs get completed.
pub struct JobManager {
    api: Arc<dyn JobSyncApi>,
    config: ManagerConfig,
    /// job id -> latest snapshot. Snapshots are replaced, never mutated.
    jobs: Arc<RwLock<MetadataMap>>,
    check_running: AtomicBool,
}

impl JobManager {
    pub fn new(api: Arc<dyn JobSyncApi>, config: ManagerConfig) -> Self {
        Self {
            api,
            config,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            check_running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Submit one job and start tracking it. No tracking entry is created if the
    /// submission fails.
    pub async fn submit_job(&self, template: &JobTemplate) -> Result<JobFuture, ManagerError> {
        let info = self
            .api
            .submit_job(template)
            .await
            .map_err(ManagerError::Submission)?;
        tracing::debug!(job_id = info.job_id, "submitted job");
        Ok(self.track(info.job_id).await)
    }

    /// Submit a job array with elements `start..=end` and track it as one job.
    ///
    /// # Panics
    ///
    /// If `start > end`.
    pub async fn submit_job_array(
        &self,
        template: &JobTemplate,
        start: ArrayIndex,
        end: ArrayIndex,
    ) -> Result<JobFuture, ManagerError> {
        assert!(
            start <= end,
            "job array start index {start} is past end index {end}"
        );
        let info = self
            .api
            .submit_job_array(template, start, end)
            .await
            .map_err(ManagerError::Submission)?;
        tracing::debug!(job_id = info.job_id, start, end, "submitted job array");
        Ok(self.track(info.job_id).await)
    }

    async fn track(&self, job_id: JobId) -> JobFuture {
        let future = JobFuture::new(job_id);
        let metadata = JobMetadata::new(false, Utc::now(), Vec::new(), future.clone());
        let previous = self.jobs.write().await.insert(job_id, Arc::new(metadata));
        if let Some(previous) = previous {
            // The cluster reused an id we still track.
            if !previous.is_done() {
                self.settle(previous.future(), Err(JobError::Abandoned { job_id }));
            }
        }
        future
    }

    /// Ids of tracked jobs that have not finished, sorted.
    pub async fn running_job_ids(&self) -> Vec<JobId> {
        self.job_ids(false).await
    }

    /// Ids of tracked jobs that have finished (including zombies), sorted.
    pub async fn completed_job_ids(&self) -> Vec<JobId> {
        self.job_ids(true).await
    }

    async fn job_ids(&self, done: bool) -> Vec<JobId> {
        let guard = self.jobs.read().await;
        let mut ids: Vec<JobId> = guard
            .iter()
            .filter(|(_, m)| m.is_done() == done)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Current snapshot for a tracked job.
    pub async fn metadata(&self, job_id: JobId) -> Option<Arc<JobMetadata>> {
        self.jobs.read().await.get(&job_id).cloned()
    }

    /// Latest records for a job; `None` if the job is not tracked. Never queries the cluster.
    pub async fn job_info(&self, job_id: JobId) -> Option<Vec<JobInfo>> {
        self.metadata(job_id)
            .await
            .map(|m| m.last_infos().to_vec())
    }

    /// Latest record for one element of a job array.
    pub async fn job_info_for_index(
        &self,
        job_id: JobId,
        array_index: ArrayIndex,
    ) -> Option<JobInfo> {
        self.metadata(job_id)
            .await
            .and_then(|m| m.info_for_index(array_index).cloned())
    }

    /// Kill a job on the cluster. Tracking is unaffected; the next checks observe the
    /// job's final state like any other.
    pub async fn kill_job(
        &self,
        job_id: JobId,
        options: &[KillOption],
    ) -> Result<(), ManagerError> {
        tracing::info!(job_id, "killing job");
        self.api
            .kill_job(job_id, options)
            .await
            .map_err(ManagerError::Kill)
    }

    pub async fn kill_job_by_name(
        &self,
        job_name: &str,
        options: &[KillOption],
    ) -> Result<(), ManagerError> {
        tracing::info!(job_name, "killing jobs by name");
        self.api
            .kill_job_by_name(job_name, options)
            .await
            .map_err(ManagerError::Kill)
    }

    /// Forget every tracked job. Futures still pending fail with [`JobError::Abandoned`].
    pub async fn clear(&self) {
        tracing::trace!("resetting job metadata map");
        let drained: Vec<(JobId, Arc<JobMetadata>)> = self.jobs.write().await.drain().collect();
        for (job_id, metadata) in drained {
            // A done snapshot's future is settled by whoever installed it.
            if !metadata.is_done() {
                tracing::debug!(job_id, "abandoning job");
                self.settle(metadata.future(), Err(JobError::Abandoned { job_id }));
            }
        }
    }

    /// One reconciliation pass at the current time. See [`check_jobs_at`](Self::check_jobs_at).
    pub async fn check_jobs(&self) -> CheckSummary {
        self.check_jobs_at(Utc::now()).await
    }

    /// One reconciliation pass, treating `now` as the current time.
    ///
    /// Fetches the status of all visible jobs once and, for each tracked job:
    /// - finished: forgotten once older than `keep_completed`;
    /// - reported: snapshot replaced; future completed when every element is terminal;
    /// - not reported: failed as a zombie once unseen for longer than `keep_zombies`.
    ///
    /// A fetch failure counts as "not reported" for every job. Returns immediately with
    /// `skipped` set if another pass is in flight.
    pub async fn check_jobs_at(&self, now: DateTime<Utc>) -> CheckSummary {
        let Some(_guard) = CheckGuard::acquire(&self.check_running) else {
            tracing::trace!("job check already running");
            return CheckSummary::skipped();
        };

        let snapshot: Vec<(JobId, Arc<JobMetadata>)> = {
            let guard = self.jobs.read().await;
            guard.iter().map(|(id, m)| (*id, Arc::clone(m))).collect()
        };
        if snapshot.is_empty() {
            tracing::trace!("no jobs are being monitored");
            return CheckSummary::default();
        }

        let infos = self.fetch_job_info().await;
        let mut by_job = group_by_job(infos);

        let running: Vec<JobId> = snapshot
            .iter()
            .filter(|(_, m)| !m.is_done())
            .map(|(id, _)| *id)
            .collect();
        tracing::debug!(jobs = ?running, "monitoring jobs");
        tracing::info!(count = running.len(), "monitoring jobs");

        let mut summary = CheckSummary::default();
        for (job_id, current) in snapshot {
            let fetched = by_job.remove(&job_id);
            if let Err(e) = self
                .reconcile(job_id, &current, fetched, now, &mut summary)
                .await
            {
                tracing::error!(job_id, error = %e, "error checking job status");
            }
        }
        summary
    }

    async fn reconcile(
        &self,
        job_id: JobId,
        current: &Arc<JobMetadata>,
        fetched: Option<Vec<JobInfo>>,
        now: DateTime<Utc>,
        summary: &mut CheckSummary,
    ) -> Result<(), ManagerError> {
        if current.is_done() {
            if older_than(current.last_updated(), now, self.config.keep_completed)
                && self.remove_if_current(job_id, current).await
            {
                tracing::debug!(job_id, "job is done and was removed from monitoring");
                summary.evicted.push(job_id);
            }
            return Ok(());
        }

        match fetched {
            Some(infos) if !infos.is_empty() => {
                let all_done = infos.iter().all(JobInfo::is_complete);
                let finals = all_done.then(|| infos.clone());
                let next = JobMetadata::new(all_done, now, infos, current.future().clone());
                if !self.replace_if_current(job_id, current, next).await {
                    return Ok(());
                }
                if let Some(finals) = finals {
                    tracing::debug!(job_id, "job has completed");
                    self.settle_checked(current.future(), Ok(finals))?;
                    summary.completed.push(job_id);
                } else {
                    tracing::trace!(job_id, "updating running job");
                    summary.updated.push(job_id);
                }
            }
            _ => {
                if !older_than(current.last_updated(), now, self.config.keep_zombies) {
                    return Ok(());
                }
                let next = JobMetadata::new(
                    true,
                    now,
                    current.last_infos().to_vec(),
                    current.future().clone(),
                );
                if !self.replace_if_current(job_id, current, next).await {
                    return Ok(());
                }
                tracing::warn!(job_id, "removing zombie job");
                self.settle_checked(current.future(), Err(JobError::Zombie { job_id }))?;
                summary.zombies.push(job_id);
                if self.config.kill_zombies {
                    if let Err(e) = self.api.kill_job(job_id, &[]).await {
                        tracing::warn!(job_id, error = %e, "failed to kill zombie job");
                    }
                }
            }
        }
        Ok(())
    }

    async fn fetch_job_info(&self) -> Vec<JobInfo> {
        let fetch = self.api.get_job_info();
        let result = match self.config.fetch_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(result) => result,
                Err(_) => Err(ClusterError::Timeout(limit)),
            },
            None => fetch.await,
        };
        // On failure carry on with nothing, so unseen jobs keep aging toward zombie status.
        result.unwrap_or_else(|e| {
            tracing::error!(error = %e, "error getting job information");
            Vec::new()
        })
    }

    /// Install `next` only if `current` is still the entry for `job_id`.
    async fn replace_if_current(
        &self,
        job_id: JobId,
        current: &Arc<JobMetadata>,
        next: JobMetadata,
    ) -> bool {
        let mut guard = self.jobs.write().await;
        match guard.get_mut(&job_id) {
            Some(entry) if Arc::ptr_eq(entry, current) => {
                *entry = Arc::new(next);
                true
            }
            _ => false,
        }
    }

    async fn remove_if_current(&self, job_id: JobId, current: &Arc<JobMetadata>) -> bool {
        let mut guard = self.jobs.write().await;
        match guard.get(&job_id) {
            Some(entry) if Arc::ptr_eq(entry, current) => {
                guard.remove(&job_id);
                true
            }
            _ => false,
        }
    }

    /// Settle a future the manager owns. A caller may have cancelled it already, which
    /// is fine; any other second settlement is a bug.
    fn settle_checked(
        &self,
        future: &JobFuture,
        outcome: Result<Vec<JobInfo>, JobError>,
    ) -> Result<(), JobError> {
        let result = match outcome {
            Ok(infos) => future.complete(infos),
            Err(e) => future.fail(e),
        };
        match result {
            Err(JobError::AlreadyCompleted { job_id }) if future.is_cancelled() => {
                tracing::debug!(job_id, "job future was cancelled by the caller");
                Ok(())
            }
            other => other,
        }
    }

    fn settle(&self, future: &JobFuture, outcome: Result<Vec<JobInfo>, JobError>) {
        if let Err(e) = self.settle_checked(future, outcome) {
            tracing::error!(job_id = future.job_id(), error = %e, "failed to settle job future");
        }
    }
}

/// Holds the single "check running" flag for the duration of a pass.
struct CheckGuard<'a>(&'a AtomicBool);

impl<'a> CheckGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for CheckGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn group_by_job(infos: Vec<JobInfo>) -> HashMap<JobId, Vec<JobInfo>> {
    let mut map: HashMap<JobId, Vec<JobInfo>> = HashMap::new();
    for info in infos {
        map.entry(info.job_id).or_default().push(info);
    }
    map
}

/// True if strictly more than `window` has passed between `since` and `now`.
fn older_than(since: DateTime<Utc>, now: DateTime<Utc>, window: Duration) -> bool {
    now.signed_duration_since(since)
        .to_std()
        .map(|elapsed| elapsed > window)
        .unwrap_or(false)
}
