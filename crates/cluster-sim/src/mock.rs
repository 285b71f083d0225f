//! Scripted cluster for tests: queued submit/fetch responses, no processes.

use cluster_types::{
    ArrayIndex, ClusterError, JobId, JobInfo, JobStatus, JobSyncApi, JobTemplate, KillOption,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, Semaphore};

const FIRST_AUTO_JOB_ID: JobId = 1000;

/// One recorded submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRecord {
    pub template: JobTemplate,
    /// `Some((start, end))` for job arrays.
    pub range: Option<(ArrayIndex, ArrayIndex)>,
}

/// Holds fetches open until released, to simulate a slow scheduler.
#[derive(Clone)]
pub struct FetchGate {
    entered: Arc<Notify>,
    permits: Arc<Semaphore>,
}

impl FetchGate {
    fn new() -> Self {
        Self {
            entered: Arc::new(Notify::new()),
            permits: Arc::new(Semaphore::new(0)),
        }
    }

    /// Resolves once a fetch is waiting at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one waiting (or future) fetch through.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    async fn pass(&self) {
        self.entered.notify_one();
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
    }
}

#[derive(Default)]
struct MockState {
    submit_responses: VecDeque<Result<JobInfo, ClusterError>>,
    fetch_responses: VecDeque<Result<Vec<JobInfo>, ClusterError>>,
    /// Repeated once the fetch queue runs dry.
    last_fetch: Vec<JobInfo>,
    next_job_id: JobId,
    submissions: Vec<SubmitRecord>,
    kills: Vec<(String, Vec<KillOption>)>,
    fetch_calls: usize,
}

/// Cluster whose answers are scripted by the test.
///
/// Fetch responses are served in order; when the queue is empty the last successful
/// response is repeated (initially: no jobs). Submissions without a queued response
/// get sequential ids starting at 1000.
pub struct MockSyncApi {
    state: Mutex<MockState>,
    gate: Mutex<Option<FetchGate>>,
}

impl MockSyncApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                next_job_id: FIRST_AUTO_JOB_ID,
                ..Default::default()
            }),
            gate: Mutex::new(None),
        }
    }

    /// Answer the next submission with a pending record for `job_id`.
    pub fn push_submit(&self, job_id: JobId) {
        self.push_submit_result(Ok(JobInfo::new(job_id, JobStatus::Pending)));
    }

    pub fn push_submit_result(&self, result: Result<JobInfo, ClusterError>) {
        self.state().submit_responses.push_back(result);
    }

    /// Answer the next fetch with these records.
    pub fn push_fetch(&self, infos: Vec<JobInfo>) {
        self.state().fetch_responses.push_back(Ok(infos));
    }

    /// Fail the next fetch.
    pub fn push_fetch_error(&self, error: ClusterError) {
        self.state().fetch_responses.push_back(Err(error));
    }

    /// Make every following fetch wait at the returned gate.
    pub fn gate_fetches(&self) -> FetchGate {
        let gate = FetchGate::new();
        *lock(&self.gate) = Some(gate.clone());
        gate
    }

    pub fn submissions(&self) -> Vec<SubmitRecord> {
        self.state().submissions.clone()
    }

    /// Kill requests as (job id or name, options).
    pub fn kills(&self) -> Vec<(String, Vec<KillOption>)> {
        self.state().kills.clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.state().fetch_calls
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    fn submit(&self, record: SubmitRecord) -> Result<JobInfo, ClusterError> {
        let mut state = self.state();
        state.submissions.push(record);
        match state.submit_responses.pop_front() {
            Some(result) => result,
            None => {
                let job_id = state.next_job_id;
                state.next_job_id += 1;
                Ok(JobInfo::new(job_id, JobStatus::Pending))
            }
        }
    }

    async fn fetch(&self) -> Result<Vec<JobInfo>, ClusterError> {
        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
        let mut state = self.state();
        state.fetch_calls += 1;
        match state.fetch_responses.pop_front() {
            Some(Ok(infos)) => {
                state.last_fetch = infos.clone();
                Ok(infos)
            }
            Some(Err(e)) => Err(e),
            None => Ok(state.last_fetch.clone()),
        }
    }
}

impl Default for MockSyncApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobSyncApi for MockSyncApi {
    async fn submit_job(&self, template: &JobTemplate) -> Result<JobInfo, ClusterError> {
        self.submit(SubmitRecord {
            template: template.clone(),
            range: None,
        })
    }

    async fn submit_job_array(
        &self,
        template: &JobTemplate,
        start: ArrayIndex,
        end: ArrayIndex,
    ) -> Result<JobInfo, ClusterError> {
        self.submit(SubmitRecord {
            template: template.clone(),
            range: Some((start, end)),
        })
    }

    async fn get_job_info(&self) -> Result<Vec<JobInfo>, ClusterError> {
        self.fetch().await
    }

    async fn get_job_info_for_user(&self, _user: &str) -> Result<Vec<JobInfo>, ClusterError> {
        self.fetch().await
    }

    async fn get_job_info_by_id(&self, job_id: JobId) -> Result<Vec<JobInfo>, ClusterError> {
        let infos: Vec<JobInfo> = self
            .fetch()
            .await?
            .into_iter()
            .filter(|i| i.job_id == job_id)
            .collect();
        if infos.is_empty() {
            return Err(ClusterError::NotFound(format!("job {job_id}")));
        }
        Ok(infos)
    }

    async fn kill_job(&self, job_id: JobId, options: &[KillOption]) -> Result<(), ClusterError> {
        self.state()
            .kills
            .push((job_id.to_string(), options.to_vec()));
        Ok(())
    }

    async fn kill_job_by_name(
        &self,
        job_name: &str,
        options: &[KillOption],
    ) -> Result<(), ClusterError> {
        self.state()
            .kills
            .push((job_name.to_string(), options.to_vec()));
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fetches_replay_in_order_then_repeat_last() {
        let api = MockSyncApi::new();
        assert!(api.get_job_info().await.unwrap().is_empty());

        api.push_fetch(vec![JobInfo::new(1, JobStatus::Running)]);
        api.push_fetch_error(ClusterError::Transport("down".to_string()));
        api.push_fetch(vec![JobInfo::new(1, JobStatus::Done)]);

        assert_eq!(api.get_job_info().await.unwrap()[0].status, JobStatus::Running);
        assert!(api.get_job_info().await.is_err());
        assert_eq!(api.get_job_info().await.unwrap()[0].status, JobStatus::Done);
        assert_eq!(api.get_job_info().await.unwrap()[0].status, JobStatus::Done);
        assert_eq!(api.fetch_calls(), 5);
    }

    #[tokio::test]
    async fn submissions_use_queue_then_auto_ids() {
        let api = MockSyncApi::new();
        api.push_submit(77);
        let jt = JobTemplate::new("true");
        assert_eq!(api.submit_job(&jt).await.unwrap().job_id, 77);
        assert_eq!(api.submit_job_array(&jt, 1, 4).await.unwrap().job_id, 1000);
        assert_eq!(api.submit_job(&jt).await.unwrap().job_id, 1001);
        let records = api.submissions();
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].range, Some((1, 4)));
    }
}
