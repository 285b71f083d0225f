//! Cluster access backed by local subprocesses.

use chrono::{Local, NaiveDateTime};
use cluster_types::{
    expand_array_path, ArrayIndex, ClusterError, JobId, JobInfo, JobStatus, JobSyncApi,
    JobTemplate, KillOption,
};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;

/// Environment variable holding the element index of a job array element.
pub const ARRAY_INDEX_ENV: &str = "JOB_ARRAY_INDEX";

const LOCAL_QUEUE: &str = "local";
const SPAWN_FAILED_EXIT_CODE: i32 = 127;

type ElementKey = (JobId, Option<ArrayIndex>);
type ElementMap = BTreeMap<ElementKey, Element>;

struct Element {
    info: JobInfo,
    /// Present while the process may still be running.
    kill_tx: Option<oneshot::Sender<KillRequest>>,
}

#[derive(Debug)]
struct KillRequest {
    mark_done: bool,
    reason: Option<String>,
}

/// Runs every job, or every element of a job array, as a process on this host.
///
/// Finished records stay visible, like a scheduler's recent-jobs history, until
/// [`forget`](Self::forget) drops them. Must be used from within a tokio runtime.
pub struct LocalSyncApi {
    next_job_id: AtomicU64,
    user: String,
    host: String,
    jobs: Arc<Mutex<ElementMap>>,
}

impl LocalSyncApi {
    pub fn new() -> Self {
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "local".to_string());
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
        Self {
            next_job_id: AtomicU64::new(1),
            user,
            host,
            jobs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Ids start at `first_job_id` instead of 1.
    pub fn with_first_job_id(self, first_job_id: JobId) -> Self {
        self.next_job_id.store(first_job_id, Ordering::Relaxed);
        self
    }

    /// User every local job is reported under.
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Drop all records of a job, as if the scheduler purged them. A still running
    /// process keeps running but is no longer reported. Returns false for unknown ids.
    pub fn forget(&self, job_id: JobId) -> bool {
        let mut jobs = lock(&self.jobs);
        let before = jobs.len();
        jobs.retain(|(id, _), _| *id != job_id);
        before != jobs.len()
    }

    fn submit_elements(
        &self,
        template: &JobTemplate,
        indices: Vec<Option<ArrayIndex>>,
    ) -> Result<JobInfo, ClusterError> {
        if template.command.trim().is_empty() {
            return Err(ClusterError::InvalidTemplate(
                "command must not be empty".to_string(),
            ));
        }
        if !template.native_spec.is_empty() {
            tracing::trace!(options = ?template.native_spec, "ignoring native options");
        }
        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        let submitted = now();
        let mut jobs = lock(&self.jobs);
        for index in indices {
            let info = JobInfo {
                array_index: index,
                name: template.job_name.clone(),
                from_host: Some(self.host.clone()),
                queue: Some(LOCAL_QUEUE.to_string()),
                req_slots: Some(1),
                submit_time: Some(submitted),
                ..JobInfo::new(job_id, JobStatus::Pending)
            };
            let (kill_tx, kill_rx) = oneshot::channel();
            jobs.insert(
                (job_id, index),
                Element {
                    info,
                    kill_tx: Some(kill_tx),
                },
            );
            tokio::spawn(run_element(
                Arc::clone(&self.jobs),
                (job_id, index),
                template.clone(),
                self.host.clone(),
                kill_rx,
            ));
        }
        tracing::info!(job_id, command = %template.command, "started local job");
        let mut info = JobInfo::new(job_id, JobStatus::Pending);
        info.name = template.job_name.clone();
        Ok(info)
    }

    fn snapshot<F>(&self, filter: F) -> Vec<JobInfo>
    where
        F: Fn(&JobInfo) -> bool,
    {
        lock(&self.jobs)
            .values()
            .map(|e| &e.info)
            .filter(|&i| filter(i))
            .cloned()
            .collect()
    }

    /// Send a kill request to every still running element matching `select`.
    /// Returns the number of matching elements, running or not.
    fn kill_matching<F>(&self, select: F, options: &[KillOption]) -> usize
    where
        F: Fn(&JobInfo) -> bool,
    {
        let mut jobs = lock(&self.jobs);
        let mut matched = 0;
        for element in jobs.values_mut().filter(|e| select(&e.info)) {
            matched += 1;
            if let Some(kill_tx) = element.kill_tx.take() {
                let request = KillRequest {
                    mark_done: KillOption::marks_done(options),
                    reason: KillOption::reason(options).map(str::to_string),
                };
                if kill_tx.send(request).is_err() {
                    tracing::debug!(job_id = element.info.job_id, "job process already exited");
                }
            }
        }
        matched
    }
}

impl Default for LocalSyncApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobSyncApi for LocalSyncApi {
    async fn submit_job(&self, template: &JobTemplate) -> Result<JobInfo, ClusterError> {
        self.submit_elements(template, vec![None])
    }

    async fn submit_job_array(
        &self,
        template: &JobTemplate,
        start: ArrayIndex,
        end: ArrayIndex,
    ) -> Result<JobInfo, ClusterError> {
        if start > end {
            return Err(ClusterError::InvalidTemplate(format!(
                "array range {start}-{end} is empty"
            )));
        }
        self.submit_elements(template, (start..=end).map(Some).collect())
    }

    async fn get_job_info(&self) -> Result<Vec<JobInfo>, ClusterError> {
        Ok(self.snapshot(|_| true))
    }

    async fn get_job_info_for_user(&self, user: &str) -> Result<Vec<JobInfo>, ClusterError> {
        if user == self.user {
            Ok(self.snapshot(|_| true))
        } else {
            Ok(Vec::new())
        }
    }

    async fn get_job_info_by_id(&self, job_id: JobId) -> Result<Vec<JobInfo>, ClusterError> {
        let infos = self.snapshot(|i| i.job_id == job_id);
        if infos.is_empty() {
            return Err(ClusterError::NotFound(format!("job {job_id}")));
        }
        Ok(infos)
    }

    async fn kill_job(&self, job_id: JobId, options: &[KillOption]) -> Result<(), ClusterError> {
        match self.kill_matching(|i| i.job_id == job_id, options) {
            0 => Err(ClusterError::NotFound(format!("job {job_id}"))),
            _ => Ok(()),
        }
    }

    async fn kill_job_by_name(
        &self,
        job_name: &str,
        options: &[KillOption],
    ) -> Result<(), ClusterError> {
        match self.kill_matching(|i| i.name.as_deref() == Some(job_name), options) {
            0 => Err(ClusterError::NotFound(format!("job name {job_name}"))),
            _ => Ok(()),
        }
    }
}

/// Start one element's process, wait for it or a kill request, and record the outcome.
async fn run_element(
    jobs: Arc<Mutex<ElementMap>>,
    key: ElementKey,
    template: JobTemplate,
    host: String,
    kill_rx: oneshot::Receiver<KillRequest>,
) {
    let (job_id, index) = key;
    let mut child = match spawn_child(&template, index) {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(job_id, ?index, error = %e, "failed to start job process");
            update(&jobs, key, |info| {
                info.status = JobStatus::Exited;
                info.exit_code = Some(SPAWN_FAILED_EXIT_CODE);
                info.exit_reason = Some(e.to_string());
                info.finish_time = Some(now());
            });
            return;
        }
    };
    update(&jobs, key, |info| {
        info.status = JobStatus::Running;
        info.start_time = Some(now());
        info.exec_hosts = vec![host];
        info.alloc_slots = Some(1);
    });

    let (exit, killed) = tokio::select! {
        exit = child.wait() => (exit, None),
        Ok(request) = kill_rx => {
            if let Err(e) = child.kill().await {
                tracing::warn!(job_id, ?index, error = %e, "failed to kill job process");
            }
            (child.wait().await, Some(request))
        }
    };

    update(&jobs, key, |info| {
        info.finish_time = Some(now());
        record_exit(info, exit, killed);
    });
}

fn record_exit(info: &mut JobInfo, exit: io::Result<ExitStatus>, killed: Option<KillRequest>) {
    let code = exit.as_ref().ok().and_then(ExitStatus::code);
    match (exit, killed) {
        (_, Some(request)) => {
            info.status = if request.mark_done {
                JobStatus::Done
            } else {
                JobStatus::Exited
            };
            info.exit_code = code;
            info.exit_reason = Some(request.reason.unwrap_or_else(|| "killed".to_string()));
        }
        (Ok(_), None) => match code {
            Some(0) => {
                info.status = JobStatus::Done;
                info.exit_code = Some(0);
            }
            Some(c) => {
                info.status = JobStatus::Exited;
                info.exit_code = Some(c);
            }
            None => {
                info.status = JobStatus::Exited;
                info.exit_reason = Some("terminated by signal".to_string());
            }
        },
        (Err(e), None) => {
            info.status = JobStatus::Other;
            info.exit_reason = Some(format!("lost track of job process: {e}"));
        }
    }
}

fn spawn_child(template: &JobTemplate, index: Option<ArrayIndex>) -> io::Result<Child> {
    let mut cmd = Command::new(&template.command);
    cmd.args(&template.args)
        .envs(&template.env)
        .kill_on_drop(true)
        .stdin(match &template.input_path {
            Some(path) => Stdio::from(File::open(expand_array_path(path, index))?),
            None => Stdio::null(),
        })
        .stdout(append_to(template.output_path.as_deref(), index)?)
        .stderr(append_to(template.error_path.as_deref(), index)?);
    if let Some(dir) = &template.working_dir {
        cmd.current_dir(dir);
    }
    if let Some(i) = index {
        cmd.env(ARRAY_INDEX_ENV, i.to_string());
    }
    cmd.spawn()
}

fn append_to(path: Option<&str>, index: Option<ArrayIndex>) -> io::Result<Stdio> {
    match path {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(expand_array_path(path, index))?;
            Ok(Stdio::from(file))
        }
        None => Ok(Stdio::null()),
    }
}

fn update<F>(jobs: &Mutex<ElementMap>, key: ElementKey, apply: F)
where
    F: FnOnce(&mut JobInfo),
{
    // Forgotten jobs are no longer reported.
    if let Some(element) = lock(jobs).get_mut(&key) {
        apply(&mut element.info);
        if element.info.is_complete() {
            element.kill_tx = None;
        }
    }
}

fn lock(jobs: &Mutex<ElementMap>) -> MutexGuard<'_, ElementMap> {
    jobs.lock().unwrap_or_else(PoisonError::into_inner)
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
