//! Status records reported by the cluster: JobStatus, JobInfo.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Identifier assigned by the cluster at submission. Shared by all elements of a job array.
pub type JobId = u64;

/// Index of one element of a job array.
pub type ArrayIndex = u64;

/// Last known state of a job or job array element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Queued, not yet started.
    Pending,
    Running,
    /// Terminated with exit code 0.
    Done,
    /// Terminated with a non-zero exit code.
    Exited,
    Suspended,
    /// Unrecognized state. Treated as over.
    Other,
}

impl JobStatus {
    /// True once the job has left the pending state.
    pub fn is_started(self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Done | JobStatus::Exited | JobStatus::Suspended
        )
    }

    /// True when the scheduler will report no further activity for the job.
    pub fn is_done(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Exited | JobStatus::Other)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Exited => "exited",
            JobStatus::Suspended => "suspended",
            JobStatus::Other => "other",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point-in-time observation of a job, as reported by a [`crate::JobSyncApi`].
///
/// Job arrays are reported one record per element, each carrying its `array_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInfo {
    pub job_id: JobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_index: Option<ArrayIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Submitting host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_host: Option<String>,
    /// Hosts the job is executing on, empty while pending.
    #[serde(default)]
    pub exec_hosts: Vec<String>,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_slots: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alloc_slots: Option<u32>,
    /// Scheduler-local times.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submit_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<NaiveDateTime>,
    /// Peak memory as reported by the scheduler (e.g. "2 Gbytes").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_mem: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<String>,
}

impl JobInfo {
    /// Record with only an id and a status; everything else unset.
    pub fn new(job_id: JobId, status: JobStatus) -> Self {
        Self {
            job_id,
            array_index: None,
            name: None,
            from_host: None,
            exec_hosts: Vec::new(),
            status,
            queue: None,
            project: None,
            req_slots: None,
            alloc_slots: None,
            submit_time: None,
            start_time: None,
            finish_time: None,
            max_mem: None,
            exit_code: None,
            exit_reason: None,
        }
    }

    pub fn with_array_index(mut self, index: ArrayIndex) -> Self {
        self.array_index = Some(index);
        self
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_started(&self) -> bool {
        self.status.is_started()
    }

    /// Terminal-ness depends on the status alone.
    pub fn is_complete(&self) -> bool {
        self.status.is_done()
    }
}
