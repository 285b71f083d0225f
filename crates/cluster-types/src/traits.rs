//! Cluster access trait: the only I/O boundary of the job monitor.

use crate::{ArrayIndex, JobId, JobInfo, JobTemplate};
use async_trait::async_trait;
use std::time::Duration;

/// Extra behavior requested when killing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillOption {
    /// Terminate and record the given reason. A blank reason is ignored.
    Reason(String),
    /// Terminate and record the job as done instead of exited.
    MarkDone,
}

impl KillOption {
    /// Reason carried by the options, if any non-blank one was given.
    pub fn reason(options: &[KillOption]) -> Option<&str> {
        options.iter().find_map(|o| match o {
            KillOption::Reason(r) if !r.trim().is_empty() => Some(r.as_str()),
            _ => None,
        })
    }

    pub fn marks_done(options: &[KillOption]) -> bool {
        options.iter().any(|o| matches!(o, KillOption::MarkDone))
    }
}

/// Synchronous-style access to a cluster scheduler: submit, query, kill.
///
/// Every call may fail with a [`ClusterError`]; callers that poll treat such failures as
/// transient. Implementations should bound their own calls in time where they can.
#[async_trait]
pub trait JobSyncApi: Send + Sync {
    /// Submit one job. The returned record carries at least the job id and initial status.
    async fn submit_job(&self, template: &JobTemplate) -> Result<JobInfo, ClusterError>;

    /// Submit a job array with elements `start..=end`. The returned record carries the
    /// job id shared by every element.
    async fn submit_job_array(
        &self,
        template: &JobTemplate,
        start: ArrayIndex,
        end: ArrayIndex,
    ) -> Result<JobInfo, ClusterError>;

    /// Current records for every job visible to this process' identity.
    async fn get_job_info(&self) -> Result<Vec<JobInfo>, ClusterError>;

    /// Current records for every job of the given user.
    async fn get_job_info_for_user(&self, user: &str) -> Result<Vec<JobInfo>, ClusterError>;

    /// Current records for one job or job array.
    async fn get_job_info_by_id(&self, job_id: JobId) -> Result<Vec<JobInfo>, ClusterError>;

    async fn kill_job(&self, job_id: JobId, options: &[KillOption]) -> Result<(), ClusterError>;

    async fn kill_job_by_name(
        &self,
        job_name: &str,
        options: &[KillOption],
    ) -> Result<(), ClusterError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid job template: {0}")]
    InvalidTemplate(String),
    #[error("cluster call timed out after {0:?}")]
    Timeout(Duration),
    #[error("cluster error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_option_helpers() {
        let opts = vec![
            KillOption::Reason("  ".to_string()),
            KillOption::MarkDone,
            KillOption::Reason("over budget".to_string()),
        ];
        assert_eq!(KillOption::reason(&opts), Some("over budget"));
        assert!(KillOption::marks_done(&opts));
        assert_eq!(KillOption::reason(&[]), None);
        assert!(!KillOption::marks_done(&[KillOption::Reason("x".into())]));
    }
}
