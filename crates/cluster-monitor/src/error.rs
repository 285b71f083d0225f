//! Error types for job futures, the manager, and the monitor.

use cluster_types::{ClusterError, JobId};
use std::time::Duration;

/// Failure outcome of a [`crate::JobFuture`], or of waiting on one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("job {job_id} was identified as a zombie and removed")]
    Zombie { job_id: JobId },
    #[error("job {job_id} was abandoned")]
    Abandoned { job_id: JobId },
    #[error("waiting for job {job_id} was cancelled")]
    Cancelled { job_id: JobId },
    /// The wait timed out; the job itself may still finish.
    #[error("timed out after {0:?} waiting for job")]
    Timeout(Duration),
    /// A future was settled twice. Always a bug in the caller.
    #[error("job {job_id} future was already completed")]
    AlreadyCompleted { job_id: JobId },
}

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("job submission failed: {0}")]
    Submission(#[source] ClusterError),
    #[error("job kill failed: {0}")]
    Kill(#[source] ClusterError),
    #[error("job future: {0}")]
    Future(#[from] JobError),
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("check interval must be greater than zero")]
    InvalidInterval,
    #[error("failed to build monitor runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("monitor was shut down")]
    ShutDown,
}
