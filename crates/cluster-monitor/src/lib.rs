//! Tracks batch jobs on a cluster that can only be polled.
//!
//! [`JobManager`] submits jobs through a [`JobSyncApi`] and hands back a [`JobFuture`].
//! [`JobMonitor`] calls [`JobManager::check_jobs`] on a fixed interval; each pass
//! correlates the cluster's status dump with the tracked jobs, completes futures of
//! finished jobs, fails futures of zombies, and forgets old completed jobs.

mod config;
mod error;
mod future;
mod manager;
mod metadata;
mod monitor;

pub use cluster_types::*;
pub use config::{ManagerConfig, MonitorConfig};
pub use error::{JobError, ManagerError, MonitorError};
pub use future::JobFuture;
pub use manager::{CheckSummary, JobManager};
pub use metadata::JobMetadata;
pub use monitor::JobMonitor;
