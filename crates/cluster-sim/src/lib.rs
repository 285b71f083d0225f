//! Cluster backends that need no real scheduler.
//!
//! [`LocalSyncApi`] runs jobs as subprocesses of this host. With the `test-util`
//! feature, [`MockSyncApi`] replays scripted status dumps.

mod local;
#[cfg(feature = "test-util")]
pub mod mock;

pub use cluster_types::{ClusterError, JobSyncApi};
pub use local::{LocalSyncApi, ARRAY_INDEX_ENV};

#[cfg(feature = "test-util")]
pub use mock::{FetchGate, MockSyncApi, SubmitRecord};
