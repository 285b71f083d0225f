//! Point-in-time snapshot of a tracked job.

use crate::JobFuture;
use chrono::{DateTime, Utc};
use cluster_types::{ArrayIndex, JobInfo};

/// What the manager knows about one tracked job at one moment.
///
/// Never changed after construction: each observed change installs a new snapshot in
/// the manager's map, so readers always see a consistent record.
#[derive(Debug, Clone)]
pub struct JobMetadata {
    done: bool,
    last_updated: DateTime<Utc>,
    last_infos: Vec<JobInfo>,
    future: JobFuture,
}

impl JobMetadata {
    pub(crate) fn new(
        done: bool,
        last_updated: DateTime<Utc>,
        last_infos: Vec<JobInfo>,
        future: JobFuture,
    ) -> Self {
        Self {
            done,
            last_updated,
            last_infos,
            future,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Most recent records, one per array element. Empty until the first observation.
    pub fn last_infos(&self) -> &[JobInfo] {
        &self.last_infos
    }

    pub fn info_for_index(&self, array_index: ArrayIndex) -> Option<&JobInfo> {
        self.last_infos
            .iter()
            .find(|i| i.array_index == Some(array_index))
    }

    pub fn future(&self) -> &JobFuture {
        &self.future
    }
}
