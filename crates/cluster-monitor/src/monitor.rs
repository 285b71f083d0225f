//! Background timer that runs [`JobManager::check_jobs`] at a fixed interval.

use crate::{JobManager, MonitorConfig, MonitorError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

struct Checker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct MonitorState {
    /// Dedicated single-thread runtime the check loop runs on. `None` once released.
    runtime: Option<Runtime>,
    checker: Option<Checker>,
}

/// Periodically checks the cluster on behalf of a [`JobManager`].
///
/// The monitor owns one runtime for its whole life, so start/stop cycles reuse the
/// same timer thread. Dropping the monitor releases it.
pub struct JobMonitor {
    manager: Arc<JobManager>,
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl JobMonitor {
    pub fn new(manager: Arc<JobManager>, config: MonitorConfig) -> Result<Self, MonitorError> {
        if config.check_interval.is_zero() {
            return Err(MonitorError::InvalidInterval);
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("job-monitor")
            .enable_all()
            .build()?;
        Ok(Self {
            manager,
            config,
            state: Mutex::new(MonitorState {
                runtime: Some(runtime),
                checker: None,
            }),
        })
    }

    pub fn manager(&self) -> &Arc<JobManager> {
        &self.manager
    }

    /// Clear the manager and begin checking after one interval. Does nothing if
    /// already running.
    pub async fn start(&self) -> Result<(), MonitorError> {
        let mut state = self.state.lock().await;
        if state.checker.is_some() {
            return Ok(());
        }
        let Some(runtime) = state.runtime.as_ref() else {
            return Err(MonitorError::ShutDown);
        };
        tracing::debug!(interval = ?self.config.check_interval, "starting job monitoring");
        self.manager.clear().await;
        let cancel = CancellationToken::new();
        let task = runtime.spawn(run_checks(
            Arc::clone(&self.manager),
            self.config.check_interval,
            cancel.clone(),
        ));
        state.checker = Some(Checker { cancel, task });
        Ok(())
    }

    /// Stop checking. A pass in flight (e.g. blocked on a hung fetch) is abandoned
    /// rather than awaited. Does nothing if not running. With `shutdown_on_stop` the
    /// runtime is released and the monitor cannot be started again.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(checker) = state.checker.take() {
            tracing::debug!("stopping job monitoring");
            checker.cancel.cancel();
            if let Err(e) = checker.task.await {
                tracing::warn!(error = %e, "job check loop ended abnormally");
            }
        }
        if self.config.shutdown_on_stop {
            if let Some(runtime) = state.runtime.take() {
                tracing::debug!("releasing job monitor runtime");
                runtime.shutdown_background();
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.checker.is_some()
    }
}

impl Drop for JobMonitor {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if let Some(checker) = state.checker.take() {
            checker.cancel.cancel();
        }
        // Dropping a runtime from async context panics; shutting down in the background doesn't.
        if let Some(runtime) = state.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn run_checks(manager: Arc<JobManager>, period: Duration, cancel: CancellationToken) {
    let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticks.tick() => {
                // Abandoned on stop. Entries are only ever replaced whole.
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    summary = manager.check_jobs() => {
                        tracing::trace!(?summary, "job check finished");
                    }
                }
            }
        }
    }
}
