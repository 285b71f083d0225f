//! Durations and policies for the manager and the polling monitor.

use std::time::Duration;

const DEFAULT_CHECK_INTERVAL_SECS: u64 = 15;
const DEFAULT_KEEP_COMPLETED_SECS: u64 = 10 * 60;
const DEFAULT_KEEP_ZOMBIES_SECS: u64 = 30 * 60;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;

/// Retention and zombie policy for [`crate::JobManager`].
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How long a completed job stays queryable before it is forgotten.
    pub keep_completed: Duration,
    /// How long a tracked, unfinished job may be missing from status dumps before it is
    /// declared a zombie. Must exceed the scheduler's reporting latency.
    pub keep_zombies: Duration,
    /// Upper bound on one bulk status fetch. `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
    /// Ask the cluster to kill a job once it is declared a zombie (best effort).
    pub kill_zombies: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            keep_completed: Duration::from_secs(DEFAULT_KEEP_COMPLETED_SECS),
            keep_zombies: Duration::from_secs(DEFAULT_KEEP_ZOMBIES_SECS),
            fetch_timeout: Some(Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS)),
            kill_zombies: false,
        }
    }
}

impl ManagerConfig {
    /// Defaults overridden by `JOBMON_KEEP_COMPLETED_SECS`, `JOBMON_KEEP_ZOMBIES_SECS`,
    /// `JOBMON_FETCH_TIMEOUT_SECS` (0 disables the timeout) and `JOBMON_KILL_ZOMBIES`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_secs("JOBMON_KEEP_COMPLETED_SECS") {
            config.keep_completed = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("JOBMON_KEEP_ZOMBIES_SECS") {
            config.keep_zombies = Duration::from_secs(secs);
        }
        if let Some(secs) = env_secs("JOBMON_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(flag) = env_flag("JOBMON_KILL_ZOMBIES") {
            config.kill_zombies = flag;
        }
        config
    }
}

/// Timer settings for [`crate::JobMonitor`].
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub check_interval: Duration,
    /// Release the timer runtime on `stop()`; the monitor cannot be restarted afterwards.
    pub shutdown_on_stop: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            shutdown_on_stop: false,
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `JOBMON_CHECK_INTERVAL_SECS` and `JOBMON_SHUTDOWN_ON_STOP`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(secs) = env_secs("JOBMON_CHECK_INTERVAL_SECS") {
            config.check_interval = Duration::from_secs(secs);
        }
        if let Some(flag) = env_flag("JOBMON_SHUTDOWN_ON_STOP") {
            config.shutdown_on_stop = flag;
        }
        config
    }
}

fn env_secs(key: &str) -> Option<u64> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(secs) => Some(secs),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring non-numeric duration");
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "ignoring unrecognized flag");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let m = ManagerConfig::default();
        assert_eq!(m.keep_completed, Duration::from_secs(600));
        assert_eq!(m.keep_zombies, Duration::from_secs(1800));
        assert_eq!(m.fetch_timeout, Some(Duration::from_secs(60)));
        assert!(!m.kill_zombies);

        let mon = MonitorConfig::default();
        assert_eq!(mon.check_interval, Duration::from_secs(15));
        assert!(!mon.shutdown_on_stop);
    }

    // Single test touching the process environment so parallel tests don't race on it.
    #[test]
    fn from_env_overrides() {
        std::env::set_var("JOBMON_KEEP_ZOMBIES_SECS", "90");
        std::env::set_var("JOBMON_FETCH_TIMEOUT_SECS", "0");
        std::env::set_var("JOBMON_KILL_ZOMBIES", "yes");
        std::env::set_var("JOBMON_KEEP_COMPLETED_SECS", "soon");
        std::env::set_var("JOBMON_CHECK_INTERVAL_SECS", "2");

        let m = ManagerConfig::from_env();
        assert_eq!(m.keep_zombies, Duration::from_secs(90));
        assert_eq!(m.fetch_timeout, None);
        assert!(m.kill_zombies);
        assert_eq!(m.keep_completed, Duration::from_secs(600));
        assert_eq!(MonitorConfig::from_env().check_interval, Duration::from_secs(2));

        for key in [
            "JOBMON_KEEP_ZOMBIES_SECS",
            "JOBMON_FETCH_TIMEOUT_SECS",
            "JOBMON_KILL_ZOMBIES",
            "JOBMON_KEEP_COMPLETED_SECS",
            "JOBMON_CHECK_INTERVAL_SECS",
        ] {
            std::env::remove_var(key);
        }
    }
}
