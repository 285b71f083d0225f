use clap::Parser;
use cluster_monitor::{
    ArrayIndex, JobError, JobInfo, JobManager, JobMonitor, JobStatus, JobSyncApi, JobTemplate,
    ManagerConfig, ManagerError, MonitorConfig, MonitorError,
};
use cluster_sim::LocalSyncApi;
use std::sync::Arc;

/// Inclusive range of array indices, written `START-END`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayRange {
    pub start: ArrayIndex,
    pub end: ArrayIndex,
}

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "jobmon")]
#[command(version)]
#[command(about = "Run a command or job array as local jobs and wait for them to finish")]
pub struct Cli {
    /// Submit a job array with indices START-END (inclusive)
    #[arg(long, value_name = "START-END", value_parser = parse_range)]
    pub array: Option<ArrayRange>,

    /// Job name (defaults to the command)
    #[arg(long)]
    pub name: Option<String>,

    /// File to read standard input from; `#` is replaced by the array index
    #[arg(long, value_name = "PATH")]
    pub input: Option<String>,

    /// File to append standard output to; `#` is replaced by the array index
    #[arg(long, value_name = "PATH")]
    pub output: Option<String>,

    /// File to append standard error to; `#` is replaced by the array index
    #[arg(long, value_name = "PATH")]
    pub error: Option<String>,

    /// Command and its arguments
    #[arg(required = true, trailing_var_arg = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

impl Cli {
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    pub fn template(&self) -> JobTemplate {
        let program = self.program();
        let mut template = JobTemplate::new(program)
            .args(self.command.iter().skip(1).cloned())
            .job_name(self.name.as_deref().unwrap_or(program));
        if let Some(path) = &self.input {
            template = template.input_path(path.as_str());
        }
        if let Some(path) = &self.output {
            template = template.output_path(path.as_str());
        }
        if let Some(path) = &self.error {
            template = template.error_path(path.as_str());
        }
        template
    }
}

fn parse_range(range: &str) -> Result<ArrayRange, String> {
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got `{range}`"))?;
    let start: ArrayIndex = start
        .trim()
        .parse()
        .map_err(|e| format!("invalid start index: {e}"))?;
    let end: ArrayIndex = end
        .trim()
        .parse()
        .map_err(|e| format!("invalid end index: {e}"))?;
    if start > end {
        return Err(format!("start index {start} is past end index {end}"));
    }
    Ok(ArrayRange { start, end })
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Manager(#[from] ManagerError),
    #[error(transparent)]
    Monitor(#[from] MonitorError),
    #[error(transparent)]
    Job(#[from] JobError),
}

/// Run the job on the local backend under a started monitor and return the final
/// records.
pub async fn run(
    cli: &Cli,
    manager_config: ManagerConfig,
    monitor_config: MonitorConfig,
) -> Result<Vec<JobInfo>, RunError> {
    let api: Arc<dyn JobSyncApi> = Arc::new(LocalSyncApi::new());
    let manager = Arc::new(JobManager::new(api, manager_config));
    let monitor = JobMonitor::new(Arc::clone(&manager), monitor_config)?;
    monitor.start().await?;
    let result = submit_and_wait(&manager, cli).await;
    monitor.stop().await;
    result
}

async fn submit_and_wait(manager: &JobManager, cli: &Cli) -> Result<Vec<JobInfo>, RunError> {
    let template = cli.template();
    let future = match cli.array {
        Some(range) => {
            manager
                .submit_job_array(&template, range.start, range.end)
                .await?
        }
        None => manager.submit_job(&template).await?,
    };
    tracing::info!(job_id = future.job_id(), command = %cli.program(), "waiting for job");
    Ok(future.wait().await?)
}

/// True when every element finished normally with exit code 0 (or none reported).
pub fn succeeded(infos: &[JobInfo]) -> bool {
    infos
        .iter()
        .all(|i| i.status == JobStatus::Done && i.exit_code.unwrap_or(0) == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    fn strings(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_command() {
        let cli = Cli::try_parse_from(["jobmon", "sh", "-c", "exit 0"]).unwrap();
        assert_eq!(cli.array, None);
        assert_eq!(cli.program(), "sh");
        let jt = cli.template();
        assert_eq!(jt.command, "sh");
        assert_eq!(jt.args, strings(&["-c", "exit 0"]));
        assert_eq!(jt.job_name.as_deref(), Some("sh"));
        assert_eq!(jt.output_path, None);
    }

    #[test]
    fn array_option_and_separator() {
        let cli = Cli::try_parse_from(["jobmon", "--array", "1-4", "--", "--weird", "x"]).unwrap();
        assert_eq!(cli.array, Some(ArrayRange { start: 1, end: 4 }));
        assert_eq!(cli.command, strings(&["--weird", "x"]));
        // Options after the command belong to it.
        let cli = Cli::try_parse_from(["jobmon", "echo", "--array", "1-2"]).unwrap();
        assert_eq!(cli.array, None);
        assert_eq!(cli.command, strings(&["echo", "--array", "1-2"]));
    }

    #[test]
    fn path_options_reach_the_template() {
        let cli = Cli::try_parse_from([
            "jobmon", "--array", "1-2", "--name", "split", "--input", "in.#", "--output",
            "out.#", "--error", "err.#", "cat",
        ])
        .unwrap();
        let jt = cli.template();
        assert_eq!(jt.job_name.as_deref(), Some("split"));
        assert_eq!(jt.input_path.as_deref(), Some("in.#"));
        assert_eq!(jt.output_path.as_deref(), Some("out.#"));
        assert_eq!(jt.error_path.as_deref(), Some("err.#"));
        assert!(jt.args.is_empty());
    }

    #[test]
    fn usage_errors() {
        let kind = |args: &[&str]| Cli::try_parse_from(args).unwrap_err().kind();
        assert_eq!(kind(&["jobmon"]), ErrorKind::MissingRequiredArgument);
        assert_eq!(
            kind(&["jobmon", "--array", "4-1", "true"]),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            kind(&["jobmon", "--array", "x", "true"]),
            ErrorKind::ValueValidation
        );
        assert_eq!(
            kind(&["jobmon", "--array", "1-2"]),
            ErrorKind::MissingRequiredArgument
        );
        assert!(Cli::try_parse_from(["jobmon", "--array"]).is_err());
    }

    #[test]
    fn range_parsing() {
        assert_eq!(parse_range("3-3"), Ok(ArrayRange { start: 3, end: 3 }));
        assert_eq!(parse_range(" 1 - 10"), Ok(ArrayRange { start: 1, end: 10 }));
        assert!(parse_range("10").is_err());
        assert!(parse_range("-1-2").is_err());
    }

    #[test]
    fn success_needs_clean_exits() {
        let ok = JobInfo::new(1, JobStatus::Done).with_exit_code(0);
        let failed = JobInfo::new(1, JobStatus::Exited).with_exit_code(2);
        assert!(succeeded(&[ok.clone()]));
        assert!(!succeeded(&[ok, failed]));
        assert!(!succeeded(&[JobInfo::new(1, JobStatus::Other)]));
    }
}
