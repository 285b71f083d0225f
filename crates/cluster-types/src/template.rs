//! Submission description for a job or job array.

use crate::ArrayIndex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Token in stdin/stdout/stderr paths that backends replace with the array index.
pub const ARRAY_INDEX_PLACEHOLDER: &str = "#";

/// A generic template for a job to run on the cluster.
///
/// For job arrays, `input_path`, `output_path` and `error_path` should contain
/// [`ARRAY_INDEX_PLACEHOLDER`] so each element reads and writes its own files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTemplate {
    /// Command to execute, frequently a shell with a script as argument.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// File piped into the command's stdin.
    #[serde(default)]
    pub input_path: Option<String>,
    /// File the command's stdout is appended to.
    #[serde(default)]
    pub output_path: Option<String>,
    /// File the command's stderr is appended to.
    #[serde(default)]
    pub error_path: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    /// Backend-specific options passed through verbatim.
    #[serde(default)]
    pub native_spec: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl JobTemplate {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn input_path(mut self, path: impl Into<String>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<String>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn error_path(mut self, path: impl Into<String>) -> Self {
        self.error_path = Some(path.into());
        self
    }

    pub fn job_name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    pub fn native_spec<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.native_spec.extend(options.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Replace the array placeholder in `path` with `index`. Paths of non-array jobs
/// (`index == None`) are returned unchanged.
pub fn expand_array_path(path: &str, index: Option<ArrayIndex>) -> String {
    match index {
        Some(i) => path.replace(ARRAY_INDEX_PLACEHOLDER, &i.to_string()),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_fields() {
        let jt = JobTemplate::new("bash")
            .arg("run.sh")
            .job_name("align")
            .input_path("/data/in.#")
            .native_spec(["-W 1", "-n 2"])
            .env("THREADS", "2");
        assert_eq!(jt.command, "bash");
        assert_eq!(jt.args, vec!["run.sh"]);
        assert_eq!(jt.job_name.as_deref(), Some("align"));
        assert_eq!(jt.native_spec.len(), 2);
        assert_eq!(jt.env.get("THREADS").map(String::as_str), Some("2"));
        assert!(jt.output_path.is_none());
    }

    #[test]
    fn array_paths_are_expanded_per_index() {
        assert_eq!(expand_array_path("/out/#.log", Some(4)), "/out/4.log");
        assert_eq!(expand_array_path("/out/#.log", None), "/out/#.log");
        assert_eq!(expand_array_path("/out/plain.log", Some(4)), "/out/plain.log");
    }
}
