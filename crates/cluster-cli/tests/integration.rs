//! End-to-end runs on the local backend: single job, array with per-index files, failure.

use clap::Parser;
use cluster_cli::{run, succeeded, Cli};
use cluster_monitor::{JobStatus, ManagerConfig, MonitorConfig};
use std::time::Duration;

fn fast_monitor() -> MonitorConfig {
    MonitorConfig {
        check_interval: Duration::from_millis(20),
        shutdown_on_stop: true,
    }
}

fn cli(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("jobmon").chain(args.iter().copied())).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn single_job_succeeds() {
    let cli = cli(&["sh", "-c", "exit 0"]);
    let infos = run(&cli, ManagerConfig::default(), fast_monitor())
        .await
        .unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].status, JobStatus::Done);
    assert_eq!(infos[0].name.as_deref(), Some("sh"));
    assert!(succeeded(&infos));

    let line = serde_json::to_string(&infos[0]).unwrap();
    let j: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(j["status"], "done");
    assert_eq!(j["exit_code"], 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn array_output_is_split_by_index() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.#");
    let out = out.to_str().unwrap();
    let cli = cli(&[
        "--array",
        "2-4",
        "--output",
        out,
        "sh",
        "-c",
        "echo $JOB_ARRAY_INDEX",
    ]);

    let infos = run(&cli, ManagerConfig::default(), fast_monitor())
        .await
        .unwrap();
    assert_eq!(infos.len(), 3);
    assert!(succeeded(&infos));
    for index in 2..=4 {
        let written = std::fs::read_to_string(dir.path().join(format!("out.{index}"))).unwrap();
        assert_eq!(written.trim(), index.to_string());
    }
    assert!(!dir.path().join("out.#").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn array_input_is_read_by_index() {
    let dir = tempfile::tempdir().unwrap();
    for index in 1..=2 {
        std::fs::write(dir.path().join(format!("in.{index}")), format!("line {index}\n")).unwrap();
    }
    let input = dir.path().join("in.#");
    let output = dir.path().join("copy.#");
    let cli = cli(&[
        "--array",
        "1-2",
        "--input",
        input.to_str().unwrap(),
        "--output",
        output.to_str().unwrap(),
        "cat",
    ]);

    let infos = run(&cli, ManagerConfig::default(), fast_monitor())
        .await
        .unwrap();
    assert!(succeeded(&infos));
    for index in 1..=2 {
        let copied = std::fs::read_to_string(dir.path().join(format!("copy.{index}"))).unwrap();
        assert_eq!(copied, format!("line {index}\n"));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failing_element_is_reported() {
    let cli = cli(&["--array", "1-2", "sh", "-c", "exit $JOB_ARRAY_INDEX"]);
    let infos = run(&cli, ManagerConfig::default(), fast_monitor())
        .await
        .unwrap();
    assert!(!succeeded(&infos));
    let mut codes: Vec<_> = infos.iter().map(|i| i.exit_code).collect();
    codes.sort();
    assert_eq!(codes, vec![Some(1), Some(2)]);
}
