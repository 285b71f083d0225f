//! jobmon: run a command (or job array) locally and print the final job records.

use clap::Parser;
use cluster_cli::{run, succeeded, Cli};
use cluster_monitor::{ManagerConfig, MonitorConfig};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let infos = match run(&cli, ManagerConfig::from_env(), MonitorConfig::from_env()).await {
        Ok(infos) => infos,
        Err(e) => {
            tracing::error!(error = %e, "job did not complete");
            return ExitCode::FAILURE;
        }
    };
    for info in &infos {
        match serde_json::to_string(info) {
            Ok(line) => println!("{line}"),
            Err(e) => {
                tracing::error!(job_id = info.job_id, error = %e, "failed to encode job info")
            }
        }
    }
    if succeeded(&infos) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
