//! Trigger adapter for the agent version tracker.
//!
//! Runs one collection cycle: query the latest release tags, extract
//! versions, publish the snapshot. Configuration arrives through
//! environment-backed flags and the outcome is reported through the exit
//! status, which is the trigger infrastructure's success/failure channel.

use agent_version_tracker::{
    AutoVersionStrategy, GcsStore, LocalStore, PublishMode, Publisher, Registry, RunReport,
    Runner, RunnerConfig, SnapshotStore,
};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Agent Version Tracker - Collect the latest agent and SDK release versions and publish them as a JSON snapshot.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// GitHub token for the GraphQL API.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    github_token: String,

    /// Storage bucket holding the published document.
    #[arg(long, env = "STORAGE_BUCKET")]
    bucket: Option<String>,

    /// Bearer token for the storage write.
    #[arg(long, env = "STORAGE_TOKEN", hide_env_values = true)]
    storage_token: Option<String>,

    /// Object key of the published document.
    #[arg(long, env = "STORAGE_OBJECT", default_value = "agent-versions.json")]
    object_key: String,

    /// Write the document under this directory instead of blob storage.
    #[arg(long, conflicts_with = "bucket")]
    out_dir: Option<PathBuf>,

    /// Write to a staging key and promote it, so readers never observe a
    /// partial document.
    #[arg(long)]
    staged: bool,

    /// Query auto-instrumentation repositories independently instead of
    /// mirroring the SDK version into both telemetry fields.
    #[arg(long)]
    query_auto_repos: bool,

    /// Timeout in seconds for the API call and the storage write.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args = Args::parse();

    match run(args).await {
        Ok(report) => {
            print_report(&report);
            ExitCode::from(0)
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            ExitCode::from(1)
        }
    }
}

/// Sets up the global tracing subscriber: compact single-line output,
/// level filtering via `RUST_LOG` with an `info` default.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

/// Builds the store, publisher, and runner, then executes one cycle.
async fn run(args: Args) -> Result<RunReport, Box<dyn std::error::Error>> {
    let timeout = Duration::from_secs(args.timeout_secs);

    let store: Box<dyn SnapshotStore> = match (&args.out_dir, &args.bucket) {
        (Some(dir), _) => Box::new(LocalStore::new(dir)),
        (None, Some(bucket)) => {
            let token = args
                .storage_token
                .as_deref()
                .ok_or("--storage-token (STORAGE_TOKEN) is required with --bucket")?;
            Box::new(GcsStore::new(bucket, token, timeout)?)
        }
        (None, None) => {
            return Err("either --bucket (STORAGE_BUCKET) or --out-dir must be given".into());
        }
    };

    let mode = if args.staged {
        PublishMode::Staged
    } else {
        PublishMode::Overwrite
    };
    let publisher = Publisher::new(store, &args.object_key).with_mode(mode);

    let strategy = if args.query_auto_repos {
        AutoVersionStrategy::QueryAutoRepo
    } else {
        AutoVersionStrategy::MirrorSdk
    };
    let config = RunnerConfig::new(args.github_token)
        .with_auto_version_strategy(strategy)
        .with_timeout(timeout);

    let runner = Runner::new(Registry::builtin(), config, publisher)?;
    Ok(runner.run().await?)
}

/// Prints the final cycle report.
fn print_report(report: &RunReport) {
    println!("\nSummary:");
    println!("  Projects tracked: {}", report.projects_tracked);
    println!("  Repositories queried: {}", report.sub_requests);
    println!("  Versions resolved: {}", report.versions_resolved);
    println!("  Extraction misses: {}", report.extraction_misses);
}
