//! `cwm` binary entrypoint: parse configuration, install the structured
//! logging subscriber, run the orchestrator loop to completion, and map
//! its `StopReason` onto the process exit code.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use cwm::ci::GitHubActionsClient;
use cwm::config::{Cli, LogFormat};
use cwm::{CancellationToken, Config, Orchestrator, StopReason};
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = match Config::resolve(&cli) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{}", format!("configuration error: {e}").red());
            std::process::exit(3);
        }
    };

    if let Err(e) = init_logging(&config, cli.log_format) {
        eprintln!("{}", format!("failed to initialize logging: {e}").red());
        std::process::exit(3);
    }

    let cancellation = CancellationToken::new();
    install_signal_handler(cancellation.clone());

    info!(
        repo = %config.repo_slug(),
        branch = %config.branch,
        dry_run = config.dry_run,
        "starting continuous workflow monitor"
    );

    let ci = Arc::new(GitHubActionsClient::new(
        config.ci_token.clone(),
        config.repo_owner.clone(),
        config.repo_name.clone(),
    ));

    let mut orchestrator = Orchestrator::new(ci, config, cancellation);
    match orchestrator.run().await {
        Ok((reason, report)) => {
            print_summary(&reason, report.total_fixes_applied, report.total_issues_found);
            std::process::exit(exit_code(&reason));
        }
        Err(e) => {
            error!(error = %e, "orchestrator loop errored");
            eprintln!("{}", format!("fatal: {e}").red());
            std::process::exit(3);
        }
    }
}

/// Global subscriber: JSON or human-readable on stdout per `--log-format`,
/// mirrored unconditionally to `logs/cwm.log` as structured lines, honoring
/// `RUST_LOG`.
fn init_logging(config: &Config, format: LogFormat) -> Result<()> {
    let logs_dir = config.workspace_root.join("logs");
    std::fs::create_dir_all(&logs_dir).context("creating logs directory")?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(logs_dir.join("cwm.log"))
        .context("opening logs/cwm.log")?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_layer = fmt::layer()
        .json()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false);

    let registry = tracing_subscriber::registry().with(env_filter).with(file_layer);

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
    Ok(())
}

/// Translate a process signal into a graceful-stop request: the loop
/// finishes its current step, writes the final report, and exits `130`.
fn install_signal_handler(cancellation: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("cancellation signal received, draining current tick");
            cancellation.cancel();
        }
    });
}

fn exit_code(reason: &StopReason) -> i32 {
    match reason {
        StopReason::Passed => 0,
        StopReason::Budget => 2,
        StopReason::Fatal(_) => 3,
        StopReason::Cancelled => 130,
    }
}

fn print_summary(reason: &StopReason, fixes_applied: u32, issues_found: u32) {
    let line = match reason {
        StopReason::Passed => {
            format!("✓ pass streak reached — {fixes_applied} fixes applied, {issues_found} issues seen").green()
        }
        StopReason::Budget => {
            format!("⚠ retry/iteration budget exhausted — {fixes_applied} fixes applied, {issues_found} issues seen").yellow()
        }
        StopReason::Fatal(msg) => format!("✗ fatal: {msg}").red(),
        StopReason::Cancelled => "⚠ cancelled by signal".yellow(),
    };
    println!("{line}");
}
