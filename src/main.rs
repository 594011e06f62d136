mod cli;
mod config;
mod error;
mod orchestrator;
mod proxmox;
mod recovery;
mod tracker;
mod ui;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use clap::error::ErrorKind;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::RecoveryConfig;
use orchestrator::RecoveryOrchestrator;
use proxmox::ProxmoxClient;
use ui::Summary;

#[tokio::main]
async fn main() -> ExitCode {
    // Malformed invocations exit 1, not clap's default 2.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    init_tracing(cli.verbose);

    let summary = Summary::default();
    match run(&cli, &summary).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            summary.fatal(&err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli, summary: &Summary) -> Result<u8> {
    let mut config =
        RecoveryConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    let client = ProxmoxClient::new(&config.proxmox).map_err(error::RecoveryError::from)?;
    let orchestrator = RecoveryOrchestrator::new(client, config.recovery_settings()?);

    let report = orchestrator.recover(cli.vmid).await;

    summary.outcome(&report);
    if cli.report {
        summary.report(&report);
    }
    Ok(report.outcome.exit_code())
}
