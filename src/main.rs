//! # operantctl
//!
//! Brings the behavior processes on the magpi panel nodes in line with the
//! panel/subject/behavior table.
//!
//! ## Run Sequence
//!
//! 1. **Config** - defaults, config file, `OPERANTCTL_*` variables, then flags
//! 2. **Table** - read locally on the gateway, or through it from elsewhere
//! 3. **Reconcile** - list processes on every panel node and diff
//! 4. **Act** - kills (`-k`) before starts (`-s`), each confirmed by a re-listing
//!
//! ## Exit Status
//!
//! `0` when every panel was inspected and every requested action was confirmed,
//! `2` when some panel or action failed, `1` when nothing could be reconciled
//! (bad config, unreadable table, malformed table under `--strict`).

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod report;

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use operant_reconciler::{ActionExecutor, Config, Reconciler, TableSource, parse_table};
use operant_remote::{RemoteChannel, SshChannel};

use crate::cli::{Cli, normalize_args};
use crate::report::{RunSummary, any_action_failed, kill_lines, report_lines, start_lines};

/// Exit status when the run completed but something did not converge.
const PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse_from(normalize_args(std::env::args_os()));
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    info!(
        is_magpi = config.is_magpi,
        table = %config.table_path,
        start = cli.start,
        kill = cli.kill,
        "operantctl starting"
    );

    let lines = table_source(&config)
        .fetch_lines()
        .await
        .context("Cannot read the panel/subject/behavior table")?;
    let table = parse_table(lines, &config.table, config.parse_policy())
        .context("Malformed panel/subject/behavior table (run without --strict to skip bad lines)")?;

    let channel = node_channel(&config);
    let reconciler = Reconciler::new(
        channel.clone(),
        config.service_account.clone(),
        config.reconciler_config(),
    );
    let report = reconciler.reconcile(&table.entries).await;

    if !cli.json {
        report_lines(&report).iter().for_each(|line| println!("{line}"));
    }
    if !report.is_converged() && !cli.kill && !cli.start {
        info!("Report only; pass -k to kill and -s to start");
    }

    let executor = ActionExecutor::new(
        channel,
        config.service_account.clone(),
        config.executor_config(),
    );
    let kills = if cli.kill {
        executor.kill(&report.to_kill).await
    } else {
        Vec::new()
    };
    let starts = if cli.start {
        executor.start(&report.to_start).await
    } else {
        Vec::new()
    };

    if cli.json {
        let summary = RunSummary {
            report: &report,
            kills: &kills,
            starts: &starts,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize report")?
        );
    } else {
        kill_lines(&kills)
            .iter()
            .chain(start_lines(&starts).iter())
            .for_each(|line| println!("{line}"));
    }

    if report.has_failures() || any_action_failed(&kills, &starts) {
        warn!(
            failed_panels = report.failures.len(),
            "Run finished with failures"
        );
        Ok(ExitCode::from(PARTIAL_FAILURE))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Initialize tracing. Logs go to stderr so stdout carries only the report.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load the config and layer the command-line flags over it.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config =
        Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config
        .validate()
        .context("Invalid command-line configuration")?;
    Ok(config)
}

/// Channel to the panel nodes: direct from the gateway, otherwise through it.
fn node_channel(config: &Config) -> Arc<dyn RemoteChannel> {
    if config.is_magpi {
        Arc::new(SshChannel::direct(config.ssh_options()))
    } else {
        Arc::new(SshChannel::via_gateway(
            config.gateway_host.clone(),
            config.ssh_options(),
        ))
    }
}

fn table_source(config: &Config) -> TableSource {
    if config.is_magpi {
        TableSource::Local(config.table_path.clone().into())
    } else {
        TableSource::Remote {
            channel: Arc::new(SshChannel::direct(config.ssh_options())),
            host: config.gateway_host.clone(),
            path: config.table_path.clone(),
        }
    }
}
