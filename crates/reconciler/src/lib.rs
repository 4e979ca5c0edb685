//! Reconciliation of behavior processes on operant panel nodes.
//!
//! Each panel in a bird lab is driven by a behavior script running on its own
//! node. A single table says which behavior each panel should run and whether
//! it is enabled. This crate brings the nodes in line with that table:
//!
//! - **Desired state**: parsed from the panel/subject/behavior table
//! - **Actual state**: `ps -ef` listings fetched from each node
//! - **Diff**: a kill set and a start set per run
//! - **Actions**: kills and starts, each confirmed by a fresh listing
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use operant_reconciler::{parse_table, Config, Reconciler, TableSource};
//! use operant_remote::SshChannel;
//!
//! #[tokio::main]
//! async fn main() -> operant_reconciler::Result<()> {
//!     let config = Config::load(None)?;
//!     let channel = Arc::new(SshChannel::direct(config.ssh_options()));
//!     let lines = TableSource::Local(config.table_path.clone().into())
//!         .fetch_lines()
//!         .await?;
//!     let table = parse_table(lines, &config.table, config.parse_policy())?;
//!
//!     let reconciler = Reconciler::new(channel, &config.service_account, config.reconciler_config());
//!     let report = reconciler.reconcile(&table.entries).await;
//!     println!("{} to kill, {} to start", report.to_kill.len(), report.to_start.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod error;
pub mod executor;
pub mod inspect;
pub mod parser;
pub mod reconciler;
pub mod source;
pub mod types;

// Re-export main types
pub use config::{Config, parse_bool};
pub use error::{Error, Result};
pub use executor::{ActionExecutor, ExecutorConfig, KillOutcome, KillStatus, StartOutcome, StartStatus};
pub use inspect::{RemoteProcessInspector, normalize_signature, parse_live_line};
pub use parser::{DesiredTable, ParsePolicy, TableFormat, parse_line, parse_table};
pub use reconciler::{Reconciler, ReconcilerConfig, classify};
pub use source::TableSource;
pub use types::{
    DesiredEntry, IdleEntry, KillEntry, KillReason, LiveProcess, PanelFailure, PanelId,
    ReconcileReport, RunningEntry, StartEntry,
};
