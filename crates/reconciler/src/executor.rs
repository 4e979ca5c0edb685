//! Issues kill and start commands and confirms their effect.
//!
//! Remote commands are fire-and-forget: `kill` returning 0 does not mean the
//! process is gone and a backgrounded `nohup` always returns 0. Every action is
//! therefore followed by an independent process listing on the same host.

use std::sync::Arc;
use std::time::Duration;

use itertools::Itertools;
use operant_remote::RemoteChannel;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Error;
use crate::inspect::RemoteProcessInspector;
use crate::types::{KillEntry, PanelId, StartEntry};

/// Configuration for the action executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Directory the behavior scripts live in on the nodes.
    pub scripts_dir: String,
    /// Search term used when confirming kills.
    pub search_term: String,
    /// Pause between issuing an action and checking its effect.
    pub verify_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            scripts_dir: "/home/bird/pyoperant/scripts".to_string(),
            search_term: "pyoperant/scripts/behave".to_string(),
            verify_delay: Duration::from_millis(500),
        }
    }
}

/// Result of killing one PID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum KillStatus {
    Killed,
    /// `kill` was issued but the process is still listed.
    StillRunning,
    /// `kill` was issued but the follow-up listing failed.
    Unconfirmed(String),
    /// `kill` could not be issued or was rejected.
    Failed(String),
}

/// Outcome for one PID of a [`KillEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillOutcome {
    pub panel: PanelId,
    pub host: String,
    pub pid: String,
    pub status: KillStatus,
}

/// Result of starting one behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum StartStatus {
    /// Exactly one matching process is running.
    Started { pid: String },
    /// More than one matching process is running.
    Ambiguous { pids: Vec<String> },
    /// No matching process showed up.
    NotRunning,
    /// The start command could not be issued or the check failed.
    Failed(String),
}

/// Outcome of one [`StartEntry`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOutcome {
    pub panel: PanelId,
    pub host: String,
    pub command: String,
    pub status: StartStatus,
}

impl StartOutcome {
    /// The start could not be confirmed as a single clean process.
    #[must_use]
    pub fn verification_error(&self) -> Option<Error> {
        let matches = match &self.status {
            StartStatus::Ambiguous { pids } => pids.len(),
            StartStatus::NotRunning => 0,
            StartStatus::Started { .. } | StartStatus::Failed(_) => return None,
        };
        Some(Error::AmbiguousStart {
            host: self.host.clone(),
            command: self.command.clone(),
            matches,
        })
    }
}

/// Executes kill/start sets on the panel nodes.
pub struct ActionExecutor {
    channel: Arc<dyn RemoteChannel>,
    inspector: RemoteProcessInspector,
    config: ExecutorConfig,
}

impl ActionExecutor {
    /// Create a new executor. `owner` is the service account behaviors run as.
    pub fn new(channel: Arc<dyn RemoteChannel>, owner: impl Into<String>, config: ExecutorConfig) -> Self {
        Self {
            inspector: RemoteProcessInspector::new(channel.clone(), owner),
            channel,
            config,
        }
    }

    /// Shell command that launches `command` detached from the session.
    #[must_use]
    pub fn start_command(&self, command: &str) -> String {
        format!(
            "nohup {}/{command} > /dev/null 2>&1 &",
            self.config.scripts_dir.trim_end_matches('/')
        )
    }

    /// Kill every PID of every entry. A failure never stops the batch.
    pub async fn kill(&self, entries: &[KillEntry]) -> Vec<KillOutcome> {
        let mut outcomes = Vec::new();

        for entry in entries {
            let mut issued = Vec::new();
            for pid in &entry.pids {
                info!(host = %entry.host, pid = %pid, command = %entry.command, "Killing process");
                match self.issue_kill(&entry.host, pid).await {
                    Ok(()) => issued.push(pid.clone()),
                    Err(reason) => {
                        warn!(host = %entry.host, pid = %pid, reason = %reason, "Kill failed");
                        outcomes.push(KillOutcome {
                            panel: entry.panel,
                            host: entry.host.clone(),
                            pid: pid.clone(),
                            status: KillStatus::Failed(reason),
                        });
                    }
                }
            }
            if issued.is_empty() {
                continue;
            }

            tokio::time::sleep(self.config.verify_delay).await;
            let still_listed = self
                .inspector
                .live_processes(&entry.host, &self.config.search_term)
                .await
                .map(|live| live.into_iter().map(|p| p.pid).collect_vec());

            for pid in issued {
                let status = match &still_listed {
                    Ok(pids) if pids.contains(&pid) => {
                        warn!(host = %entry.host, pid = %pid, "Process still running after kill");
                        KillStatus::StillRunning
                    }
                    Ok(_) => KillStatus::Killed,
                    Err(e) => KillStatus::Unconfirmed(e.to_string()),
                };
                outcomes.push(KillOutcome {
                    panel: entry.panel,
                    host: entry.host.clone(),
                    pid,
                    status,
                });
            }
        }

        outcomes
    }

    async fn issue_kill(&self, host: &str, pid: &str) -> Result<(), String> {
        if pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("'{pid}' is not a process id"));
        }
        let output = self
            .channel
            .execute(host, &format!("kill {pid}"))
            .await
            .map_err(|e| e.to_string())?;
        if output.is_success() {
            Ok(())
        } else {
            Err(format!("kill exited with status {:?}", output.exit_status))
        }
    }

    /// Start every entry and check that exactly one matching process appears.
    pub async fn start(&self, entries: &[StartEntry]) -> Vec<StartOutcome> {
        let mut outcomes = Vec::with_capacity(entries.len());

        for entry in entries {
            info!(host = %entry.host, command = %entry.command, "Starting behavior");
            let status = self.start_one(entry).await;
            if let StartStatus::Started { pid } = &status {
                info!(host = %entry.host, pid = %pid, "Start confirmed");
            } else {
                warn!(host = %entry.host, command = %entry.command, status = ?status, "Start failed");
            }
            outcomes.push(StartOutcome {
                panel: entry.panel,
                host: entry.host.clone(),
                command: entry.command.clone(),
                status,
            });
        }

        outcomes
    }

    async fn start_one(&self, entry: &StartEntry) -> StartStatus {
        if let Err(e) = self
            .channel
            .execute(&entry.host, &self.start_command(&entry.command))
            .await
        {
            return StartStatus::Failed(e.to_string());
        }

        tokio::time::sleep(self.config.verify_delay).await;
        match self.inspector.live_processes(&entry.host, &entry.command).await {
            Ok(live) => {
                let mut pids = live
                    .into_iter()
                    .filter(|p| p.signature == entry.command)
                    .map(|p| p.pid)
                    .collect_vec();
                match pids.len() {
                    0 => StartStatus::NotRunning,
                    1 => StartStatus::Started {
                        pid: pids.remove(0),
                    },
                    _ => StartStatus::Ambiguous { pids },
                }
            }
            Err(e) => StartStatus::Failed(e.to_string()),
        }
    }
}
