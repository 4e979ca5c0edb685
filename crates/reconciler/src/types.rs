//! Core types for the reconciler.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Panel number from the first column of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(pub u32);

impl PanelId {
    /// Node host name: `prefix` followed by the panel number padded to two digits.
    #[must_use]
    pub fn host_name(self, prefix: &str) -> String {
        format!("{prefix}{:02}", self.0)
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the panel/subject/behavior table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredEntry {
    /// 1-based line number in the table.
    pub line: usize,
    pub panel: PanelId,
    /// Whether the behavior should be running.
    pub enabled: bool,
    /// Subject identifier, e.g. `B23`.
    pub subject: String,
    pub behavior_dir: String,
    /// Command as it should appear in a live process signature.
    pub behavior_command: String,
}

/// A behavior process observed on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveProcess {
    /// Listing line as returned by the node.
    pub raw_line: String,
    pub owner: String,
    pub pid: String,
    /// Normalized command, comparable to `DesiredEntry::behavior_command`.
    pub signature: String,
}

/// Why a process is scheduled for termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillReason {
    /// The panel's behavior is disabled but running.
    Disabled,
    /// A process that is not the panel's desired behavior.
    Unexpected,
}

/// Processes to terminate on one panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillEntry {
    /// Table line the decision came from.
    pub line: usize,
    pub panel: PanelId,
    pub host: String,
    /// Desired command for `Disabled`, the raw listing line for `Unexpected`.
    pub command: String,
    pub pids: Vec<String>,
    pub reason: KillReason,
}

/// A behavior to launch on one panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartEntry {
    /// Table line the decision came from.
    pub line: usize,
    pub panel: PanelId,
    pub host: String,
    pub command: String,
}

/// An enabled behavior that is already running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunningEntry {
    /// Table line the decision came from.
    pub line: usize,
    pub panel: PanelId,
    pub host: String,
    pub command: String,
    pub pids: Vec<String>,
}

/// A disabled behavior that is correctly not running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdleEntry {
    /// Table line the decision came from.
    pub line: usize,
    pub panel: PanelId,
    pub host: String,
    pub command: String,
}

/// A panel whose live state could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelFailure {
    /// Table line the decision came from.
    pub line: usize,
    pub panel: PanelId,
    pub host: String,
    pub reason: String,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub to_kill: Vec<KillEntry>,
    pub to_start: Vec<StartEntry>,
    pub running: Vec<RunningEntry>,
    pub idle: Vec<IdleEntry>,
    pub failures: Vec<PanelFailure>,
}

impl ReconcileReport {
    /// Create an empty report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// No kills and no starts are needed.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.to_kill.is_empty() && self.to_start.is_empty()
    }

    /// Some panels could not be inspected.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Total number of PIDs scheduled for termination.
    #[must_use]
    pub fn kill_pid_count(&self) -> usize {
        self.to_kill.iter().map(|k| k.pids.len()).sum()
    }
}
