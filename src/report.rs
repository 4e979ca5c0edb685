//! Rendering of reconciliation reports and action outcomes.

use operant_reconciler::{
    KillOutcome, KillReason, KillStatus, ReconcileReport, StartOutcome, StartStatus,
};
use serde::Serialize;

/// Everything one run produced, for `--json`.
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub report: &'a ReconcileReport,
    pub kills: &'a [KillOutcome],
    pub starts: &'a [StartOutcome],
}

/// One line per panel decision, in table order.
///
/// A row's own decision comes first, followed by any unexpected processes
/// found on its panel.
pub fn report_lines(report: &ReconcileReport) -> Vec<String> {
    let mut lines: Vec<(usize, u8, String)> = Vec::new();

    for entry in &report.running {
        lines.push((
            entry.line,
            0,
            format!(
                "Panel {} | Process already running: {} | PID(s): {}",
                entry.panel,
                entry.command,
                entry.pids.join(", ")
            ),
        ));
    }
    for entry in &report.to_start {
        lines.push((
            entry.line,
            0,
            format!("Panel {} | Process needs to start: {}", entry.panel, entry.command),
        ));
    }
    for entry in &report.to_kill {
        let (rank, what) = match entry.reason {
            KillReason::Disabled => (0, "Process needs to be killed"),
            KillReason::Unexpected => (1, "Unexpected process needs to be killed"),
        };
        lines.push((
            entry.line,
            rank,
            format!(
                "Panel {} | {what}: {} | PID(s): {}",
                entry.panel,
                entry.command,
                entry.pids.join(", ")
            ),
        ));
    }
    for entry in &report.idle {
        lines.push((
            entry.line,
            0,
            format!(
                "Panel {} | Process is correctly not running: {}",
                entry.panel, entry.command
            ),
        ));
    }
    for failure in &report.failures {
        lines.push((
            failure.line,
            0,
            format!(
                "Panel {} | Could not inspect {}: {}",
                failure.panel, failure.host, failure.reason
            ),
        ));
    }

    // Stable: unexpected processes keep their listing order within a row.
    lines.sort_by_key(|(line, rank, _)| (*line, *rank));
    lines.into_iter().map(|(_, _, text)| text).collect()
}

pub fn kill_lines(outcomes: &[KillOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .map(|o| {
            let status = match &o.status {
                KillStatus::Killed => "killed".to_string(),
                KillStatus::StillRunning => "still running".to_string(),
                KillStatus::Unconfirmed(reason) => format!("unconfirmed ({reason})"),
                KillStatus::Failed(reason) => format!("failed ({reason})"),
            };
            format!("Kill {} in {}: {status}", o.pid, o.host)
        })
        .collect()
}

pub fn start_lines(outcomes: &[StartOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .map(|o| {
            let status = match &o.status {
                StartStatus::Started { pid } => format!("started (PID {pid})"),
                StartStatus::Ambiguous { pids } => {
                    format!("start failed, {} copies running ({})", pids.len(), pids.join(", "))
                }
                StartStatus::NotRunning => "start failed, not running".to_string(),
                StartStatus::Failed(reason) => format!("start failed ({reason})"),
            };
            format!("Start \"{}\" in {}: {status}", o.command, o.host)
        })
        .collect()
}

/// True if any action did not reach its intended state.
pub fn any_action_failed(kills: &[KillOutcome], starts: &[StartOutcome]) -> bool {
    kills.iter().any(|k| k.status != KillStatus::Killed)
        || starts
            .iter()
            .any(|s| !matches!(s.status, StartStatus::Started { .. }))
}
