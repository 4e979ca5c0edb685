//! Reconciler implementation.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use itertools::Itertools;
use operant_remote::RemoteChannel;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::inspect::RemoteProcessInspector;
use crate::types::{
    DesiredEntry, IdleEntry, KillEntry, KillReason, LiveProcess, PanelFailure, ReconcileReport,
    RunningEntry, StartEntry,
};

/// Configuration for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Host name prefix; panel 3 lives on `<prefix>03`.
    pub node_prefix: String,
    /// Substring that marks a behavior process in the listing.
    pub search_term: String,
    /// Maximum panels inspected at the same time.
    pub concurrency: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            node_prefix: "magpi".to_string(),
            search_term: "pyoperant/scripts/behave".to_string(),
            concurrency: 8,
        }
    }
}

/// Compares the desired-state table with what is running on each panel.
pub struct Reconciler {
    inspector: RemoteProcessInspector,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler. `owner` is the service account behaviors run as.
    pub fn new(
        channel: Arc<dyn RemoteChannel>,
        owner: impl Into<String>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            inspector: RemoteProcessInspector::new(channel, owner),
            config,
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Core reconciliation: inspect every panel and compute kill/start sets.
    ///
    /// Panels are inspected concurrently but the report follows the order of
    /// `entries`. A panel that cannot be inspected lands in
    /// `ReconcileReport::failures` and does not affect the others.
    pub async fn reconcile(&self, entries: &[DesiredEntry]) -> ReconcileReport {
        info!(
            panels = entries.len(),
            concurrency = self.config.concurrency,
            "Starting reconciliation"
        );

        let observations: Vec<(&DesiredEntry, String, Result<Vec<LiveProcess>>)> =
            stream::iter(entries)
                .map(|entry| self.observe(entry))
                .buffered(self.config.concurrency.max(1))
                .collect()
                .await;

        let mut report = ReconcileReport::new();
        for (entry, host, live) in observations {
            match live {
                Ok(live) => classify(entry, &host, &live, &mut report),
                Err(e) => {
                    warn!(panel = %entry.panel, host = %host, error = %e, "Panel inspection failed");
                    report.failures.push(PanelFailure {
                        line: entry.line,
                        panel: entry.panel,
                        host,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if report.is_converged() {
            info!(failures = report.failures.len(), "Panels converged");
        } else {
            info!(
                to_kill = report.to_kill.len(),
                to_start = report.to_start.len(),
                failures = report.failures.len(),
                "Reconciliation complete"
            );
        }

        report
    }

    /// Fetch the live behavior processes for one entry's panel.
    async fn observe<'a>(
        &self,
        entry: &'a DesiredEntry,
    ) -> (&'a DesiredEntry, String, Result<Vec<LiveProcess>>) {
        let host = entry.panel.host_name(&self.config.node_prefix);
        let live = self
            .inspector
            .live_processes(&host, &self.config.search_term)
            .await;
        (entry, host, live)
    }
}

/// Classify one panel's live processes against its desired entry.
///
/// - enabled and running: reported as running with every matching PID
/// - enabled and not running: scheduled to start
/// - disabled and running: scheduled to kill with every matching PID
/// - disabled and not running: reported as idle
///
/// Independently, every live process whose signature differs from the desired
/// command gets its own kill entry.
pub fn classify(entry: &DesiredEntry, host: &str, live: &[LiveProcess], report: &mut ReconcileReport) {
    let command = &entry.behavior_command;
    let matching = live
        .iter()
        .filter(|p| &p.signature == command)
        .map(|p| p.pid.clone())
        .collect_vec();

    match (entry.enabled, matching.is_empty()) {
        (true, false) => {
            debug!(panel = %entry.panel, command = %command, pids = ?matching, "Process already running");
            report.running.push(RunningEntry {
                line: entry.line,
                panel: entry.panel,
                host: host.to_string(),
                command: command.clone(),
                pids: matching,
            });
        }
        (true, true) => {
            debug!(panel = %entry.panel, command = %command, "Process needs to start");
            report.to_start.push(StartEntry {
                line: entry.line,
                panel: entry.panel,
                host: host.to_string(),
                command: command.clone(),
            });
        }
        (false, false) => {
            debug!(panel = %entry.panel, command = %command, pids = ?matching, "Process needs to be killed");
            report.to_kill.push(KillEntry {
                line: entry.line,
                panel: entry.panel,
                host: host.to_string(),
                command: command.clone(),
                pids: matching,
                reason: KillReason::Disabled,
            });
        }
        (false, true) => {
            debug!(panel = %entry.panel, command = %command, "Process is correctly not running");
            report.idle.push(IdleEntry {
                line: entry.line,
                panel: entry.panel,
                host: host.to_string(),
                command: command.clone(),
            });
        }
    }

    for process in live.iter().filter(|p| &p.signature != command) {
        debug!(panel = %entry.panel, line = %process.raw_line, "Unexpected process needs to be killed");
        report.to_kill.push(KillEntry {
            line: entry.line,
            panel: entry.panel,
            host: host.to_string(),
            command: process.raw_line.clone(),
            pids: vec![process.pid.clone()],
            reason: KillReason::Unexpected,
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::types::PanelId;
    use operant_remote::InMemoryChannel;

    const CMD: &str = "behave_pecker.py 23 1";

    fn entry(panel: u32, enabled: bool, command: &str) -> DesiredEntry {
        DesiredEntry {
            line: 1,
            panel: PanelId(panel),
            enabled,
            subject: "B23".into(),
            behavior_dir: "/obj/birds/23".into(),
            behavior_command: command.into(),
        }
    }

    fn live(pid: &str, signature: &str) -> LiveProcess {
        LiveProcess {
            raw_line: format!("bird {pid} 1 0 10:00 ? 00:00:01 python /s/{signature}"),
            owner: "bird".into(),
            pid: pid.into(),
            signature: signature.into(),
        }
    }

    fn behave(script_and_args: &str) -> String {
        format!("python /home/bird/pyoperant/scripts/{script_and_args}")
    }

    #[test]
    fn test_classify_enabled_running() {
        let mut report = ReconcileReport::new();
        classify(&entry(1, true, CMD), "magpi01", &[live("10", CMD), live("11", CMD)], &mut report);

        assert_eq!(report.running.len(), 1);
        assert_eq!(report.running[0].pids, vec!["10", "11"]);
        assert!(report.is_converged());
    }

    #[test]
    fn test_classify_enabled_missing_starts() {
        let mut report = ReconcileReport::new();
        classify(&entry(1, true, CMD), "magpi01", &[], &mut report);

        assert_eq!(report.to_start.len(), 1);
        assert_eq!(report.to_start[0].command, CMD);
        assert!(report.to_kill.is_empty());
    }

    #[test]
    fn test_classify_disabled_running_kills_all_matches() {
        let mut report = ReconcileReport::new();
        classify(&entry(2, false, CMD), "magpi02", &[live("20", CMD), live("21", CMD)], &mut report);

        assert_eq!(report.to_kill.len(), 1);
        assert_eq!(report.to_kill[0].pids, vec!["20", "21"]);
        assert_eq!(report.to_kill[0].reason, KillReason::Disabled);
        assert!(report.to_start.is_empty());
    }

    #[test]
    fn test_classify_disabled_idle() {
        let mut report = ReconcileReport::new();
        classify(&entry(2, false, CMD), "magpi02", &[], &mut report);

        assert_eq!(report.idle.len(), 1);
        assert!(report.is_converged());
    }

    #[test]
    fn test_classify_extra_processes_each_killed() {
        let mut report = ReconcileReport::new();
        let processes = [live("30", CMD), live("31", "other.py 9 1"), live("32", "old.py 4 1")];
        classify(&entry(3, true, CMD), "magpi03", &processes, &mut report);

        assert_eq!(report.running.len(), 1);
        assert_eq!(report.to_kill.len(), 2);
        assert!(report.to_kill.iter().all(|k| k.reason == KillReason::Unexpected));
        assert!(report.to_kill.iter().all(|k| k.line == 1));
        assert_eq!(report.to_kill[0].pids, vec!["31"]);
        assert_eq!(report.to_kill[0].command, processes[1].raw_line);
        assert_eq!(report.to_kill[1].pids, vec!["32"]);
    }

    #[test]
    fn test_classify_wrong_behavior_on_enabled_panel() {
        let mut report = ReconcileReport::new();
        classify(&entry(4, true, CMD), "magpi04", &[live("40", "behave_pecker.py 99 1")], &mut report);

        assert_eq!(report.to_start.len(), 1);
        assert_eq!(report.to_kill.len(), 1);
        assert_eq!(report.to_kill[0].pids, vec!["40"]);
    }

    #[tokio::test]
    async fn test_reconcile_against_fleet() {
        // GIVEN: panel 1 running correctly, panel 2 disabled but running
        let fleet = Arc::new(InMemoryChannel::new());
        let running = fleet.spawn("magpi01", "bird", &behave("behave_pecker.py 23 1"));
        let stale = fleet.spawn("magpi02", "bird", &behave("behave_pecker.py 24 1"));
        let reconciler = Reconciler::new(fleet, "bird", ReconcilerConfig::default());

        // WHEN
        let report = reconciler
            .reconcile(&[
                entry(1, true, "behave_pecker.py 23 1"),
                entry(2, false, "behave_pecker.py 24 1"),
            ])
            .await;

        // THEN
        assert_eq!(report.running[0].pids, vec![running.to_string()]);
        assert_eq!(report.to_kill.len(), 1);
        assert_eq!(report.to_kill[0].pids, vec![stale.to_string()]);
        assert!(report.to_start.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_panel_does_not_block_others() {
        let fleet = Arc::new(InMemoryChannel::new().with_host("magpi02"));
        fleet.set_reachable("magpi01", false);
        let reconciler = Reconciler::new(fleet, "bird", ReconcilerConfig::default());

        let report = reconciler
            .reconcile(&[entry(1, true, CMD), entry(2, true, CMD)])
            .await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].host, "magpi01");
        assert_eq!(report.to_start.len(), 1);
        assert_eq!(report.to_start[0].host, "magpi02");
    }

    #[tokio::test]
    async fn test_report_order_follows_input_under_concurrency() {
        let fleet = Arc::new(InMemoryChannel::new());
        for panel in 1..=12 {
            fleet.set_reachable(&PanelId(panel).host_name("magpi"), true);
        }
        let config = ReconcilerConfig {
            concurrency: 4,
            ..ReconcilerConfig::default()
        };
        let reconciler = Reconciler::new(fleet, "bird", config);
        let entries = (1..=12).rev().map(|p| entry(p, true, CMD)).collect_vec();

        let report = reconciler.reconcile(&entries).await;

        let panels = report.to_start.iter().map(|s| s.panel.0).collect_vec();
        assert_eq!(panels, (1..=12).rev().collect_vec());
    }
}
