//! Live process inspection on panel nodes.
//!
//! Nodes are queried with `ps -ef | grep '<term>'`. The listing format is fixed
//! (UID PID PPID C STIME TTY TIME CMD...) and the matching key is derived from
//! it positionally: the last [`SIGNATURE_FIELDS`] fields, re-joined, keeping
//! only what follows the final `/`. For a line ending in
//! `python /home/bird/pyoperant/scripts/behave_pecker.py 23 1` that is
//! `behave_pecker.py 23 1`.

use std::sync::Arc;

use operant_remote::{RemoteChannel, shell_quote};
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::LiveProcess;

/// Number of trailing listing fields that form the signature window.
pub const SIGNATURE_FIELDS: usize = 6;

/// A listing line must have more fields than this to be a behavior process.
pub const MIN_LISTING_FIELDS: usize = 8;

/// Lines containing this are the search command itself.
const SEARCH_ARTIFACT: &str = "grep";

/// Reduce a listing line to its behavior signature.
///
/// Takes the trailing [`SIGNATURE_FIELDS`] whitespace-delimited fields (all of
/// them if there are fewer), joins them with single spaces and returns the part
/// after the last `/`.
#[must_use]
pub fn normalize_signature(raw_line: &str) -> String {
    let fields: Vec<&str> = raw_line.split_whitespace().collect();
    let start = fields.len().saturating_sub(SIGNATURE_FIELDS);
    let window = fields.get(start..).unwrap_or_default().join(" ");
    window
        .rsplit_once('/')
        .map_or_else(|| window.clone(), |(_, tail)| tail.to_string())
}

/// Turn one listing line into a [`LiveProcess`] if it passes the ownership and
/// shape rules.
#[must_use]
pub fn parse_live_line(line: &str, owner: &str, search_term: &str) -> Option<LiveProcess> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() <= MIN_LISTING_FIELDS {
        return None;
    }
    let line_owner = *fields.first()?;
    let pid = *fields.get(1)?;
    if line_owner != owner || !line.contains(search_term) || line.contains(SEARCH_ARTIFACT) {
        return None;
    }
    Some(LiveProcess {
        raw_line: line.to_string(),
        owner: line_owner.to_string(),
        pid: pid.to_string(),
        signature: normalize_signature(line),
    })
}

/// Shell command that lists processes matching `search_term`.
#[must_use]
pub fn listing_command(search_term: &str) -> String {
    format!("ps -ef | grep {}", shell_quote(search_term))
}

/// Queries nodes for running behavior processes.
#[derive(Clone)]
pub struct RemoteProcessInspector {
    channel: Arc<dyn RemoteChannel>,
    owner: String,
}

impl RemoteProcessInspector {
    /// Create an inspector that keeps processes owned by `owner`.
    pub fn new(channel: Arc<dyn RemoteChannel>, owner: impl Into<String>) -> Self {
        Self {
            channel,
            owner: owner.into(),
        }
    }

    /// Service account whose processes are considered.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Raw listing lines for `search_term` on `host`.
    ///
    /// # Errors
    ///
    /// Returns `Error::RemoteChannel` if the node cannot be queried.
    pub async fn list_processes(&self, host: &str, search_term: &str) -> Result<Vec<String>> {
        let output = self
            .channel
            .execute(host, &listing_command(search_term))
            .await
            .map_err(|e| Error::remote(host, e))?;
        debug!(host, lines = output.stdout_lines.len(), "Listed processes");
        Ok(output.stdout_lines)
    }

    /// Keep only the lines that describe behavior processes.
    #[must_use]
    pub fn filter_live(&self, lines: &[String], search_term: &str) -> Vec<LiveProcess> {
        lines
            .iter()
            .filter_map(|line| parse_live_line(line, &self.owner, search_term))
            .collect()
    }

    /// List and filter in one step.
    ///
    /// # Errors
    ///
    /// Returns `Error::RemoteChannel` if the node cannot be queried.
    pub async fn live_processes(&self, host: &str, search_term: &str) -> Result<Vec<LiveProcess>> {
        let lines = self.list_processes(host, search_term).await?;
        Ok(self.filter_live(&lines, search_term))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use operant_remote::InMemoryChannel;
    use proptest::prelude::*;

    const TERM: &str = "pyoperant/scripts/behave";
    const LINE: &str =
        "bird      1234     1  0 10:00 ?        00:00:01 python /home/bird/pyoperant/scripts/behave_pecker.py 23 1";

    #[test]
    fn test_normalize_example() {
        assert_eq!(normalize_signature(LINE), "behave_pecker.py 23 1");
    }

    #[test]
    fn test_normalize_short_line_uses_all_fields() {
        assert_eq!(normalize_signature("a /x/run.py 3"), "run.py 3");
        assert_eq!(normalize_signature("plain words"), "plain words");
    }

    #[test]
    fn test_normalize_is_positional() {
        // Seven command tokens push the path out of the window.
        let line = "bird 1 1 0 10:00 ? 00:00:01 python /s/run.py a b c d e f";
        assert_eq!(normalize_signature(line), "a b c d e f");
    }

    #[test]
    fn test_parse_live_line_accepts_behavior() {
        let live = parse_live_line(LINE, "bird", TERM).unwrap();
        assert_eq!(live.owner, "bird");
        assert_eq!(live.pid, "1234");
        assert_eq!(live.signature, "behave_pecker.py 23 1");
    }

    #[test]
    fn test_parse_live_line_rejects_other_owner() {
        let line = LINE.replacen("bird ", "root ", 1);
        assert!(parse_live_line(&line, "bird", TERM).is_none());
    }

    #[test]
    fn test_parse_live_line_rejects_grep_artifact() {
        let line = "bird 2000 1999 0 10:00 pts/0 00:00:00 grep pyoperant/scripts/behave";
        assert!(parse_live_line(line, "bird", TERM).is_none());
    }

    #[test]
    fn test_parse_live_line_rejects_short_lines() {
        let line = "bird 1234 1 0 10:00 ? 00:00:01 pyoperant/scripts/behave";
        assert!(parse_live_line(line, "bird", TERM).is_none());
    }

    #[test]
    fn test_parse_live_line_requires_search_term() {
        let line = "bird 1234 1 0 10:00 ? 00:00:01 python /home/bird/other/tool.py 1 2";
        assert!(parse_live_line(line, "bird", TERM).is_none());
    }

    #[test]
    fn test_listing_command_quotes_term() {
        assert_eq!(
            listing_command(TERM),
            "ps -ef | grep 'pyoperant/scripts/behave'"
        );
    }

    #[tokio::test]
    async fn test_live_processes_through_channel() {
        let fleet = Arc::new(InMemoryChannel::new());
        let pid = fleet.spawn(
            "magpi01",
            "bird",
            "python /home/bird/pyoperant/scripts/behave_pecker.py 23 1",
        );
        fleet.spawn("magpi01", "root", "/usr/sbin/cron -f");
        let inspector = RemoteProcessInspector::new(fleet, "bird");

        let live = inspector.live_processes("magpi01", TERM).await.unwrap();

        assert_eq!(live.len(), 1);
        assert_eq!(live[0].pid, pid.to_string());
        assert_eq!(live[0].signature, "behave_pecker.py 23 1");
    }

    #[tokio::test]
    async fn test_list_processes_maps_channel_failure() {
        let fleet = Arc::new(InMemoryChannel::new());
        let inspector = RemoteProcessInspector::new(fleet, "bird");

        let result = inspector.list_processes("magpi09", TERM).await;

        assert!(matches!(result, Err(Error::RemoteChannel { ref host, .. }) if host == "magpi09"));
    }

    proptest! {
        #[test]
        fn prop_signature_round_trips_behavior_command(
            tokens in prop::collection::vec("[a-z0-9_.]{1,12}", 1..=SIGNATURE_FIELDS)
        ) {
            let command = tokens.join(" ");
            let line = format!(
                "bird 4321 1 0 10:00 ? 00:00:03 python /home/bird/pyoperant/scripts/{command}"
            );
            prop_assert_eq!(normalize_signature(&line), command);
        }
    }
}
