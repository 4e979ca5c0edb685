//! Panel/subject/behavior table parsing.
//!
//! Each non-comment line reads
//!
//! ```text
//! <panel> <enabled> <subject-number> <dir-template> <command tokens...>
//! 1       1         23               /obj/birds/<3> behave_pecker.py <3> <1>
//! ```
//!
//! The subject placeholder (`<3>`) is replaced by the subject number in both the
//! directory and the command; the session placeholder (`<1>`) is replaced by a
//! fixed session value in the command only.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{DesiredEntry, PanelId};

/// Minimum number of whitespace-separated fields on a table line.
pub const MIN_FIELDS: usize = 5;

/// Literal tokens used when building entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableFormat {
    /// Prepended to the subject number (`B` + `23` = `B23`).
    pub subject_prefix: String,
    pub subject_placeholder: String,
    pub session_placeholder: String,
    /// Substituted for `session_placeholder`.
    pub session_value: String,
}

impl Default for TableFormat {
    fn default() -> Self {
        Self {
            subject_prefix: "B".to_string(),
            subject_placeholder: "<3>".to_string(),
            session_placeholder: "<1>".to_string(),
            session_value: "1".to_string(),
        }
    }
}

/// What to do with a line that cannot be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParsePolicy {
    /// Record the error, warn, and keep going.
    #[default]
    Lenient,
    /// Abort on the first malformed line.
    Strict,
}

/// Parsed table: entries in input order plus rejected lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredTable {
    pub entries: Vec<DesiredEntry>,
    pub rejected: Vec<Error>,
}

/// Comment, empty, and whitespace-only lines carry no entry.
#[must_use]
pub fn is_skippable(text: &str) -> bool {
    text.starts_with('#') || text.trim().is_empty()
}

/// Parse a single table line.
///
/// Returns `Ok(None)` for comment and blank lines.
///
/// # Errors
///
/// Returns `Error::MalformedLine` when the line has fewer than [`MIN_FIELDS`]
/// fields, the panel is not a number, or the enabled flag is not `0`/`1`.
pub fn parse_line(line_no: usize, text: &str, format: &TableFormat) -> Result<Option<DesiredEntry>> {
    if is_skippable(text) {
        return Ok(None);
    }

    let tokens: Vec<&str> = text.split_whitespace().collect();
    let [panel, enabled, subject_number, dir_template, command @ ..] = tokens.as_slice() else {
        return Err(too_few_fields(line_no, tokens.len()));
    };
    if command.is_empty() {
        return Err(too_few_fields(line_no, tokens.len()));
    }

    let panel = panel
        .parse::<u32>()
        .map(PanelId)
        .map_err(|_| Error::malformed(line_no, format!("panel '{panel}' is not a number")))?;

    let enabled = match *enabled {
        "1" => true,
        "0" => false,
        other => {
            return Err(Error::malformed(
                line_no,
                format!("enabled flag '{other}' must be 0 or 1"),
            ));
        }
    };

    let behavior_command = command
        .join(" ")
        .replace(&format.subject_placeholder, subject_number)
        .replace(&format.session_placeholder, &format.session_value);

    Ok(Some(DesiredEntry {
        line: line_no,
        panel,
        enabled,
        subject: format!("{}{subject_number}", format.subject_prefix),
        behavior_dir: dir_template.replace(&format.subject_placeholder, subject_number),
        behavior_command,
    }))
}

fn too_few_fields(line_no: usize, found: usize) -> Error {
    Error::malformed(
        line_no,
        format!("expected at least {MIN_FIELDS} fields, found {found}"),
    )
}

/// Parse a whole table, keeping entries in input order.
///
/// # Errors
///
/// With [`ParsePolicy::Strict`], returns the first malformed line's error.
/// With [`ParsePolicy::Lenient`], never fails.
pub fn parse_table<I, S>(lines: I, format: &TableFormat, policy: ParsePolicy) -> Result<DesiredTable>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut table = DesiredTable::default();

    for (idx, line) in lines.into_iter().enumerate() {
        let line_no = idx.saturating_add(1);
        match parse_line(line_no, line.as_ref(), format) {
            Ok(Some(entry)) => table.entries.push(entry),
            Ok(None) => {}
            Err(e) if policy == ParsePolicy::Strict => return Err(e),
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed table line");
                table.rejected.push(e);
            }
        }
    }

    debug!(
        entries = table.entries.len(),
        rejected = table.rejected.len(),
        "Parsed desired-state table"
    );
    Ok(table)
}
