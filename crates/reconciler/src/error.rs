//! Error types for the reconciler crate.

use operant_remote::RemoteError;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// A table line could not be turned into a desired entry.
    #[error("line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    /// A panel's remote session failed or timed out.
    #[error("remote channel failure on {host}: {source}")]
    RemoteChannel {
        host: String,
        #[source]
        source: RemoteError,
    },

    /// Post-start verification did not find exactly one matching process.
    #[error("start of '{command}' on {host} not confirmed: {matches} matching processes")]
    AmbiguousStart {
        host: String,
        command: String,
        matches: usize,
    },

    /// The desired-state table could not be read at all.
    #[error("desired-state table {location} unavailable: {reason}")]
    TableUnavailable { location: String, reason: String },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file is not valid TOML for `Config`.
    #[error("failed to parse config {path}: {reason}")]
    ConfigParse { path: String, reason: String },

    /// Local I/O failure.
    #[error("io error: {0}")]
    Io(String),
}

impl Error {
    /// Create a malformed-line error.
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedLine {
            line,
            reason: reason.into(),
        }
    }

    /// Wrap a channel failure for `host`.
    pub fn remote(host: impl Into<String>, source: RemoteError) -> Self {
        Self::RemoteChannel {
            host: host.into(),
            source,
        }
    }

    /// Create a table-unavailable error.
    pub fn table_unavailable(location: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TableUnavailable {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_display() {
        let err = Error::malformed(7, "expected at least 5 fields, found 3");
        assert!(err.to_string().starts_with("line 7:"));
    }

    #[test]
    fn test_remote_keeps_source() {
        let err = Error::remote("magpi04", RemoteError::unreachable("magpi04", "down"));
        assert!(err.to_string().contains("magpi04"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_ambiguous_start_display() {
        let err = Error::AmbiguousStart {
            host: "magpi02".into(),
            command: "behave_pecker.py 23 1".into(),
            matches: 2,
        };
        assert!(err.to_string().contains("2 matching"));
    }
}
