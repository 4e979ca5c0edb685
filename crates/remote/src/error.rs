//! Error types for the remote channel.

use thiserror::Error;

/// Result type alias for remote channel operations.
pub type Result<T> = std::result::Result<T, RemoteError>;

/// Failures of the remote command channel.
///
/// A non-zero exit status of the remote command itself is *not* an error:
/// `grep` exits 1 when nothing matches, and callers decide what a status means.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The local `ssh` process could not be spawned.
    #[error("failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    /// The remote call did not finish within its deadline.
    #[error("command on {host} timed out after {after_secs}s")]
    Timeout { host: String, after_secs: u64 },

    /// SSH reported a connection-level failure (exit status 255).
    #[error("ssh connection to {host} failed: {stderr}")]
    ConnectionFailed { host: String, stderr: String },

    /// Host is unknown or marked down (in-memory fleet).
    #[error("host {host} unreachable: {reason}")]
    Unreachable { host: String, reason: String },

    /// Local I/O failure while talking to the child process.
    #[error("io error: {0}")]
    Io(String),
}

impl RemoteError {
    /// Create an unreachable-host error.
    pub fn unreachable(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            host: host.into(),
            reason: reason.into(),
        }
    }

    /// Host the failure relates to, when known.
    #[must_use]
    pub fn host(&self) -> Option<&str> {
        match self {
            Self::Timeout { host, .. }
            | Self::ConnectionFailed { host, .. }
            | Self::Unreachable { host, .. } => Some(host),
            Self::Spawn { .. } | Self::Io(_) => None,
        }
    }
}

impl From<std::io::Error> for RemoteError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
