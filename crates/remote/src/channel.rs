//! The `RemoteChannel` seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Captured result of one remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Standard output split into lines, line terminators removed.
    pub stdout_lines: Vec<String>,
    /// Exit status of the remote command, `None` if it was killed by a signal.
    pub exit_status: Option<i32>,
}

impl CommandOutput {
    /// Build an output from raw stdout text.
    #[must_use]
    pub fn from_stdout(stdout: &str, exit_status: Option<i32>) -> Self {
        Self {
            stdout_lines: stdout.lines().map(str::to_string).collect(),
            exit_status,
        }
    }

    /// Whether the remote command exited with status 0.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.exit_status == Some(0)
    }
}

/// Executes a shell command on a named host and captures its output.
///
/// How the host is reached (direct SSH, a hop through a gateway, an in-memory
/// simulation) is decided once at startup by choosing the implementation.
#[async_trait]
pub trait RemoteChannel: Send + Sync {
    /// Run `command` on `host`.
    ///
    /// # Errors
    ///
    /// Returns an error when the host cannot be reached or the call times out.
    /// A non-zero exit status of `command` is reported in the output instead.
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput>;
}
