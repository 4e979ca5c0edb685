//! Where the desired-state table comes from.

use std::path::PathBuf;
use std::sync::Arc;

use operant_remote::{RemoteChannel, shell_quote};
use tracing::info;

use crate::error::{Error, Result};

/// Location of the panel/subject/behavior table.
#[derive(Clone)]
pub enum TableSource {
    /// A file on this machine.
    Local(PathBuf),
    /// A file on `host`, read with `cat`.
    Remote {
        channel: Arc<dyn RemoteChannel>,
        host: String,
        path: String,
    },
}

impl TableSource {
    /// Human-readable location, used in logs and errors.
    #[must_use]
    pub fn location(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Remote { host, path, .. } => format!("{host}:{path}"),
        }
    }

    /// Fetch the table as lines.
    ///
    /// # Errors
    ///
    /// Returns `Error::TableUnavailable` if the file cannot be read. Without the
    /// table nothing can be reconciled, so callers treat this as fatal.
    pub async fn fetch_lines(&self) -> Result<Vec<String>> {
        let lines = match self {
            Self::Local(path) => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| Error::table_unavailable(self.location(), e.to_string()))?
                .lines()
                .map(str::to_string)
                .collect::<Vec<_>>(),
            Self::Remote {
                channel,
                host,
                path,
            } => {
                let output = channel
                    .execute(host, &format!("cat {}", shell_quote(path)))
                    .await
                    .map_err(|e| Error::table_unavailable(self.location(), e.to_string()))?;
                if !output.is_success() {
                    return Err(Error::table_unavailable(
                        self.location(),
                        format!("cat exited with status {:?}", output.exit_status),
                    ));
                }
                output.stdout_lines
            }
        };

        info!(location = %self.location(), lines = lines.len(), "Fetched desired-state table");
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::io::Write;

    use super::*;
    use operant_remote::InMemoryChannel;

    #[tokio::test]
    async fn test_local_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# header").unwrap();
        writeln!(file, "1 1 23 d a.py").unwrap();

        let source = TableSource::Local(file.path().to_path_buf());
        let lines = source.fetch_lines().await.unwrap();

        assert_eq!(lines, vec!["# header".to_string(), "1 1 23 d a.py".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let source = TableSource::Local(PathBuf::from("/nonexistent/panel_subject_behavior"));
        let result = source.fetch_lines().await;
        assert!(matches!(result, Err(Error::TableUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_remote_cat() {
        let fleet = Arc::new(
            InMemoryChannel::new()
                .with_host("bird@magpi")
                .with_file("/home/bird/opdat/panel_subject_behavior", "1 1 23 d a.py\n"),
        );
        let source = TableSource::Remote {
            channel: fleet.clone(),
            host: "bird@magpi".into(),
            path: "/home/bird/opdat/panel_subject_behavior".into(),
        };

        let lines = source.fetch_lines().await.unwrap();

        assert_eq!(lines, vec!["1 1 23 d a.py".to_string()]);
        assert_eq!(
            fleet.commands()[0].1,
            "cat '/home/bird/opdat/panel_subject_behavior'"
        );
    }

    #[tokio::test]
    async fn test_remote_missing_file() {
        let fleet = Arc::new(InMemoryChannel::new().with_host("bird@magpi"));
        let source = TableSource::Remote {
            channel: fleet,
            host: "bird@magpi".into(),
            path: "/nope".into(),
        };
        let result = source.fetch_lines().await;
        assert!(matches!(result, Err(Error::TableUnavailable { .. })));
    }
}
