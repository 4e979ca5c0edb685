//! Configuration loading.
//!
//! Sources, lowest to highest precedence:
//! 1. built-in defaults
//! 2. a TOML file: `--config <path>`, or the global `operantctl/config.toml`
//! 3. `OPERANTCTL_*` environment variables
//! 4. command-line flags (applied by the binary)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use operant_remote::SshOptions;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::executor::ExecutorConfig;
use crate::parser::{ParsePolicy, TableFormat};
use crate::reconciler::ReconcilerConfig;

const ENV_PREFIX: &str = "OPERANTCTL_";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the panel/subject/behavior table.
    pub table_path: String,
    /// True when running on the gateway itself.
    pub is_magpi: bool,
    /// Host that fronts the panel nodes.
    pub gateway_host: String,
    pub node_prefix: String,
    /// Account the behaviors run as.
    pub service_account: String,
    pub search_term: String,
    /// Behavior script directory on the nodes.
    pub scripts_dir: String,
    pub table: TableFormat,
    pub ssh: SshConfig,
    pub reconcile: ReconcileConfig,
    pub actions: ActionsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub program: String,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
    /// Extra `-o` options.
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Panels inspected at the same time.
    pub concurrency: usize,
    /// Abort on the first malformed table line.
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Pause before confirming a kill or start.
    pub verify_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            table_path: "/home/bird/opdat/panel_subject_behavior".to_string(),
            is_magpi: true,
            gateway_host: "bird@magpi".to_string(),
            node_prefix: "magpi".to_string(),
            service_account: "bird".to_string(),
            search_term: "pyoperant/scripts/behave".to_string(),
            scripts_dir: "/home/bird/pyoperant/scripts".to_string(),
            table: TableFormat::default(),
            ssh: SshConfig::default(),
            reconcile: ReconcileConfig::default(),
            actions: ActionsConfig::default(),
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            connect_timeout_secs: 5,
            command_timeout_secs: 20,
            options: Vec::new(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            strict: false,
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            verify_delay_ms: 500,
        }
    }
}

/// Parse the boolean spellings accepted on the command line and in the
/// environment: `yes/true/t/y/1` and `no/false/f/n/0`, case-insensitive.
///
/// # Errors
///
/// Returns a message naming the rejected value.
pub fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "t" | "y" | "1" => Ok(true),
        "no" | "false" | "f" | "n" | "0" => Ok(false),
        other => Err(format!("'{other}' is not a boolean value")),
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// An explicit path must exist; the global file is optional.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, an environment
    /// override is invalid, or validation fails.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => match global_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };

        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    /// Read one TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and
    /// `Error::ConfigParse` if it is not valid.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(format!("Failed to read config file {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Parse TOML text; `origin` names the source in errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigParse` if the text is not valid.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigParse {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    /// Apply `OPERANTCTL_*` overrides. Unrelated variables are ignored.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` for an unparsable value.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            match name {
                "TABLE_PATH" => self.table_path = value,
                "IS_MAGPI" => {
                    self.is_magpi = parse_bool(&value)
                        .map_err(|e| Error::invalid_config(format!("{key}: {e}")))?;
                }
                "GATEWAY_HOST" => self.gateway_host = value,
                "NODE_PREFIX" => self.node_prefix = value,
                "SERVICE_ACCOUNT" => self.service_account = value,
                "SEARCH_TERM" => self.search_term = value,
                "SCRIPTS_DIR" => self.scripts_dir = value,
                "SSH_PROGRAM" => self.ssh.program = value,
                "SSH_CONNECT_TIMEOUT_SECS" => {
                    self.ssh.connect_timeout_secs = parse_env(&key, &value)?;
                }
                "SSH_COMMAND_TIMEOUT_SECS" => {
                    self.ssh.command_timeout_secs = parse_env(&key, &value)?;
                }
                "CONCURRENCY" => self.reconcile.concurrency = parse_env(&key, &value)?,
                "STRICT" => {
                    self.reconcile.strict = parse_bool(&value)
                        .map_err(|e| Error::invalid_config(format!("{key}: {e}")))?;
                }
                "VERIFY_DELAY_MS" => self.actions.verify_delay_ms = parse_env(&key, &value)?,
                _ => debug!(key = %key, "Ignoring unknown environment override"),
            }
        }
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("table_path", &self.table_path),
            ("gateway_host", &self.gateway_host),
            ("node_prefix", &self.node_prefix),
            ("service_account", &self.service_account),
            ("search_term", &self.search_term),
            ("scripts_dir", &self.scripts_dir),
            ("ssh.program", &self.ssh.program),
            ("table.subject_prefix", &self.table.subject_prefix),
            ("table.subject_placeholder", &self.table.subject_placeholder),
            ("table.session_placeholder", &self.table.session_placeholder),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(Error::invalid_config(format!("{name} must not be empty")));
        }
        if self.ssh.connect_timeout_secs == 0 || self.ssh.command_timeout_secs == 0 {
            return Err(Error::invalid_config("ssh timeouts must be greater than zero"));
        }
        if self.reconcile.concurrency == 0 {
            return Err(Error::invalid_config("reconcile.concurrency must be at least 1"));
        }
        Ok(())
    }

    #[must_use]
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            node_prefix: self.node_prefix.clone(),
            search_term: self.search_term.clone(),
            concurrency: self.reconcile.concurrency,
        }
    }

    #[must_use]
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            scripts_dir: self.scripts_dir.clone(),
            search_term: self.search_term.clone(),
            verify_delay: Duration::from_millis(self.actions.verify_delay_ms),
        }
    }

    #[must_use]
    pub fn ssh_options(&self) -> SshOptions {
        SshOptions {
            program: self.ssh.program.clone(),
            connect_timeout_secs: self.ssh.connect_timeout_secs,
            command_timeout: Duration::from_secs(self.ssh.command_timeout_secs),
            extra_options: self.ssh.options.clone(),
        }
    }

    #[must_use]
    pub fn parse_policy(&self) -> ParsePolicy {
        if self.reconcile.strict {
            ParsePolicy::Strict
        } else {
            ParsePolicy::Lenient
        }
    }
}

/// Path of the global config file, if the platform has a config directory.
#[must_use]
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "operantctl")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_config(format!("Invalid {key} value: {e}")))
}
