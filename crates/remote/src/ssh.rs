//! SSH-backed remote channel.
//!
//! Panel nodes are reached either directly (this machine is the gateway) or by
//! opening a nested session through the gateway host. Every call is bounded by
//! a deadline so an unreachable node becomes a per-host failure instead of a
//! hung run.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::channel::{CommandOutput, RemoteChannel};
use crate::error::{RemoteError, Result};
use crate::quote::shell_quote;

/// Exit status ssh uses for its own (connection-level) failures.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// How panel nodes are reached from this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// `ssh <node> <command>`.
    Direct,
    /// `ssh <gateway> ssh <node> '<command>'`.
    Gateway { gateway: String },
}

/// Options shared by every ssh invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshOptions {
    /// ssh binary to run.
    pub program: String,
    /// Passed as `-o ConnectTimeout=<n>`.
    pub connect_timeout_secs: u64,
    /// Deadline for the whole remote call.
    pub command_timeout: Duration,
    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`.
    pub extra_options: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            program: "ssh".to_string(),
            connect_timeout_secs: 5,
            command_timeout: Duration::from_secs(20),
            extra_options: Vec::new(),
        }
    }
}

impl SshOptions {
    fn option_args(&self) -> Vec<String> {
        let mut args = vec![
            "-T".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout_secs),
        ];
        for option in &self.extra_options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args
    }
}

/// Remote channel that shells out to `ssh`.
#[derive(Debug, Clone)]
pub struct SshChannel {
    topology: Topology,
    options: SshOptions,
}

impl SshChannel {
    /// Create a channel with an explicit topology.
    #[must_use]
    pub const fn new(topology: Topology, options: SshOptions) -> Self {
        Self { topology, options }
    }

    /// Nodes are reachable from this machine.
    #[must_use]
    pub const fn direct(options: SshOptions) -> Self {
        Self::new(Topology::Direct, options)
    }

    /// Nodes are only reachable through `gateway`.
    #[must_use]
    pub fn via_gateway(gateway: impl Into<String>, options: SshOptions) -> Self {
        Self::new(
            Topology::Gateway {
                gateway: gateway.into(),
            },
            options,
        )
    }

    /// The topology this channel was built with.
    #[must_use]
    pub const fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Argument vector passed to the ssh program for one call.
    #[must_use]
    pub fn build_args(&self, host: &str, command: &str) -> Vec<String> {
        let mut args = self.options.option_args();
        match &self.topology {
            Topology::Direct => {
                args.push(host.to_string());
                args.push(command.to_string());
            }
            Topology::Gateway { gateway } => {
                // The gateway's shell re-splits everything after the gateway
                // name, so the inner command travels as one quoted word.
                args.push(gateway.clone());
                args.push("ssh".to_string());
                args.extend(self.options.option_args().iter().map(|a| shell_quote(a)));
                args.push(shell_quote(host));
                args.push(shell_quote(command));
            }
        }
        args
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput> {
        let args = self.build_args(host, command);
        debug!(host, command, topology = ?self.topology, "ssh execute");

        let mut cmd = Command::new(&self.options.program);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.options.command_timeout, cmd.output())
            .await
            .map_err(|_| RemoteError::Timeout {
                host: host.to_string(),
                after_secs: self.options.command_timeout.as_secs(),
            })?
            .map_err(|e| RemoteError::Spawn {
                program: self.options.program.clone(),
                reason: e.to_string(),
            })?;

        let status = output.status.code();
        if status == Some(SSH_CONNECTION_FAILURE) {
            return Err(RemoteError::ConnectionFailed {
                host: host.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(CommandOutput::from_stdout(
            &String::from_utf8_lossy(&output.stdout),
            status,
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_direct_args() {
        let channel = SshChannel::direct(SshOptions::default());
        let args = channel.build_args("magpi01", "ps -ef | grep 'behave'");
        assert_eq!(
            args,
            vec![
                "-T",
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=5",
                "magpi01",
                "ps -ef | grep 'behave'",
            ]
        );
    }

    #[test]
    fn test_gateway_args_quote_inner_command() {
        let channel = SshChannel::via_gateway("bird@magpi", SshOptions::default());
        let args = channel.build_args("magpi07", "kill 4242");

        let gateway_pos = args.iter().position(|a| a == "bird@magpi").unwrap();
        assert_eq!(args[gateway_pos + 1], "ssh");
        assert_eq!(args[args.len() - 2], "'magpi07'");
        assert_eq!(args[args.len() - 1], "'kill 4242'");
    }

    #[test]
    fn test_extra_options_are_passed() {
        let options = SshOptions {
            extra_options: vec!["StrictHostKeyChecking=accept-new".to_string()],
            ..SshOptions::default()
        };
        let args = SshChannel::direct(options).build_args("magpi02", "true");
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let options = SshOptions {
            program: "/nonexistent/ssh-binary".to_string(),
            ..SshOptions::default()
        };
        let result = SshChannel::direct(options).execute("magpi01", "true").await;
        assert!(matches!(result, Err(RemoteError::Spawn { .. })));
    }
}
