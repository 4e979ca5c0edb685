//! Runs `SshChannel` against a stand-in program to check what reaches the
//! process boundary.

#![cfg(unix)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use operant_remote::{RemoteChannel, RemoteError, SshChannel, SshOptions};

fn options(program: &str) -> SshOptions {
    SshOptions {
        program: program.to_string(),
        command_timeout: Duration::from_secs(5),
        ..SshOptions::default()
    }
}

#[tokio::test]
async fn test_direct_invocation_reaches_program() {
    // GIVEN: `echo` standing in for ssh
    let channel = SshChannel::direct(options("echo"));

    // WHEN
    let output = channel
        .execute("magpi01", "ps -ef | grep 'pyoperant/scripts/behave'")
        .await
        .unwrap();

    // THEN: the command arrives as a single trailing argument
    assert!(output.is_success());
    assert_eq!(
        output.stdout_lines,
        vec![
            "-T -o BatchMode=yes -o ConnectTimeout=5 magpi01 ps -ef | grep 'pyoperant/scripts/behave'"
                .to_string()
        ]
    );
}

#[tokio::test]
async fn test_gateway_invocation_quotes_inner_hop() {
    let channel = SshChannel::via_gateway("bird@magpi", options("echo"));

    let output = channel.execute("magpi02", "kill 1234").await.unwrap();

    let line = &output.stdout_lines[0];
    assert!(line.starts_with("-T -o BatchMode=yes -o ConnectTimeout=5 bird@magpi ssh '-T'"));
    assert!(line.ends_with("'magpi02' 'kill 1234'"));
}

/// Write an executable shell script standing in for ssh.
fn stand_in(dir: &TempDir, name: &str, body: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.display().to_string()
}

#[tokio::test]
async fn test_slow_call_times_out() {
    // GIVEN: a node that never answers
    let dir = TempDir::new().unwrap();
    let program = stand_in(&dir, "hang", "exec sleep 30");
    let channel = SshChannel::direct(SshOptions {
        command_timeout: Duration::from_secs(1),
        ..options(&program)
    });

    // WHEN
    let started = Instant::now();
    let result = channel.execute("magpi05", "ps -ef").await;

    // THEN: the deadline turns into a per-host error
    assert!(matches!(
        result,
        Err(RemoteError::Timeout { ref host, after_secs: 1 }) if host == "magpi05"
    ));
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_exit_255_is_connection_failure() {
    let dir = TempDir::new().unwrap();
    let program = stand_in(
        &dir,
        "refused",
        "echo 'ssh: connect to host magpi06 port 22: No route to host' >&2\nexit 255",
    );
    let channel = SshChannel::direct(options(&program));

    let result = channel.execute("magpi06", "ps -ef").await;

    match result {
        Err(RemoteError::ConnectionFailed { host, stderr }) => {
            assert_eq!(host, "magpi06");
            assert!(stderr.contains("No route to host"));
        }
        other => panic!("expected ConnectionFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_other_nonzero_status_is_returned() {
    // grep exits 1 when nothing matches; that is an answer, not a failure.
    let dir = TempDir::new().unwrap();
    let program = stand_in(&dir, "nomatch", "exit 1");
    let channel = SshChannel::direct(options(&program));

    let output = channel.execute("magpi07", "ps -ef | grep x").await.unwrap();

    assert_eq!(output.exit_status, Some(1));
    assert!(output.stdout_lines.is_empty());
}
