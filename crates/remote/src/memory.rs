//! In-memory fleet simulator.
//!
//! `InMemoryChannel` answers the handful of shell commands the reconciler
//! issues (`ps -ef | grep`, `kill`, `nohup ... &`, `cat`) against a simulated
//! set of hosts, so reconciliation and action execution can be exercised
//! end to end without SSH. Hosts can be marked unreachable, made to ignore
//! kills, or made to start zero or several copies of a behavior.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::channel::{CommandOutput, RemoteChannel};
use crate::error::{RemoteError, Result};

const FIRST_PID: u32 = 1000;
const DEFAULT_OWNER: &str = "bird";
const INTERPRETER: &str = "python";

/// A process on a simulated host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimProcess {
    pub owner: String,
    pub pid: u32,
    /// Full command line as `ps` would print it.
    pub command: String,
}

impl SimProcess {
    /// Render in `ps -ef` layout: UID PID PPID C STIME TTY TIME CMD.
    #[must_use]
    pub fn listing_line(&self) -> String {
        format!(
            "{:<8} {:>5}     1  0 10:00 ?        00:00:01 {}",
            self.owner, self.pid, self.command
        )
    }
}

#[derive(Debug)]
struct HostState {
    processes: Vec<SimProcess>,
    reachable: bool,
    kill_resistant: bool,
    start_copies: usize,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            processes: Vec::new(),
            reachable: true,
            kill_resistant: false,
            start_copies: 1,
        }
    }
}

#[derive(Debug)]
struct FleetState {
    hosts: BTreeMap<String, HostState>,
    files: HashMap<String, String>,
    log: Vec<(String, String)>,
    next_pid: u32,
}

impl FleetState {
    fn allocate_pid(&mut self) -> u32 {
        let pid = self.next_pid;
        self.next_pid = self.next_pid.saturating_add(1);
        pid
    }

    fn spawn(&mut self, host: &str, owner: &str, command: &str) -> u32 {
        let pid = self.allocate_pid();
        self.hosts
            .entry(host.to_string())
            .or_default()
            .processes
            .push(SimProcess {
                owner: owner.to_string(),
                pid,
                command: command.to_string(),
            });
        pid
    }
}

/// Simulated fleet implementing [`RemoteChannel`].
#[derive(Debug)]
pub struct InMemoryChannel {
    state: Mutex<FleetState>,
}

impl Default for InMemoryChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChannel {
    /// Create an empty fleet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FleetState {
                hosts: BTreeMap::new(),
                files: HashMap::new(),
                log: Vec::new(),
                next_pid: FIRST_PID,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FleetState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a reachable host with no processes.
    #[must_use]
    pub fn with_host(self, host: &str) -> Self {
        self.lock().hosts.entry(host.to_string()).or_default();
        self
    }

    /// Register a file readable through `cat`.
    #[must_use]
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.lock()
            .files
            .insert(path.to_string(), content.to_string());
        self
    }

    /// Start a process on `host` (registering the host if needed). Returns its PID.
    pub fn spawn(&self, host: &str, owner: &str, command: &str) -> u32 {
        self.lock().spawn(host, owner, command)
    }

    /// Mark a host up or down. Down hosts fail every call.
    pub fn set_reachable(&self, host: &str, reachable: bool) {
        self.lock().hosts.entry(host.to_string()).or_default().reachable = reachable;
    }

    /// Make `kill` succeed without removing the process.
    pub fn set_kill_resistant(&self, host: &str, resistant: bool) {
        self.lock()
            .hosts
            .entry(host.to_string())
            .or_default()
            .kill_resistant = resistant;
    }

    /// Number of processes a `nohup` start produces on `host` (default 1).
    pub fn set_start_copies(&self, host: &str, copies: usize) {
        self.lock()
            .hosts
            .entry(host.to_string())
            .or_default()
            .start_copies = copies;
    }

    /// Snapshot of the processes on `host`.
    #[must_use]
    pub fn processes(&self, host: &str) -> Vec<SimProcess> {
        self.lock()
            .hosts
            .get(host)
            .map(|h| h.processes.clone())
            .unwrap_or_default()
    }

    /// Every `(host, command)` pair executed so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<(String, String)> {
        self.lock().log.clone()
    }

    fn run(state: &mut FleetState, host: &str, command: &str) -> Result<CommandOutput> {
        let reachable = state.hosts.get(host).map(|h| h.reachable);
        match reachable {
            None => return Err(RemoteError::unreachable(host, "unknown host")),
            Some(false) => return Err(RemoteError::unreachable(host, "host is down")),
            Some(true) => {}
        }

        let command = command.trim();
        if let Some(rest) = command.strip_prefix("ps -ef") {
            return Ok(Self::list(state, host, rest));
        }
        if let Some(pid) = command.strip_prefix("kill ") {
            return Ok(Self::kill(state, host, pid.trim()));
        }
        if let Some(rest) = command.strip_prefix("nohup ") {
            return Ok(Self::start(state, host, rest));
        }
        if let Some(path) = command.strip_prefix("cat ") {
            let path = unquote(path.trim());
            return Ok(state.files.get(&path).map_or_else(
                || CommandOutput::from_stdout("", Some(1)),
                |content| CommandOutput::from_stdout(content, Some(0)),
            ));
        }
        Ok(CommandOutput::from_stdout("", Some(127)))
    }

    fn list(state: &mut FleetState, host: &str, rest: &str) -> CommandOutput {
        let term = rest
            .trim()
            .strip_prefix('|')
            .map(str::trim)
            .and_then(|r| r.strip_prefix("grep "))
            .map(|t| unquote(t.trim()));

        let mut lines: Vec<String> = state
            .hosts
            .get(host)
            .map(|h| h.processes.iter().map(SimProcess::listing_line).collect())
            .unwrap_or_default();

        match term {
            Some(term) => {
                lines.retain(|line| line.contains(&term));
                // grep shows up in its own listing.
                let artifact = SimProcess {
                    owner: DEFAULT_OWNER.to_string(),
                    pid: state.allocate_pid(),
                    command: format!("grep {term}"),
                };
                lines.push(artifact.listing_line());
                CommandOutput {
                    stdout_lines: lines,
                    exit_status: Some(0),
                }
            }
            None => CommandOutput {
                stdout_lines: lines,
                exit_status: Some(0),
            },
        }
    }

    fn kill(state: &mut FleetState, host: &str, pid: &str) -> CommandOutput {
        let Ok(pid) = pid.parse::<u32>() else {
            return CommandOutput::from_stdout("", Some(1));
        };
        let Some(host_state) = state.hosts.get_mut(host) else {
            return CommandOutput::from_stdout("", Some(1));
        };
        let exists = host_state.processes.iter().any(|p| p.pid == pid);
        if !exists {
            return CommandOutput::from_stdout("", Some(1));
        }
        if !host_state.kill_resistant {
            host_state.processes.retain(|p| p.pid != pid);
        }
        CommandOutput::from_stdout("", Some(0))
    }

    fn start(state: &mut FleetState, host: &str, rest: &str) -> CommandOutput {
        let invocation = rest
            .trim()
            .trim_end_matches('&')
            .trim()
            .trim_end_matches("2>&1")
            .trim()
            .trim_end_matches("/dev/null")
            .trim()
            .trim_end_matches('>')
            .trim();
        let copies = state.hosts.get(host).map_or(1, |h| h.start_copies);
        let command = format!("{INTERPRETER} {invocation}");
        for _ in 0..copies {
            state.spawn(host, DEFAULT_OWNER, &command);
        }
        CommandOutput::from_stdout("", Some(0))
    }
}

/// Reverse of `shell_quote` for a single quoted word.
fn unquote(word: &str) -> String {
    word.strip_prefix('\'')
        .and_then(|w| w.strip_suffix('\''))
        .map_or_else(|| word.to_string(), |inner| inner.replace("'\\''", "'"))
}

#[async_trait]
impl RemoteChannel for InMemoryChannel {
    async fn execute(&self, host: &str, command: &str) -> Result<CommandOutput> {
        let mut state = self.lock();
        state.log.push((host.to_string(), command.to_string()));
        Self::run(&mut state, host, command)
    }
}
