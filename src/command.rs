// NA Manager - External Command Execution
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! External process execution with captured output and a bounded wait.
//!
//! Every OS-facing operation goes through [`CommandRunner`]. The system
//! runner kills and reaps a child that outlives its timeout, so a hung
//! `netsh` or `powershell` never leaks a process or blocks the caller.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::{Error, Result};
use crate::storage::mutex_lock;

/// Default bounded wait for external processes.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Suppresses the console window of spawned processes on Windows.
#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// `netsh` with the given arguments.
    pub fn netsh<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("netsh").args(args)
    }

    /// A quiet, non-interactive PowerShell running one command string.
    pub fn powershell(script: impl Into<String>) -> Self {
        Self::new("powershell.exe")
            .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-Command"])
            .arg(script)
    }

    /// Short form for logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Exit 0 and nothing written to stderr.
    pub fn clean_success(&self) -> bool {
        self.success() && self.stderr.trim().is_empty()
    }

    /// Build an output for fakes.
    pub fn with_exit(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(code),
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external programs.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion or until its timeout elapses.
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput>;

    /// Whether an executable exists at `path`.
    fn program_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// Runner that spawns real processes.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
        debug!("Running: {}", spec.display());

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::command_failed(&spec.program, e.to_string()))?;

        // One deadline covers the wait and the drain. A background grandchild
        // can hold the pipes open long after the child itself exits.
        let deadline = tokio::time::Instant::now() + spec.timeout;
        let (mut stdout_task, stdout_buf) = drain(child.stdout.take());
        let (mut stderr_task, stderr_buf) = drain(child.stderr.take());

        let status = match tokio::time::timeout_at(deadline, child.wait()).await {
            Ok(status) => status.map_err(|e| Error::command_failed(&spec.program, e.to_string()))?,
            Err(_) => {
                warn!("{} exceeded {:?}, killing", spec.program, spec.timeout);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", spec.program, e);
                }
                // kill() waits for the child, so it is reaped here
                stdout_task.abort();
                stderr_task.abort();
                return Err(Error::CommandTimeout {
                    program: spec.program,
                    timeout: spec.timeout,
                });
            }
        };

        let drained = tokio::time::timeout_at(deadline, async {
            let _ = (&mut stdout_task).await;
            let _ = (&mut stderr_task).await;
        })
        .await;
        if drained.is_err() {
            // Only the pipes are still open; keep what was read so far
            warn!("{} exited but its output pipes stayed open, not waiting further", spec.program);
            stdout_task.abort();
            stderr_task.abort();
        }

        let output = CommandOutput {
            exit_code: status.code(),
            stdout: decode_output(&take_buffer(&stdout_buf)),
            stderr: decode_output(&take_buffer(&stderr_buf)),
        };
        debug!("{} exited with {:?}", spec.program, output.exit_code);
        Ok(output)
    }
}

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Read a pipe to its end in the background, appending into a shared buffer
/// so a partial read survives the task being aborted.
fn drain<R>(pipe: Option<R>) -> (JoinHandle<()>, SharedBuffer)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buffer: SharedBuffer = Arc::new(Mutex::new(Vec::new()));
    let sink = buffer.clone();
    let task = tokio::spawn(async move {
        let Some(mut pipe) = pipe else { return };
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => mutex_lock(&sink, "output buffer").extend_from_slice(&chunk[..n]),
            }
        }
    });
    (task, buffer)
}

fn take_buffer(buffer: &SharedBuffer) -> Vec<u8> {
    std::mem::take(&mut *mutex_lock(buffer, "output buffer"))
}

/// Decode process output, dropping a UTF-8 BOM if present.
fn decode_output(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.trim_start_matches('\u{FEFF}').to_string()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted runner used by unit tests across the crate.

    use super::*;
    use std::collections::VecDeque;

    /// Replies to commands from a queue of (matcher, response) rules.
    #[derive(Default)]
    pub struct ScriptedRunner {
        rules: Mutex<Vec<(String, VecDeque<Result<CommandOutput>>)>>,
        calls: Mutex<Vec<CommandSpec>>,
        existing: Mutex<Vec<std::path::PathBuf>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Reply with `response` to the next command whose display text contains `needle`.
        pub fn on(&self, needle: &str, response: Result<CommandOutput>) -> &Self {
            let mut rules = self.rules.lock().expect("rules lock");
            if let Some((_, queue)) = rules.iter_mut().find(|(n, _)| n == needle) {
                queue.push_back(response);
            } else {
                rules.push((needle.to_string(), VecDeque::from([response])));
            }
            self
        }

        pub fn with_program(&self, path: impl Into<std::path::PathBuf>) -> &Self {
            self.existing.lock().expect("existing lock").push(path.into());
            self
        }

        pub fn calls(&self) -> Vec<CommandSpec> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, spec: CommandSpec) -> Result<CommandOutput> {
            self.calls.lock().expect("calls lock").push(spec.clone());
            let display = spec.display();
            let mut rules = self.rules.lock().expect("rules lock");
            for (needle, queue) in rules.iter_mut() {
                if display.contains(needle.as_str()) {
                    if let Some(response) = queue.pop_front() {
                        return response;
                    }
                }
            }
            Err(Error::command_failed(spec.program, "no scripted response"))
        }

        fn program_exists(&self, path: &Path) -> bool {
            self.existing.lock().expect("existing lock").iter().any(|p| p == path)
        }
    }
}
