//! One live engine process driven over its stdin/stdout pipes.
//!
//! A session moves through `Running -> AwaitingResponse -> Running -> ...
//! -> Terminating -> Closed`. `(exit)` is the last thing ever written and is
//! written exactly once, whether the session is closed explicitly, on an
//! error path, or from `Drop` while unwinding.

use crate::error::{EngineError, EngineResult};
use crate::request::Request;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, trace, warn};

/// How to launch the engine. `--platform <name>` is always appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl EngineConfig {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("racket"),
            args: vec!["infra/server.rkt".to_string()],
        }
    }
}

/// Where a session is in its lifecycle. There is no unstarted state: a
/// session only exists once [`EngineSession::start`] has spawned the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    AwaitingResponse(&'static str),
    Terminating,
    Closed,
}

pub struct EngineSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
    state: SessionState,
    last_command: &'static str,
    platform: String,
}

impl EngineSession {
    pub fn start(config: &EngineConfig, platform: &str) -> EngineResult<Self> {
        let spawn_error = |source| EngineError::Spawn {
            program: config.program.display().to_string(),
            source,
        };

        let mut child = Command::new(&config.program)
            .args(&config.args)
            .arg("--platform")
            .arg(platform)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(spawn_error)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(spawn_error(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "engine pipes unavailable",
                )));
            }
        };

        debug!(platform, pid = child.id(), "engine session started");
        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout: BufReader::new(stdout),
            state: SessionState::Running,
            last_command: "start",
            platform: platform.to_string(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn platform(&self) -> &str {
        &self.platform
    }

    /// Writes one command line. `Request::Exit` is routed to
    /// [`EngineSession::send_exit`].
    pub fn send(&mut self, request: &Request<'_>) -> EngineResult<()> {
        if matches!(request, Request::Exit) {
            return self.send_exit();
        }
        let command = request.name();
        self.write_line(command, &request.to_string())?;
        self.last_command = command;
        self.state = SessionState::AwaitingResponse(command);
        Ok(())
    }

    fn write_line(&mut self, command: &'static str, line: &str) -> EngineResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or(EngineError::SessionClosed(command))?;
        trace!(command, line, "engine <-");
        writeln!(stdin, "{line}")
            .and_then(|_| stdin.flush())
            .map_err(|source| EngineError::Io { command, source })
    }

    /// Reads exactly one response line, without its terminator.
    pub fn read_line(&mut self) -> EngineResult<String> {
        let command = self.last_command;
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|source| EngineError::Io { command, source })?;
        if read == 0 {
            return Err(EngineError::protocol(
                command,
                "engine closed its output before responding",
            ));
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        trace!(command, line = %line, "engine ->");
        if self.state != SessionState::Terminating {
            self.state = SessionState::Running;
        }
        Ok(line)
    }

    /// Reads everything the engine writes until it closes its output.
    /// Only meaningful once `exit` has been sent.
    pub fn read_to_end(&mut self) -> EngineResult<String> {
        let command = self.last_command;
        let mut output = String::new();
        self.stdout
            .read_to_string(&mut output)
            .map_err(|source| EngineError::Io { command, source })?;
        Ok(output)
    }

    /// Sends `(exit)` and closes the engine's input. Idempotent: the command
    /// is only ever written once per session.
    pub fn send_exit(&mut self) -> EngineResult<()> {
        if self.stdin.is_none() {
            return Ok(());
        }
        let result = self.write_line("exit", &Request::Exit.to_string());
        self.stdin = None;
        self.state = SessionState::Terminating;
        result
    }

    /// Sends `exit` if needed, drains remaining output, and reaps the process.
    pub fn close(mut self) -> EngineResult<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> EngineResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        let exit = self.send_exit();
        let _ = io::copy(&mut self.stdout, &mut io::sink());
        let status = self.child.wait();
        self.state = SessionState::Closed;

        match status {
            Ok(status) if !status.success() => {
                warn!(platform = %self.platform, %status, "engine exited unsuccessfully");
            }
            Ok(_) => debug!(platform = %self.platform, "engine session closed"),
            Err(error) => {
                warn!(platform = %self.platform, error = %error, "failed to reap engine process")
            }
        }
        exit
    }
}

impl Drop for EngineSession {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            warn!(platform = %self.platform, error = %error, "engine session shut down uncleanly");
        }
    }
}
