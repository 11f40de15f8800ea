//! Subprocess execution for build tools
//!
//! Stages describe the programs they need as [`CommandLine`] values and run
//! them through [`run_streamed`], which forwards stdout and stderr line by
//! line. Spawn and exit failures map onto [`ProcessError`] variants so the
//! pipeline can distinguish a missing binary from a failing build.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

/// Which output stream a process line arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Errors from spawning or waiting on a build tool
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("'{program}' exited with status {code}")]
    Exit { program: String, code: i32 },

    #[error("'{program}' was terminated by a signal")]
    Terminated { program: String },
}

/// A program invocation assembled by a stage
///
/// Holds the argv, extra environment, and working directory without
/// spawning anything, so command construction stays testable without
/// the underlying tools installed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
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

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn argv(&self) -> &[String] {
        &self.args
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    fn to_tokio(&self) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }
        command
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Runs a command to completion, forwarding each output line
///
/// The callback receives every line from stdout and stderr as it is
/// produced. A non-zero exit status maps to [`ProcessError::Exit`] and a
/// signal death to [`ProcessError::Terminated`].
pub async fn run_streamed<F>(cmd: &CommandLine, on_line: F) -> Result<(), ProcessError>
where
    F: Fn(OutputStream, &str) + Send + Sync,
{
    debug!(command = %cmd, "Spawning process");

    let mut child = cmd
        .to_tokio()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_task = async {
        if let Some(pipe) = stdout {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                on_line(OutputStream::Stdout, &line);
            }
        }
    };

    let stderr_task = async {
        if let Some(pipe) = stderr {
            let mut lines = BufReader::new(pipe).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                on_line(OutputStream::Stderr, &line);
            }
        }
    };

    let (status, _, _) = tokio::join!(child.wait(), stdout_task, stderr_task);

    let status = status.map_err(|source| ProcessError::Wait {
        program: cmd.program.clone(),
        source,
    })?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(ProcessError::Exit {
            program: cmd.program.clone(),
            code,
        }),
        None => Err(ProcessError::Terminated {
            program: cmd.program.clone(),
        }),
    }
}

/// Runs a command attached to the parent's stdio, returning its exit code
///
/// Used to launch the staged application itself, where output belongs on
/// the user's terminal rather than in the build log.
pub async fn run_interactive(cmd: &CommandLine) -> Result<i32, ProcessError> {
    debug!(command = %cmd, "Spawning interactive process");

    let mut child = cmd
        .to_tokio()
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

    let status = child.wait().await.map_err(|source| ProcessError::Wait {
        program: cmd.program.clone(),
        source,
    })?;

    match status.code() {
        Some(code) => Ok(code),
        None => Err(ProcessError::Terminated {
            program: cmd.program.clone(),
        }),
    }
}

/// Runs a command silently and reports whether it succeeded
///
/// Used for existence checks where a non-zero exit is an answer, not an
/// error. Only spawn failures surface as errors.
pub async fn probe(cmd: &CommandLine) -> Result<bool, ProcessError> {
    debug!(command = %cmd, "Probing");

    let mut command = cmd.to_tokio();
    command.stdin(Stdio::null());

    let output = command
        .output()
        .await
        .map_err(|source| ProcessError::Spawn {
            program: cmd.program.clone(),
            source,
        })?;

    Ok(output.status.success())
}
