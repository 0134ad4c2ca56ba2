//! Runs an external program in each project's directory.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::argv::tokenize;
use super::ExecutionBackend;
use crate::backend::{keys, BackendConfig, OutputSink};
use crate::error::{ConfigError, ExecutionError};

/// Executes a fixed command line, parsed once at construction.
///
/// The working directory is set on each spawned process, so one runner can
/// serve several workers at the same time.
#[derive(Debug, Clone)]
pub struct BinaryRunner {
    program: PathBuf,
    args: Vec<String>,
    stdout: OutputSink,
    stderr: OutputSink,
    timeout: Option<Duration>,
}

impl BinaryRunner {
    /// Parses `command` and resolves its program.
    pub fn new(command: &str) -> Result<Self, ConfigError> {
        let mut argv = tokenize(command).into_iter();
        let program = match argv.next() {
            Some(program) if !program.is_empty() => program,
            _ => return Err(ConfigError::EmptyCommand),
        };

        Ok(Self {
            program: resolve_program(&program)?,
            args: argv.collect(),
            stdout: OutputSink::default(),
            stderr: OutputSink::default(),
            timeout: None,
        })
    }

    /// Builds a runner from the `command` and `timeout_secs` keys and the
    /// configured output sinks.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ConfigError> {
        let command = config.get(keys::COMMAND).ok_or(ConfigError::EmptyCommand)?;
        let timeout = match config.parse::<u64>(keys::TIMEOUT_SECS)? {
            Some(0) => {
                return Err(ConfigError::InvalidField {
                    field: keys::TIMEOUT_SECS,
                    value: "0".to_string(),
                    reason: "must be at least 1".to_string(),
                })
            }
            other => other.map(Duration::from_secs),
        };

        let mut runner = Self::new(command)?
            .with_stdout(config.stdout.clone())
            .with_stderr(config.stderr.clone());
        runner.timeout = timeout;
        Ok(runner)
    }

    pub fn with_stdout(mut self, sink: OutputSink) -> Self {
        self.stdout = sink;
        self
    }

    pub fn with_stderr(mut self, sink: OutputSink) -> Self {
        self.stderr = sink;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn program_name(&self) -> String {
        self.program.display().to_string()
    }
}

#[async_trait]
impl ExecutionBackend for BinaryRunner {
    async fn run(&self, cancel: &CancellationToken, work_dir: &Path) -> Result<(), ExecutionError> {
        if work_dir.as_os_str().is_empty() {
            return Err(ExecutionError::MissingWorkDir);
        }
        // Last point where cancellation is honored; a started child runs to completion.
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }

        debug!(program = %self.program.display(), work_dir = %work_dir.display(), "Running command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(self.stdout.to_stdio()?)
            .stderr(self.stderr.to_stdio()?)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionError::Launch {
                program: self.program_name(),
                source,
            })?;

        let status = match self.timeout {
            None => child.wait().await,
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!(program = %self.program.display(), error = %e, "Failed to kill timed out command");
                    }
                    return Err(ExecutionError::Timeout {
                        program: self.program_name(),
                        seconds: limit.as_secs(),
                    });
                }
            },
        }
        .map_err(|source| ExecutionError::Launch {
            program: self.program_name(),
            source,
        })?;

        if !status.success() {
            return Err(ExecutionError::NonZeroExit {
                program: self.program_name(),
                code: status.code(),
            });
        }

        info!(work_dir = %work_dir.display(), "Command succeeded");
        Ok(())
    }
}

/// Resolves `program` to an executable path.
///
/// Names containing a path separator are made absolute against the current
/// directory, since each run changes into the project directory. Bare names
/// are looked up on `PATH`.
fn resolve_program(program: &str) -> Result<PathBuf, ConfigError> {
    let not_found = |reason: &str| ConfigError::CommandNotFound {
        command: program.to_string(),
        reason: reason.to_string(),
    };

    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        let path = std::fs::canonicalize(program).map_err(|e| not_found(&e.to_string()))?;
        return if is_executable(&path) {
            Ok(path)
        } else {
            Err(not_found("not an executable file"))
        };
    }

    let path_var = env::var_os("PATH").ok_or_else(|| not_found("PATH is not set"))?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| not_found("executable file not found in PATH"))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
