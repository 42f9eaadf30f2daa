use async_trait::async_trait;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, instrument};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Could not find executable \"{program}\"")]
    NotFound { program: String },

    #[error("`{command}` exited with status {status:?}: {stderr}")]
    Failed {
        command: String,
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },

    #[error("`{command}` did not finish within {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external programs and hands back their trimmed stdout.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String, CommandError>;
}

/// Spawns real child processes.
pub struct SystemRunner {
    quiet: bool,
    timeout: Duration,
}

impl SystemRunner {
    pub fn new(quiet: bool, timeout: Duration) -> Self {
        Self { quiet, timeout }
    }
}

#[async_trait]
impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(program = %program))]
    async fn run(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<String, CommandError> {
        let command_line = render(program, args);
        if !self.quiet {
            eprintln!("{}", format!("+ {command_line}").dimmed());
        }

        let executable = resolve_executable(program)?;
        debug!(executable = %executable.display(), "resolved executable");

        let mut cmd = tokio::process::Command::new(&executable);
        cmd.args(args).stdin(Stdio::null()).kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| CommandError::Timeout {
                command: command_line.clone(),
                timeout: self.timeout,
            })?
            .map_err(|source| CommandError::Spawn {
                command: command_line.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(command = %command_line, %stdout, %stderr, "command failed");
            return Err(CommandError::Failed {
                command: command_line,
                status: output.status.code(),
                stdout,
                stderr,
            });
        }

        debug!(stdout_bytes = stdout.len(), "command succeeded");
        Ok(stdout)
    }
}

/// Find the program on PATH up front instead of leaving the lookup to the OS.
/// Anything containing a path separator is taken as-is.
fn resolve_executable(program: &str) -> Result<PathBuf, CommandError> {
    if program.contains(std::path::MAIN_SEPARATOR) || program.contains('/') {
        return Ok(PathBuf::from(program));
    }
    which::which(program).map_err(|_| CommandError::NotFound {
        program: program.to_string(),
    })
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}
