//! Run the cloud CLIs as child processes.

use std::process::Stdio;

use async_trait::async_trait;
use error_stack::{Report, ResultExt};
use thiserror::Error;
use tracing::{event, Level};

#[derive(Error, Debug)]
#[error("Failed to run {0}")]
pub struct RunnerError(pub String);

/// The captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, or -1 if the process was killed by a signal.
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Runs external commands. A non-zero exit is a normal [CommandOutput]; only a failure to run
/// the command at all is an error.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, Report<RunnerError>>;
}

/// Runs commands as child processes of this one.
#[derive(Debug, Default, Clone)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
    ) -> Result<CommandOutput, Report<RunnerError>> {
        event!(Level::DEBUG, %program, ?args, "running command");

        let output = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .change_context_lazy(|| RunnerError(program.to_string()))
            .attach_printable_lazy(|| format!("Arguments: {args:?}"))?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
