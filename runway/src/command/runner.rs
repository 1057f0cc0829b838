//! Command runner implementations.

use super::{Command, CommandOutput};
use crate::errors::CommandError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::path::Path;
use tracing::debug;

/// Seam for invoking external processes.
///
/// The executor is generic over this trait so scenario tests can script
/// exit codes and captured output without spawning real processes.
#[async_trait]
pub trait CommandRunner: Send + Sync + Debug {
    /// Invokes the command, blocking until the process exits.
    ///
    /// `default_workdir` is the pipeline's working directory; a per-command
    /// override on the [`Command`] itself takes precedence.
    async fn run(
        &self,
        command: &Command,
        default_workdir: Option<&Path>,
    ) -> Result<CommandOutput, CommandError>;
}

/// Runner that spawns real processes via tokio.
///
/// Stdout and stderr are both captured; the returned output concatenates
/// them (stdout first) since collaborator tools interleave diagnostics
/// across both streams.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        command: &Command,
        default_workdir: Option<&Path>,
    ) -> Result<CommandOutput, CommandError> {
        let mut proc = tokio::process::Command::new(&command.program);
        proc.args(&command.args);
        proc.envs(&command.env);
        proc.kill_on_drop(true);

        if let Some(dir) = command.workdir.as_deref().or(default_workdir) {
            proc.current_dir(dir);
        }

        debug!(command = %command.display_line(), "Spawning process");

        let output = proc.output().await.map_err(|source| CommandError::Spawn {
            program: command.program.clone(),
            source,
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            exit_code: output.status.code(),
            output: combined,
        })
    }
}

/// One scripted response for a [`ScriptedRunner`].
#[derive(Debug, Clone)]
struct ScriptedFailure {
    /// Substring matched against the command display line.
    needle: String,
    /// Exit code to report.
    exit_code: i32,
    /// Captured output to report.
    output: String,
}

/// A runner that scripts outcomes instead of spawning processes.
///
/// Commands succeed with empty output unless a failure rule matches their
/// display line. Every invocation is recorded for assertions.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    failures: Mutex<Vec<ScriptedFailure>>,
    outputs: Mutex<Vec<(String, String)>>,
    invocations: Mutex<Vec<String>>,
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &Command,
        _default_workdir: Option<&Path>,
    ) -> Result<CommandOutput, CommandError> {
        let line = command.display_line();
        self.invocations.lock().push(line.clone());

        let failure = self
            .failures
            .lock()
            .iter()
            .find(|f| line.contains(&f.needle))
            .cloned();
        if let Some(failure) = failure {
            return Ok(CommandOutput::with_code(failure.exit_code, failure.output));
        }

        let canned = self
            .outputs
            .lock()
            .iter()
            .find(|(needle, _)| line.contains(needle))
            .map(|(_, out)| out.clone());

        Ok(CommandOutput::with_code(0, canned.unwrap_or_default()))
    }
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds silently.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails any command whose display line contains `needle`.
    #[must_use]
    pub fn fail_on(self, needle: impl Into<String>, exit_code: i32) -> Self {
        self.fail_on_with_output(needle, exit_code, "")
    }

    /// Fails a matching command and scripts its captured output.
    #[must_use]
    pub fn fail_on_with_output(
        self,
        needle: impl Into<String>,
        exit_code: i32,
        output: impl Into<String>,
    ) -> Self {
        self.failures.lock().push(ScriptedFailure {
            needle: needle.into(),
            exit_code,
            output: output.into(),
        });
        self
    }

    /// Scripts captured output for a matching, successful command.
    #[must_use]
    pub fn output_on(self, needle: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.lock().push((needle.into(), output.into()));
        self
    }

    /// Returns every command line invoked so far, in order.
    #[must_use]
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }

    /// Returns true if some invocation contained `needle`.
    #[must_use]
    pub fn invoked(&self, needle: &str) -> bool {
        self.invocations.lock().iter().any(|line| line.contains(needle))
    }
}
