//! External command descriptions and the process-invocation seam.
//!
//! Every unit of work the executor performs is an external process. The
//! [`Command`] type describes one invocation, including its failure-tolerance
//! policy; the [`CommandRunner`] trait is the seam that lets tests script
//! outcomes without spawning anything.

mod runner;

pub use runner::{CommandRunner, ProcessRunner, ScriptedRunner};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A single external-process invocation.
///
/// `tolerate_failure` is the explicit form of the shell `|| true` idiom: a
/// non-zero exit is logged and recorded but does not abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// The program to invoke.
    pub program: String,
    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,
    /// Whether a non-zero exit is tolerated (logged, not fatal).
    #[serde(default)]
    pub tolerate_failure: bool,
    /// Per-command working-directory override. Falls back to the pipeline's
    /// working directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    /// Extra environment variables for the invocation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl Command {
    /// Creates a new command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            tolerate_failure: false,
            workdir: None,
            env: BTreeMap::new(),
        }
    }

    /// Appends a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Marks a non-zero exit as tolerated.
    #[must_use]
    pub fn tolerated(mut self) -> Self {
        self.tolerate_failure = true;
        self
    }

    /// Overrides the working directory for this command only.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Sets an environment variable for the invocation.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Renders the command line for logs and records.
    #[must_use]
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// The captured outcome of one command invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    /// The exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr.
    pub output: String,
}

impl CommandOutput {
    /// Creates an output for a successful, silent command.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            exit_code: Some(0),
            output: String::new(),
        }
    }

    /// Creates an output with the given exit code and captured text.
    #[must_use]
    pub fn with_code(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            output: output.into(),
        }
    }

    /// Returns true if the process exited zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}
