//! Per-run result and captured command logs.

use super::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Captured record of a single command execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    /// The stage the command belonged to (or a post phase name).
    pub stage: String,
    /// The command line as invoked.
    pub command: String,
    /// The exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Combined stdout and stderr, in arrival order.
    pub output: String,
    /// Whether a non-zero exit was tolerated by policy.
    pub tolerated: bool,
    /// Wall-clock duration of the invocation in milliseconds.
    pub duration_ms: u64,
}

impl CommandRecord {
    /// Returns true if the command exited zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Returns the exit code, treating an abnormal exit as the shell's
    /// conventional 128-class failure.
    #[must_use]
    pub fn code_or_abnormal(&self) -> i32 {
        self.exit_code.unwrap_or(128)
    }
}

/// The finalized result of one pipeline invocation.
///
/// Created once per invocation and finalized when the last stage completes
/// or the first untolerated failure occurs. Post-phase commands also leave
/// records here, but their outcomes never influence `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Unique id of this invocation.
    pub run_id: Uuid,
    /// Name of the pipeline that ran.
    pub pipeline: String,
    /// The terminal status.
    pub status: RunStatus,
    /// Per-command log, in execution order.
    pub records: Vec<CommandRecord>,
    /// When the run began.
    pub started_at: DateTime<Utc>,
    /// When the run finished, post-processing included.
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// Maps the run outcome to a process exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }

    /// Returns the failing stage and exit code, if the run failed.
    #[must_use]
    pub fn failure(&self) -> Option<(&str, i32)> {
        match &self.status {
            RunStatus::Failed { stage, exit_code } => Some((stage.as_str(), *exit_code)),
            RunStatus::Success => None,
        }
    }

    /// Returns the records captured for a given stage.
    pub fn records_for_stage<'a>(
        &'a self,
        stage: &'a str,
    ) -> impl Iterator<Item = &'a CommandRecord> + 'a {
        self.records.iter().filter(move |r| r.stage == stage)
    }

    /// Returns the distinct stage names that produced at least one record,
    /// in first-execution order.
    #[must_use]
    pub fn executed_stages(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for record in &self.records {
            let name = record.stage.as_str();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }

    /// Renders the result as a JSON report.
    #[must_use]
    pub fn to_report(&self) -> serde_json::Value {
        serde_json::json!({
            "run_id": self.run_id,
            "pipeline": self.pipeline,
            "status": self.status,
            "started_at": self.started_at,
            "finished_at": self.finished_at,
            "commands": self.records,
        })
    }
}
