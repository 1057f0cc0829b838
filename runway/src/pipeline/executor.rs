//! The sequential pipeline executor.

use super::{PipelineSpec, Stage};
use crate::cancellation::{CancellationToken, CleanupGuard};
use crate::command::{Command, CommandRunner};
use crate::core::{CommandRecord, RunResult, RunStatus};
use crate::events::{EventSink, NoOpEventSink};
use crate::probe::ReadinessProbe;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Stage name recorded for the readiness-probe verification step.
const VERIFY_STAGE: &str = "verify";

/// Conventional exit code recorded when a run is cancelled.
const CANCELLED_EXIT_CODE: i32 = 130;

/// Exit code recorded when a command could not be spawned at all.
const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

/// Runs pipelines strictly sequentially with a typed failure policy.
///
/// Stages execute in list order, commands in list order within each stage.
/// The first untolerated non-zero exit aborts all remaining commands and
/// stages. The `always` post phase runs exactly once per invocation; the
/// `on_failure` phase runs only when the run failed. Post-phase failures
/// are logged but never change the run's status.
///
/// The executor itself holds no persisted state; every command execution
/// is an observable external effect.
pub struct Executor {
    runner: Arc<dyn CommandRunner>,
    sink: Arc<dyn EventSink>,
    token: Arc<CancellationToken>,
}

impl Executor {
    /// Creates an executor over the given command runner.
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            sink: Arc::new(NoOpEventSink),
            token: CancellationToken::new(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.token = token;
        self
    }

    /// Returns the executor's cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> Arc<CancellationToken> {
        Arc::clone(&self.token)
    }

    /// Runs the pipeline to completion or first untolerated failure.
    pub async fn run(&self, spec: &PipelineSpec) -> RunResult {
        self.run_inner(spec, None).await
    }

    /// Runs the pipeline and, if it succeeds, waits for the readiness probe.
    ///
    /// An unhealthy probe is folded into a failed verification stage before
    /// post-processing begins, so the `on_failure` phase still observes it.
    pub async fn run_with_verify(&self, spec: &PipelineSpec, probe: &ReadinessProbe) -> RunResult {
        self.run_inner(spec, Some(probe)).await
    }

    async fn run_inner(&self, spec: &PipelineSpec, probe: Option<&ReadinessProbe>) -> RunResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(pipeline = %spec.name, %run_id, "Starting pipeline run");
        self.sink
            .emit(
                "run.started",
                Some(serde_json::json!({"pipeline": spec.name, "run_id": run_id})),
            )
            .await;

        // Armed before the stage loop so the always-phase is still triggered
        // if this future is dropped between a stage failure and
        // post-processing. The detached phase logs but cannot append records.
        let mut guard = CleanupGuard::new({
            let runner = Arc::clone(&self.runner);
            let always = spec.post.always.clone();
            let workdir = spec.workdir.clone();
            let pipeline = spec.name.clone();
            move || {
                warn!(
                    pipeline = %pipeline,
                    "Run dropped before post-processing; always-phase runs detached"
                );
                if let Ok(handle) = tokio::runtime::Handle::try_current() {
                    handle.spawn(detached_always_phase(runner, always, workdir));
                }
            }
        });

        let mut records = Vec::new();
        let mut status = self.stage_loop(spec, &mut records).await;

        if status.is_success() {
            if let Some(probe) = probe {
                status = self.verify_phase(probe, &mut records).await;
            }
        }

        self.sink
            .emit("post.started", Some(serde_json::json!({"phase": "always"})))
            .await;

        // No await point may sit between the disarm and the always-phase:
        // a drop while suspended there would skip both the inline phase and
        // the detached fallback.
        guard.disarm();
        self.post_phase(&spec.post.always, "always", spec.workdir.as_deref(), &mut records)
            .await;
        self.sink
            .emit("post.completed", Some(serde_json::json!({"phase": "always"})))
            .await;

        if status.is_failure() {
            self.sink
                .emit(
                    "post.started",
                    Some(serde_json::json!({"phase": "on_failure"})),
                )
                .await;
            self.post_phase(
                &spec.post.on_failure,
                "on_failure",
                spec.workdir.as_deref(),
                &mut records,
            )
            .await;
            self.sink
                .emit(
                    "post.completed",
                    Some(serde_json::json!({"phase": "on_failure"})),
                )
                .await;
        }

        let result = RunResult {
            run_id,
            pipeline: spec.name.clone(),
            status,
            records,
            started_at,
            finished_at: Utc::now(),
        };

        info!(pipeline = %spec.name, status = %result.status, "Pipeline run finished");
        self.sink
            .emit(
                "run.completed",
                Some(serde_json::json!({
                    "pipeline": result.pipeline,
                    "status": result.status,
                    "exit_code": result.exit_code(),
                })),
            )
            .await;

        result
    }

    async fn stage_loop(
        &self,
        spec: &PipelineSpec,
        records: &mut Vec<CommandRecord>,
    ) -> RunStatus {
        for stage in &spec.stages {
            if let Some(status) = self.cancellation_abort(stage, records) {
                return status;
            }

            self.sink
                .emit(
                    "stage.started",
                    Some(serde_json::json!({"stage": stage.name})),
                )
                .await;

            if let Some(delay_ms) = stage.startup_delay_ms {
                debug!(stage = %stage.name, delay_ms, "Waiting out fixed startup delay");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            for command in &stage.commands {
                if let Some(status) = self.cancellation_abort(stage, records) {
                    return status;
                }

                let record = self.invoke(&stage.name, command, spec.workdir.as_deref()).await;
                self.sink
                    .emit(
                        "command.completed",
                        Some(serde_json::json!({
                            "stage": stage.name,
                            "command": record.command,
                            "exit_code": record.exit_code,
                        })),
                    )
                    .await;

                let succeeded = record.succeeded();
                let exit_code = record.code_or_abnormal();
                records.push(record);

                if !succeeded {
                    if command.tolerate_failure {
                        warn!(
                            stage = %stage.name,
                            command = %command.display_line(),
                            exit_code,
                            "Tolerated command failure, continuing"
                        );
                        continue;
                    }

                    error!(
                        stage = %stage.name,
                        command = %command.display_line(),
                        exit_code,
                        "Untolerated command failure, aborting remaining stages"
                    );
                    self.sink
                        .emit(
                            "stage.failed",
                            Some(serde_json::json!({"stage": stage.name, "exit_code": exit_code})),
                        )
                        .await;
                    return RunStatus::Failed {
                        stage: stage.name.clone(),
                        exit_code,
                    };
                }
            }

            self.sink
                .emit(
                    "stage.completed",
                    Some(serde_json::json!({"stage": stage.name})),
                )
                .await;
        }

        RunStatus::Success
    }

    /// Checks the cancellation token between commands.
    ///
    /// A command already in flight is never interrupted; cancellation takes
    /// effect at the next command boundary.
    fn cancellation_abort(
        &self,
        stage: &Stage,
        records: &mut Vec<CommandRecord>,
    ) -> Option<RunStatus> {
        if !self.token.is_cancelled() {
            return None;
        }

        let reason = self.token.reason().unwrap_or_default();
        warn!(stage = %stage.name, %reason, "Run cancelled");
        records.push(CommandRecord {
            stage: stage.name.clone(),
            command: "<cancelled>".to_string(),
            exit_code: Some(CANCELLED_EXIT_CODE),
            output: reason,
            tolerated: false,
            duration_ms: 0,
        });
        self.sink.try_emit(
            "stage.failed",
            Some(serde_json::json!({"stage": stage.name, "exit_code": CANCELLED_EXIT_CODE})),
        );

        Some(RunStatus::Failed {
            stage: stage.name.clone(),
            exit_code: CANCELLED_EXIT_CODE,
        })
    }

    async fn verify_phase(
        &self,
        probe: &ReadinessProbe,
        records: &mut Vec<CommandRecord>,
    ) -> RunStatus {
        self.sink
            .emit(
                "stage.started",
                Some(serde_json::json!({"stage": VERIFY_STAGE})),
            )
            .await;

        let started = Instant::now();
        let probe_line = format!("GET {}", probe.url());

        match probe.wait_ready().await {
            Ok(attempts) => {
                info!(url = %probe.url(), attempts, "Deployment verified healthy");
                records.push(CommandRecord {
                    stage: VERIFY_STAGE.to_string(),
                    command: probe_line,
                    exit_code: Some(0),
                    output: format!("ready after {attempts} attempt(s)"),
                    tolerated: false,
                    duration_ms: elapsed_ms(started),
                });
                self.sink
                    .emit(
                        "stage.completed",
                        Some(serde_json::json!({"stage": VERIFY_STAGE})),
                    )
                    .await;
                RunStatus::Success
            }
            Err(err) => {
                error!(url = %probe.url(), error = %err, "Deployment verification failed");
                records.push(CommandRecord {
                    stage: VERIFY_STAGE.to_string(),
                    command: probe_line,
                    exit_code: Some(1),
                    output: err.to_string(),
                    tolerated: false,
                    duration_ms: elapsed_ms(started),
                });
                self.sink
                    .emit(
                        "stage.failed",
                        Some(serde_json::json!({"stage": VERIFY_STAGE, "exit_code": 1})),
                    )
                    .await;
                RunStatus::Failed {
                    stage: VERIFY_STAGE.to_string(),
                    exit_code: 1,
                }
            }
        }
    }

    /// Runs one best-effort post phase. Failures are logged, never escalated,
    /// so the post phase itself cannot fail the run a second time.
    async fn post_phase(
        &self,
        commands: &[Command],
        phase: &str,
        workdir: Option<&Path>,
        records: &mut Vec<CommandRecord>,
    ) {
        for command in commands {
            let mut record = self.invoke(phase, command, workdir).await;
            record.tolerated = true;

            if record.succeeded() {
                if phase == "on_failure" && !record.output.is_empty() {
                    // Surface collaborator logs before teardown commands run.
                    info!(
                        command = %record.command,
                        "Captured collaborator output:\n{}",
                        record.output
                    );
                }
            } else {
                warn!(
                    phase,
                    command = %record.command,
                    exit_code = ?record.exit_code,
                    "Post-action failure (best-effort, not escalated)"
                );
            }

            records.push(record);
        }
    }

    async fn invoke(
        &self,
        stage_name: &str,
        command: &Command,
        workdir: Option<&Path>,
    ) -> CommandRecord {
        let started = Instant::now();

        let (exit_code, output) = match self.runner.run(command, workdir).await {
            Ok(out) => (out.exit_code, out.output),
            // Mirrors the shell's 127 for a command that never started.
            Err(err) => (Some(SPAWN_FAILURE_EXIT_CODE), err.to_string()),
        };

        CommandRecord {
            stage: stage_name.to_string(),
            command: command.display_line(),
            exit_code,
            output,
            tolerated: command.tolerate_failure,
            duration_ms: elapsed_ms(started),
        }
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("runner", &self.runner)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

/// Always-phase fallback for a dropped run future. Outcomes are logged only.
async fn detached_always_phase(
    runner: Arc<dyn CommandRunner>,
    commands: Vec<Command>,
    workdir: Option<PathBuf>,
) {
    for command in &commands {
        match runner.run(command, workdir.as_deref()).await {
            Ok(out) if !out.success() => {
                warn!(
                    command = %command.display_line(),
                    exit_code = ?out.exit_code,
                    "Detached always-phase command failed"
                );
            }
            Err(err) => {
                warn!(
                    command = %command.display_line(),
                    error = %err,
                    "Detached always-phase command could not run"
                );
            }
            Ok(_) => {}
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ScriptedRunner;
    use crate::events::CollectingEventSink;
    use crate::pipeline::PipelineBuilder;
    use pretty_assertions::assert_eq;

    fn three_stage_spec() -> PipelineSpec {
        PipelineBuilder::new("test")
            .stage_command("first", Command::new("cmd-first"))
            .stage_command("second", Command::new("cmd-second"))
            .stage_command("third", Command::new("cmd-third"))
            .always(Command::new("cmd-always"))
            .on_failure(Command::new("cmd-on-failure"))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_success_runs_every_stage_in_order() {
        let runner = Arc::new(ScriptedRunner::new());
        let executor = Executor::new(runner.clone());

        let result = executor.run(&three_stage_spec()).await;

        assert!(result.status.is_success());
        assert_eq!(
            runner.invocations(),
            vec!["cmd-first", "cmd-second", "cmd-third", "cmd-always"]
        );
    }

    #[tokio::test]
    async fn test_untolerated_failure_short_circuits() {
        let runner = Arc::new(ScriptedRunner::new().fail_on("cmd-second", 3));
        let executor = Executor::new(runner.clone());

        let result = executor.run(&three_stage_spec()).await;

        assert_eq!(result.failure(), Some(("second", 3)));
        assert!(!runner.invoked("cmd-third"));
        assert!(runner.invoked("cmd-always"));
        assert!(runner.invoked("cmd-on-failure"));
    }

    #[tokio::test]
    async fn test_tolerated_failure_is_control_flow_noop() {
        let spec = PipelineBuilder::new("test")
            .stage_command("cleanup", Command::new("cmd-cleanup").tolerated())
            .stage_command("build", Command::new("cmd-build"))
            .always(Command::new("cmd-always"))
            .build()
            .unwrap();

        let runner = Arc::new(ScriptedRunner::new().fail_on("cmd-cleanup", 1));
        let executor = Executor::new(runner.clone());

        let result = executor.run(&spec).await;

        assert!(result.status.is_success());
        assert!(runner.invoked("cmd-build"));
        // The tolerated failure is still observable in the record log.
        let cleanup: Vec<_> = result.records_for_stage("cleanup").collect();
        assert_eq!(cleanup.len(), 1);
        assert_eq!(cleanup[0].exit_code, Some(1));
        assert!(cleanup[0].tolerated);
    }

    #[tokio::test]
    async fn test_on_failure_skipped_on_success() {
        let runner = Arc::new(ScriptedRunner::new());
        let executor = Executor::new(runner.clone());

        let result = executor.run(&three_stage_spec()).await;

        assert!(result.status.is_success());
        assert!(!runner.invoked("cmd-on-failure"));
    }

    #[tokio::test]
    async fn test_always_runs_exactly_once_each_outcome() {
        for fail in [false, true] {
            let mut runner = ScriptedRunner::new();
            if fail {
                runner = runner.fail_on("cmd-first", 9);
            }
            let runner = Arc::new(runner);
            let executor = Executor::new(runner.clone());

            let _ = executor.run(&three_stage_spec()).await;

            let always_count = runner
                .invocations()
                .iter()
                .filter(|line| line.contains("cmd-always"))
                .count();
            assert_eq!(always_count, 1);
        }
    }

    #[tokio::test]
    async fn test_post_failure_never_escalates() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .fail_on("cmd-always", 1)
                .fail_on("cmd-on-failure", 1),
        );
        let executor = Executor::new(runner);

        let result = executor.run(&three_stage_spec()).await;

        assert!(result.status.is_success());
        assert_eq!(result.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_spawn_failure_aborts_like_127() {
        #[derive(Debug)]
        struct BrokenRunner;

        #[async_trait::async_trait]
        impl CommandRunner for BrokenRunner {
            async fn run(
                &self,
                command: &Command,
                _default_workdir: Option<&Path>,
            ) -> Result<crate::command::CommandOutput, crate::errors::CommandError> {
                Err(crate::errors::CommandError::Spawn {
                    program: command.program.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
                })
            }
        }

        let spec = PipelineBuilder::new("test")
            .stage_command("clone", Command::new("git").args(["clone", "url"]))
            .build()
            .unwrap();

        let executor = Executor::new(Arc::new(BrokenRunner));
        let result = executor.run(&spec).await;

        assert_eq!(result.failure(), Some(("clone", SPAWN_FAILURE_EXIT_CODE)));
    }

    #[tokio::test]
    async fn test_cancellation_between_stages() {
        let runner = Arc::new(ScriptedRunner::new());
        let executor = Executor::new(runner.clone());

        executor.cancellation_token().cancel("operator abort");
        let result = executor.run(&three_stage_spec()).await;

        assert_eq!(result.failure(), Some(("first", CANCELLED_EXIT_CODE)));
        assert!(!runner.invoked("cmd-first"));
        // Post phases still run on the cancelled path.
        assert!(runner.invoked("cmd-always"));
        assert!(runner.invoked("cmd-on-failure"));
    }

    #[tokio::test]
    async fn test_always_phase_runs_detached_when_run_future_dropped() {
        /// Sink that never returns from the always-phase announcement,
        /// pinning the run future at an await point before post-processing.
        #[derive(Debug)]
        struct StallingSink;

        #[async_trait::async_trait]
        impl crate::events::EventSink for StallingSink {
            async fn emit(&self, event_type: &str, _data: Option<serde_json::Value>) {
                if event_type == "post.started" {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }

            fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
        }

        let runner = Arc::new(ScriptedRunner::new());
        let executor = Executor::new(runner.clone()).with_event_sink(Arc::new(StallingSink));
        let spec = PipelineBuilder::new("test")
            .stage_command("only", Command::new("cmd-stage"))
            .always(Command::new("cmd-always"))
            .build()
            .unwrap();

        let handle = tokio::spawn(async move {
            let _ = executor.run(&spec).await;
        });

        // Let the stage loop finish and the run park at the stalled emit.
        for _ in 0..200 {
            if runner.invoked("cmd-stage") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(runner.invoked("cmd-stage"));
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.abort();
        let _ = handle.await;

        // The guard must hand the always-phase off to a detached task.
        for _ in 0..200 {
            if runner.invoked("cmd-always") {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("always-phase never ran after the run future was dropped");
    }

    #[tokio::test]
    async fn test_event_sequence_on_success() {
        let runner = Arc::new(ScriptedRunner::new());
        let sink = Arc::new(CollectingEventSink::new());
        let executor = Executor::new(runner).with_event_sink(sink.clone());

        let spec = PipelineBuilder::new("test")
            .stage_command("only", Command::new("cmd"))
            .build()
            .unwrap();
        let _ = executor.run(&spec).await;

        assert_eq!(
            sink.event_types(),
            vec![
                "run.started",
                "stage.started",
                "command.completed",
                "stage.completed",
                "post.started",
                "post.completed",
                "run.completed",
            ]
        );
    }

    #[tokio::test]
    async fn test_event_sequence_on_failure() {
        let runner = Arc::new(ScriptedRunner::new().fail_on("cmd", 2));
        let sink = Arc::new(CollectingEventSink::new());
        let executor = Executor::new(runner).with_event_sink(sink.clone());

        let spec = PipelineBuilder::new("test")
            .stage_command("only", Command::new("cmd"))
            .on_failure(Command::new("cmd-logs"))
            .build()
            .unwrap();
        let _ = executor.run(&spec).await;

        assert_eq!(sink.count("stage.failed"), 1);
        assert_eq!(sink.count("stage.completed"), 0);
        assert_eq!(sink.count("post.started"), 2);
    }

    #[tokio::test]
    async fn test_empty_stage_is_a_noop() {
        let runner = Arc::new(ScriptedRunner::new());
        let executor = Executor::new(runner.clone());

        let spec = PipelineBuilder::new("test")
            .stage(Stage::new("empty"))
            .stage_command("real", Command::new("cmd"))
            .build()
            .unwrap();
        let result = executor.run(&spec).await;

        assert!(result.status.is_success());
        assert_eq!(runner.invocations(), vec!["cmd"]);
    }

    #[tokio::test]
    async fn test_stage_startup_delay() {
        let runner = Arc::new(ScriptedRunner::new());
        let executor = Executor::new(runner.clone());

        let spec = PipelineBuilder::new("test")
            .stage(Stage::new("delayed").with_delay_ms(20).command(Command::new("cmd")))
            .build()
            .unwrap();

        let started = Instant::now();
        let result = executor.run(&spec).await;

        assert!(result.status.is_success());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
