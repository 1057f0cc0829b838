//! Collaborator command builders and the canonical deploy pipeline.
//!
//! The external tools (source-control client, container build engine,
//! container orchestrator) are opaque to the executor; this module only
//! knows how to phrase their invocations. `deploy_pipeline` assembles the
//! observed Cleanup → Clone → CopyConfigs → Build → Deploy sequence with
//! log capture and teardown wired into the failure path.

use crate::command::{Command, CommandRunner};
use crate::errors::RunwayError;
use crate::pipeline::{Executor, PipelineSpec, PostActions, Stage};
use crate::probe::{ProbeConfig, ReadinessProbe};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Inputs for the canonical deploy pipeline.
///
/// Every path and URL is a configuration input; nothing is hardcoded. The
/// `workspace` is the single mutable build context, exclusively owned by
/// one run at a time; the cleanup stage tears down leftovers from a prior
/// run rather than locking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Source repository URL.
    pub repo_url: String,
    /// Branch to materialize.
    pub branch: String,
    /// Image tag produced by the build.
    pub image_tag: String,
    /// Working tree and build context for the run.
    pub workspace: PathBuf,
    /// Compose definition driving the deployment.
    pub compose_file: PathBuf,
    /// Externally supplied config files copied into the build context
    /// before the build stage. Treated as opaque blobs.
    #[serde(default)]
    pub config_files: Vec<PathBuf>,
    /// Health endpoint used to verify the deployment.
    pub health_url: String,
    /// Probe pacing; defaults applied when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeOverrides>,
}

/// Optional probe pacing overrides carried in the deploy config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeOverrides {
    /// Maximum probe attempts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<usize>,
    /// Base delay between attempts in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_delay_ms: Option<u64>,
}

impl DeployConfig {
    /// Builds the probe configuration for this deployment.
    #[must_use]
    pub fn probe_config(&self) -> ProbeConfig {
        let mut config = ProbeConfig::new(&self.health_url);
        if let Some(overrides) = &self.probe {
            if let Some(attempts) = overrides.max_attempts {
                config = config.with_max_attempts(attempts);
            }
            if let Some(delay) = overrides.base_delay_ms {
                config = config.with_base_delay_ms(delay);
            }
        }
        config
    }
}

/// Materializes a working tree at `dest` from the given branch.
#[must_use]
pub fn git_clone(url: &str, branch: &str, dest: &Path) -> Command {
    Command::new("git")
        .args(["clone", "--branch", branch, "--single-branch", url])
        .arg(dest.to_string_lossy())
}

/// Builds a named image from the build context.
#[must_use]
pub fn docker_build(tag: &str, context: &Path) -> Command {
    Command::new("docker")
        .args(["build", "-t", tag])
        .arg(context.to_string_lossy())
}

/// Starts the composed services, optionally detached.
#[must_use]
pub fn compose_up(file: &Path, detached: bool) -> Command {
    let cmd = Command::new("docker-compose")
        .arg("-f")
        .arg(file.to_string_lossy())
        .arg("up");
    if detached {
        cmd.arg("-d")
    } else {
        cmd
    }
}

/// Tears the composed services down, optionally removing volumes.
#[must_use]
pub fn compose_down(file: &Path, volumes: bool) -> Command {
    let cmd = Command::new("docker-compose")
        .arg("-f")
        .arg(file.to_string_lossy())
        .arg("down");
    if volumes {
        cmd.arg("--volumes")
    } else {
        cmd
    }
}

/// Captures the composed services' logs.
#[must_use]
pub fn compose_logs(file: &Path) -> Command {
    Command::new("docker-compose")
        .arg("-f")
        .arg(file.to_string_lossy())
        .args(["logs", "--no-color"])
}

/// Copies an opaque configuration blob into the build context.
#[must_use]
pub fn copy_config(src: &Path, dest_dir: &Path) -> Command {
    Command::new("cp")
        .arg(src.to_string_lossy())
        .arg(dest_dir.to_string_lossy())
}

/// Assembles the canonical deploy pipeline for the given config.
///
/// Cleanup tolerates every failure (there may be nothing to tear down);
/// every later stage is fatal on first failure. The failure path captures
/// orchestrator logs before tearing resources down, and the always-phase
/// logs completion.
#[must_use]
pub fn deploy_pipeline(config: &DeployConfig) -> PipelineSpec {
    let workspace = config.workspace.as_path();
    let compose_file = config.compose_file.as_path();

    let mut copy_stage = Stage::new("copy-configs");
    for file in &config.config_files {
        copy_stage = copy_stage.command(copy_config(file, workspace));
    }

    PipelineSpec {
        name: "deploy".to_string(),
        stages: vec![
            Stage::new("cleanup")
                .command(compose_down(compose_file, true).tolerated())
                .command(
                    Command::new("rm")
                        .arg("-rf")
                        .arg(workspace.to_string_lossy())
                        .tolerated(),
                ),
            Stage::new("clone").command(git_clone(&config.repo_url, &config.branch, workspace)),
            copy_stage,
            Stage::new("build").command(docker_build(&config.image_tag, workspace)),
            Stage::new("deploy").command(compose_up(compose_file, true)),
        ],
        post: PostActions::new()
            .always(Command::new("echo").arg("Pipeline completed"))
            .on_failure(compose_logs(compose_file))
            .on_failure(compose_down(compose_file, true)),
        workdir: None,
    }
}

/// Runs the canonical deploy pipeline and verifies the deployment.
///
/// # Errors
///
/// Returns an error only if the readiness probe cannot be constructed;
/// stage and probe failures are reported through the returned result.
pub async fn run_deploy(
    config: &DeployConfig,
    runner: Arc<dyn CommandRunner>,
) -> Result<crate::core::RunResult, RunwayError> {
    let spec = deploy_pipeline(config);
    let probe = ReadinessProbe::new(config.probe_config())?;
    let executor = Executor::new(runner);
    Ok(executor.run_with_verify(&spec, &probe).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_config() -> DeployConfig {
        DeployConfig {
            repo_url: "https://example.com/app.git".to_string(),
            branch: "main".to_string(),
            image_tag: "app:latest".to_string(),
            workspace: PathBuf::from("/var/lib/runway/workspace"),
            compose_file: PathBuf::from("/var/lib/runway/workspace/docker-compose.yml"),
            config_files: vec![
                PathBuf::from("/etc/runway/app.env"),
                PathBuf::from("/etc/runway/db.env"),
            ],
            health_url: "http://localhost:8080/health".to_string(),
            probe: None,
        }
    }

    #[test]
    fn test_git_clone_command() {
        let cmd = git_clone("https://example.com/app.git", "main", Path::new("/tmp/ws"));
        assert_eq!(
            cmd.display_line(),
            "git clone --branch main --single-branch https://example.com/app.git /tmp/ws"
        );
    }

    #[test]
    fn test_compose_commands() {
        let file = Path::new("docker-compose.yml");

        assert_eq!(
            compose_up(file, true).display_line(),
            "docker-compose -f docker-compose.yml up -d"
        );
        assert_eq!(
            compose_down(file, true).display_line(),
            "docker-compose -f docker-compose.yml down --volumes"
        );
        assert_eq!(
            compose_down(file, false).display_line(),
            "docker-compose -f docker-compose.yml down"
        );
        assert_eq!(
            compose_logs(file).display_line(),
            "docker-compose -f docker-compose.yml logs --no-color"
        );
    }

    #[test]
    fn test_deploy_pipeline_shape() {
        let spec = deploy_pipeline(&sample_config());

        let names: Vec<_> = spec.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["cleanup", "clone", "copy-configs", "build", "deploy"]
        );

        // Cleanup tolerates everything; later stages are fatal.
        assert!(spec.stages[0].commands.iter().all(|c| c.tolerate_failure));
        assert!(spec.stages[1..]
            .iter()
            .flat_map(|s| &s.commands)
            .all(|c| !c.tolerate_failure));

        // Logs are captured before teardown in the failure path.
        assert_eq!(spec.post.on_failure.len(), 2);
        assert!(spec.post.on_failure[0].display_line().contains("logs"));
        assert!(spec.post.on_failure[1].display_line().contains("down"));
        assert_eq!(spec.post.always.len(), 1);
    }

    #[test]
    fn test_copy_configs_one_command_per_file() {
        let spec = deploy_pipeline(&sample_config());
        let copy_stage = &spec.stages[2];
        assert_eq!(copy_stage.commands.len(), 2);
        assert!(copy_stage.commands[0].display_line().starts_with("cp "));
    }

    #[test]
    fn test_probe_config_overrides() {
        let mut config = sample_config();
        assert_eq!(config.probe_config().max_attempts, 10);

        config.probe = Some(ProbeOverrides {
            max_attempts: Some(3),
            base_delay_ms: Some(50),
        });
        let probe = config.probe_config();
        assert_eq!(probe.max_attempts, 3);
        assert_eq!(probe.base_delay_ms, 50);
        assert_eq!(probe.url, "http://localhost:8080/health");
    }

    #[test]
    fn test_deploy_config_deserializes() {
        let json = r#"{
            "repo_url": "https://example.com/app.git",
            "branch": "release",
            "image_tag": "app:1.2",
            "workspace": "/tmp/ws",
            "compose_file": "/tmp/ws/docker-compose.yml",
            "health_url": "http://localhost:8080/health"
        }"#;

        let config: DeployConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.branch, "release");
        assert!(config.config_files.is_empty());
        assert!(config.probe.is_none());
    }
}
