//! Fluent pipeline builder with validation.

use super::{PipelineSpec, PostActions, Stage};
use crate::command::Command;
use crate::errors::PipelineValidationError;
use std::path::PathBuf;

/// Builder for [`PipelineSpec`] values.
///
/// Stages execute in the order they are added; there is no dependency
/// graph, since later stages always depend on the side effects of earlier
/// ones.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    name: String,
    stages: Vec<Stage>,
    post: PostActions,
    workdir: Option<PathBuf>,
}

impl PipelineBuilder {
    /// Creates a builder for a pipeline with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
            post: PostActions::default(),
            workdir: None,
        }
    }

    /// Appends a stage.
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Appends a single-command stage.
    #[must_use]
    pub fn stage_command(self, name: impl Into<String>, command: Command) -> Self {
        self.stage(Stage::new(name).command(command))
    }

    /// Appends an always-phase command.
    #[must_use]
    pub fn always(mut self, command: Command) -> Self {
        self.post.always.push(command);
        self
    }

    /// Appends an on-failure command.
    #[must_use]
    pub fn on_failure(mut self, command: Command) -> Self {
        self.post.on_failure.push(command);
        self
    }

    /// Sets the default working directory for every command.
    #[must_use]
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(dir.into());
        self
    }

    /// Builds and validates the specification.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is blank or no stages were added.
    pub fn build(self) -> Result<PipelineSpec, PipelineValidationError> {
        let spec = PipelineSpec {
            name: self.name,
            stages: self.stages,
            post: self.post,
            workdir: self.workdir,
        };
        spec.validate()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_preserves_stage_order() {
        let spec = PipelineBuilder::new("deploy")
            .stage_command("cleanup", Command::new("docker-compose").arg("down").tolerated())
            .stage_command("clone", Command::new("git").args(["clone", "url"]))
            .stage_command("build", Command::new("docker").args(["build", "."]))
            .build()
            .unwrap();

        let names: Vec<_> = spec.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["cleanup", "clone", "build"]);
    }

    #[test]
    fn test_builder_post_actions() {
        let spec = PipelineBuilder::new("deploy")
            .stage(Stage::new("noop"))
            .always(Command::new("echo").arg("done"))
            .on_failure(Command::new("docker-compose").arg("logs"))
            .on_failure(Command::new("docker-compose").args(["down", "--volumes"]))
            .build()
            .unwrap();

        assert_eq!(spec.post.always.len(), 1);
        assert_eq!(spec.post.on_failure.len(), 2);
    }

    #[test]
    fn test_builder_rejects_empty_pipeline() {
        let err = PipelineBuilder::new("deploy").build();
        assert!(err.is_err());
    }

    #[test]
    fn test_builder_workdir() {
        let spec = PipelineBuilder::new("deploy")
            .stage(Stage::new("noop"))
            .workdir("/tmp/ctx")
            .build()
            .unwrap();

        assert_eq!(spec.workdir, Some(PathBuf::from("/tmp/ctx")));
    }
}
