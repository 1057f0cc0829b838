//! CLI entry point: runs a pipeline definition file and exits with the
//! run's exit code (0 on success, the failing command's code otherwise).

use anyhow::{bail, Context};
use runway::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: runway <pipeline.json>");
    };

    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read pipeline file '{path}'"))?;
    let spec = PipelineSpec::from_json(&raw)
        .with_context(|| format!("Invalid pipeline definition in '{path}'"))?;

    let executor =
        Executor::new(Arc::new(ProcessRunner::new())).with_event_sink(Arc::new(LoggingEventSink));

    let result = executor.run(&spec).await;

    println!("{}", serde_json::to_string_pretty(&result.to_report())?);

    std::process::exit(result.exit_code());
}
