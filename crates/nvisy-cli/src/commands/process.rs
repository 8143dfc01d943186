//! `nvisy process`: ingest one document and wait for its result.

use std::path::Path;

use anyhow::Context;
use bytes::Bytes;
use nvisy_runtime::merge::MergedResult;
use nvisy_runtime::task::{SubmitRequest, TaskStatus};

use super::{log_summary, start_manager, wait_or_interrupt};
use crate::TRACING_TARGET_PROGRESS;
use crate::config::{Cli, ProcessArgs};

/// Submits the file, waits for the task and writes the merged result.
pub async fn process(cli: &Cli, args: &ProcessArgs) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;

    let mut request = SubmitRequest::new(args.types.clone()).with_priority(args.priority);
    if !args.languages.is_empty() {
        request = request.with_languages(args.languages.iter().map(String::as_str));
    }

    let manager = start_manager(cli).await?;
    let task_id = manager
        .submit(Bytes::from(bytes), request)
        .await
        .context("failed to submit document")?;
    tracing::info!(
        target: TRACING_TARGET_PROGRESS,
        task_id = %task_id,
        file = %args.file.display(),
        "Document submitted"
    );

    let Some(task) = wait_or_interrupt(&manager, task_id).await? else {
        return Ok(());
    };
    log_summary(&task);

    let result = manager.result(task_id).await;
    manager.shutdown().await;

    match result.context("failed to load the merged result")? {
        Some(result) => write_result(&result, args.output.as_deref()).await?,
        None if task.status == TaskStatus::Failed => {
            anyhow::bail!("task {task_id} failed: {}", task.diagnostics.join("; "))
        }
        None => anyhow::bail!("task {task_id} ended as {} without a result", task.status),
    }
    Ok(())
}

/// Writes the result as pretty JSON to `output`, or to stdout.
async fn write_result(result: &MergedResult, output: Option<&Path>) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(result).context("failed to serialize the result")?;
    match output {
        Some(path) => {
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(
                target: TRACING_TARGET_PROGRESS,
                path = %path.display(),
                elements = result.elements.len(),
                quality = result.quality.overall,
                low_confidence = result.low_confidence,
                "Result written"
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}
