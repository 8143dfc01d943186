//! `nvisy resume`: finish tasks left behind by an earlier run.

use anyhow::Context;
use nvisy_runtime::task::TaskStatus;

use super::{log_summary, start_manager, wait_or_interrupt};
use crate::TRACING_TARGET_PROGRESS;
use crate::config::Cli;

/// Restarts every non-terminal task from its latest checkpoint and waits
/// for all of them.
pub async fn resume(cli: &Cli) -> anyhow::Result<()> {
    let manager = start_manager(cli).await?;
    let resumed = manager.recover().await.context("failed to recover tasks")?;

    if resumed.is_empty() {
        tracing::info!(target: TRACING_TARGET_PROGRESS, "Nothing to resume");
        manager.shutdown().await;
        return Ok(());
    }
    tracing::info!(
        target: TRACING_TARGET_PROGRESS,
        tasks = resumed.len(),
        "Resuming tasks"
    );

    let mut unfinished = 0_usize;
    for task_id in resumed {
        let Some(task) = wait_or_interrupt(&manager, task_id).await? else {
            return Ok(());
        };
        log_summary(&task);
        if task.status != TaskStatus::Completed {
            unfinished += 1;
        }
    }
    manager.shutdown().await;

    if unfinished > 0 {
        anyhow::bail!("{unfinished} resumed task(s) did not complete");
    }
    Ok(())
}
