//! `nvisy status`: provider health or a stored task.

use anyhow::Context;
use nvisy_core::ServiceStatus;
use nvisy_core::store::DurableStoreExt;
use nvisy_provider::ProviderRegistry;
use nvisy_runtime::task::Task;

use super::Backend;
use crate::config::{Cli, StatusArgs};

/// Prints the stored task as JSON, or one health line per provider.
pub async fn status(cli: &Cli, args: &StatusArgs) -> anyhow::Result<()> {
    match args.task_id {
        Some(task_id) => {
            let backend = Backend::open(cli).await?;
            let task: Task = backend
                .store
                .get_json(&Task::storage_key(task_id))
                .await
                .context("failed to read the task record")?
                .with_context(|| format!("task {task_id} not found"))?;
            let json = serde_json::to_string_pretty(&task).context("failed to serialize the task")?;
            println!("{json}");
        }
        None => {
            let registry = ProviderRegistry::from_config(&cli.providers)
                .context("failed to register providers")?;
            if registry.is_empty() {
                anyhow::bail!("no providers are enabled");
            }

            let mut unhealthy = 0_usize;
            for (id, health) in registry.health().await {
                if health.status == ServiceStatus::Unhealthy {
                    unhealthy += 1;
                }
                let latency = health
                    .latency
                    .map(|latency| format!("{}ms", latency.as_millis()))
                    .unwrap_or_else(|| "-".to_owned());
                let message = health.message.as_deref().unwrap_or("");
                println!("{id:<24} {:<10} {latency:>8}  {message}", health.status.as_ref());
            }
            if unhealthy > 0 {
                anyhow::bail!("{unhealthy} provider(s) are unhealthy");
            }
        }
    }
    Ok(())
}
