//! Watch command - keep the profile cache in sync with the cluster

use chartwatch_core::WatcherConfig;
use chartwatch_kube::cancel_pair;
use chartwatch_repo::HttpRepoManager;
use console::style;
use kube::Client;
use std::sync::Arc;
use tracing::info;

use super::open_cache;
use crate::error::Result;

/// Run the watch command until interrupted
pub async fn run(mut config: WatcherConfig, namespace: Option<String>) -> Result<()> {
    if namespace.is_some() {
        config.watch_namespace = namespace;
    }

    let client = Client::try_default().await?;
    let manager = Arc::new(HttpRepoManager::new(config.http_timeout)?);
    let cache = open_cache(&config)?;

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            handle.cancel();
        }
    });

    eprintln!(
        "{} HelmRepository objects in {}",
        style("Watching").cyan().bold(),
        config
            .watch_namespace
            .as_deref()
            .map(|ns| format!("namespace {ns}"))
            .unwrap_or_else(|| "all namespaces".to_string())
    );

    chartwatch_kube::watcher::run(client, &config, manager, cache, signal).await?;

    eprintln!("{} Watcher stopped", style("✓").green());
    Ok(())
}
