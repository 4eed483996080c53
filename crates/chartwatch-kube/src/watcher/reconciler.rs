//! Keeps the profile cache in sync with `HelmRepository` objects

use chartwatch_core::{ObjectKey, RepositorySnapshot, WatcherConfig};
use chartwatch_repo::{ChartRepoManager, DiscoveryConfig, ProfileCache, RepositoryRef};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::cancel::{CancelSignal, RefreshBudget};
use crate::crd::{HelmRepository, object_key};
use crate::error::{KubeError, Result};

/// What a reconcile did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The cache entry was removed
    Deleted,
    /// The repository has no published artifact yet; nothing was done
    NotReady,
    /// The cache entry was replaced
    Refreshed {
        profiles: usize,
        values: usize,
        unavailable: usize,
    },
}

/// Refreshes the cached profiles of a repository
pub struct RepositoryReconciler {
    manager: Arc<dyn ChartRepoManager>,
    cache: Arc<dyn ProfileCache>,
    discovery: DiscoveryConfig,
    values_file: String,
    refresh_timeout: Duration,
}

impl RepositoryReconciler {
    /// Create a reconciler with the default configuration
    pub fn new(manager: Arc<dyn ChartRepoManager>, cache: Arc<dyn ProfileCache>) -> Self {
        Self::from_config(manager, cache, &WatcherConfig::default())
    }

    pub fn from_config(
        manager: Arc<dyn ChartRepoManager>,
        cache: Arc<dyn ProfileCache>,
        config: &WatcherConfig,
    ) -> Self {
        Self {
            manager,
            cache,
            discovery: DiscoveryConfig::with_annotation(&config.profile_annotation),
            values_file: config.values_file_name.clone(),
            refresh_timeout: config.refresh_timeout,
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn cache(&self) -> &Arc<dyn ProfileCache> {
        &self.cache
    }

    /// Bring the cache entry of `repository` up to date
    #[tracing::instrument(skip_all, fields(namespace = ?repository.metadata.namespace, name = ?repository.metadata.name))]
    pub async fn reconcile(
        &self,
        repository: &HelmRepository,
        cancel: &CancelSignal,
    ) -> Result<ReconcileOutcome> {
        let key = object_key(repository)?;

        if repository.is_deleted() {
            return self.remove(&key).await;
        }

        if repository.artifact().is_none() {
            debug!("repository has no artifact yet");
            return Ok(ReconcileOutcome::NotReady);
        }

        let repo = repository.repository_ref()?;
        let budget = RefreshBudget::new(cancel.clone(), self.refresh_timeout);
        let snapshot = budget.run(&key, self.fetch_snapshot(&repo)).await??;

        // The put itself is never interrupted
        budget.check(&key)?;
        let outcome = ReconcileOutcome::Refreshed {
            profiles: snapshot.profiles.len(),
            values: snapshot.value_count(),
            unavailable: snapshot.unavailable.len(),
        };
        self.cache
            .put(&key, snapshot)
            .await
            .map_err(|source| KubeError::Cache {
                key: key.clone(),
                source,
            })?;

        info!(?outcome, "profile cache refreshed");
        Ok(outcome)
    }

    /// Drop the cache entry of a repository that no longer exists
    #[tracing::instrument(skip(self), fields(namespace = %key.namespace, name = %key.name))]
    pub async fn remove(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        self.cache
            .delete(key)
            .await
            .map_err(|source| KubeError::Cache {
                key: key.clone(),
                source,
            })?;
        self.manager.forget(key).await;
        info!("removed repository from profile cache");
        Ok(ReconcileOutcome::Deleted)
    }

    async fn fetch_snapshot(&self, repo: &RepositoryRef) -> Result<RepositorySnapshot> {
        let profiles = self
            .manager
            .list_charts(repo, &self.discovery)
            .await
            .map_err(|source| KubeError::UpstreamUnavailable {
                repository: repo.key.clone(),
                source,
            })?;
        debug!(profiles = profiles.len(), "listed profiles");

        let mut snapshot = RepositorySnapshot::new(profiles);
        let references: Vec<_> = snapshot
            .profiles
            .iter()
            .flat_map(|profile| profile.references())
            .collect();

        for reference in references {
            match self
                .manager
                .get_values(repo, &reference, &self.values_file)
                .await
            {
                Ok(payload) => snapshot.insert_values(&reference, payload),
                Err(e) => {
                    warn!(
                        chart = %reference.chart,
                        version = %reference.version,
                        error = %e,
                        "failed to fetch values"
                    );
                    snapshot.mark_unavailable(reference);
                }
            }
        }

        Ok(snapshot)
    }
}
