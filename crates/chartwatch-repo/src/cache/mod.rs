//! Profile cache
//!
//! Keeps the last successful snapshot of every watched repository, keyed by
//! the repository's namespace and name:
//! - **Memory**: process-local map, the default
//! - **SQLite**: survives restarts and can be read by other processes
//!
//! Every backend gives the same guarantees: `put` replaces the whole entry
//! atomically, readers never observe a half-written snapshot, and deleting
//! an absent key succeeds.

mod memory;
mod sqlite;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;

use async_trait::async_trait;
use chartwatch_core::{ChartProfile, ObjectKey, RepositorySnapshot, VersionValues};

use crate::error::{RepoError, Result};

/// Storage of repository snapshots
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait ProfileCache: Send + Sync {
    /// Replace the snapshot of a repository, creating it if absent
    async fn put(&self, key: &ObjectKey, snapshot: RepositorySnapshot) -> Result<()>;

    /// Get the snapshot of a repository
    async fn get(&self, key: &ObjectKey) -> Result<Option<RepositorySnapshot>>;

    /// Remove the snapshot of a repository
    async fn delete(&self, key: &ObjectKey) -> Result<()>;

    /// Profiles of a repository
    async fn list_profiles(&self, key: &ObjectKey) -> Result<Vec<ChartProfile>> {
        self.get(key)
            .await?
            .map(|snapshot| snapshot.profiles)
            .ok_or_else(|| RepoError::CacheMiss {
                key: key.to_string(),
            })
    }

    /// Values file of one profile version
    async fn get_profile_values(
        &self,
        key: &ObjectKey,
        chart: &str,
        version: &str,
    ) -> Result<Vec<u8>> {
        let snapshot = self.get(key).await?.ok_or_else(|| RepoError::CacheMiss {
            key: key.to_string(),
        })?;

        match snapshot.values_for(chart, version) {
            VersionValues::Available(payload) => Ok(payload.to_vec()),
            VersionValues::Unavailable | VersionValues::Unknown => Err(RepoError::CacheMiss {
                key: format!("{} {}@{}", key, chart, version),
            }),
        }
    }
}
