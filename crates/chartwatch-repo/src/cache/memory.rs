//! In-memory profile cache

use async_trait::async_trait;
use chartwatch_core::{ObjectKey, RepositorySnapshot};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::ProfileCache;
use crate::error::Result;

/// Process-local cache
///
/// Snapshots are stored behind `Arc`s: a `put` swaps the pointer under a
/// short write lock, so a reader sees either the old or the new snapshot.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<ObjectKey, Arc<RepositorySnapshot>>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys with a cached snapshot
    pub async fn keys(&self) -> Vec<ObjectKey> {
        let mut keys: Vec<_> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl ProfileCache for MemoryCache {
    async fn put(&self, key: &ObjectKey, snapshot: RepositorySnapshot) -> Result<()> {
        let snapshot = Arc::new(snapshot);
        self.entries.write().await.insert(key.clone(), snapshot);
        Ok(())
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<RepositorySnapshot>> {
        let entry = self.entries.read().await.get(key).cloned();
        Ok(entry.map(|snapshot| (*snapshot).clone()))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
