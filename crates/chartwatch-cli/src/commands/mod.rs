//! CLI command implementations

pub mod inventory;
pub mod profiles;
pub mod watch;

use chartwatch_core::{CacheBackend, WatcherConfig};
use chartwatch_repo::{MemoryCache, ProfileCache, SqliteCache};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::Result;

/// Load the configuration from `path`, or the default location
pub fn load_config(path: Option<&Path>) -> Result<WatcherConfig> {
    let config = match path {
        Some(path) => WatcherConfig::load_from(path)?,
        None => WatcherConfig::load()?,
    };
    debug!(?config, "configuration loaded");
    Ok(config)
}

/// Open the profile cache selected by the configuration
pub fn open_cache(config: &WatcherConfig) -> Result<Arc<dyn ProfileCache>> {
    match &config.cache {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        CacheBackend::Sqlite { path } => {
            let path = match path {
                Some(path) => path.clone(),
                None => CacheBackend::default_sqlite_path()?,
            };
            debug!(path = %path.display(), "opening sqlite cache");
            Ok(Arc::new(SqliteCache::open_at(&path)?))
        }
    }
}
