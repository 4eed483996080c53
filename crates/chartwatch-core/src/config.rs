//! Controller configuration
//!
//! Loaded from `~/.config/chartwatch/config.yaml` (or an explicit path);
//! every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CoreError, Result};

/// Annotation that marks a chart as a profile
pub const PROFILE_ANNOTATION: &str = "weave.works/profile";

/// Values file read from every chart version
pub const VALUES_FILE_NAME: &str = "values.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatcherConfig {
    /// Values file fetched for each chart version
    #[serde(default = "default_values_file_name")]
    pub values_file_name: String,

    /// Index annotation that selects profile charts
    #[serde(default = "default_profile_annotation")]
    pub profile_annotation: String,

    /// Upper bound for a single repository refresh
    #[serde(default = "default_refresh_timeout", with = "humantime_serde")]
    pub refresh_timeout: Duration,

    /// Reconciles allowed to run at once across all keys
    #[serde(default = "default_max_concurrent_reconciles")]
    pub max_concurrent_reconciles: usize,

    /// Delay before a failed reconcile is retried
    #[serde(default = "default_retry_backoff", with = "humantime_serde")]
    pub retry_backoff: Duration,

    /// Attempts before a failing reconcile is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Namespace to watch (all namespaces when unset)
    #[serde(default)]
    pub watch_namespace: Option<String>,

    /// Timeout for repository HTTP requests
    #[serde(default = "default_http_timeout", with = "humantime_serde")]
    pub http_timeout: Duration,

    #[serde(default)]
    pub cache: CacheBackend,
}

fn default_values_file_name() -> String {
    VALUES_FILE_NAME.to_string()
}

fn default_profile_annotation() -> String {
    PROFILE_ANNOTATION.to_string()
}

fn default_refresh_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_max_concurrent_reconciles() -> usize {
    4
}

fn default_retry_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_max_retries() -> u32 {
    5
}

fn default_http_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            values_file_name: default_values_file_name(),
            profile_annotation: default_profile_annotation(),
            refresh_timeout: default_refresh_timeout(),
            max_concurrent_reconciles: default_max_concurrent_reconciles(),
            retry_backoff: default_retry_backoff(),
            max_retries: default_max_retries(),
            watch_namespace: None,
            http_timeout: default_http_timeout(),
            cache: CacheBackend::default(),
        }
    }
}

/// Where repository snapshots are kept
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "camelCase")]
pub enum CacheBackend {
    /// Process memory, lost on restart
    #[default]
    Memory,

    /// SQLite database on disk
    Sqlite {
        /// Database file (defaults to the user cache directory)
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl CacheBackend {
    /// Default on-disk location of the SQLite cache
    pub fn default_sqlite_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine cache directory".to_string(),
        })?;
        Ok(cache_dir.join("chartwatch").join("profiles.db"))
    }
}

impl WatcherConfig {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Get default configuration path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().ok_or_else(|| CoreError::InvalidConfig {
            message: "Could not determine config directory".to_string(),
        })?;
        Ok(config_dir.join("chartwatch").join("config.yaml"))
    }

    fn validate(&self) -> Result<()> {
        if self.max_concurrent_reconciles == 0 {
            return Err(CoreError::InvalidConfig {
                message: "maxConcurrentReconciles must be at least 1".to_string(),
            });
        }
        if self.values_file_name.trim().is_empty() {
            return Err(CoreError::InvalidConfig {
                message: "valuesFileName must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
