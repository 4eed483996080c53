//! Chartwatch Repository Access
//!
//! This crate provides everything the profile watcher needs from a Helm
//! repository, and the cache the results are kept in:
//!
//! - **Repository manager**: list profile charts and fetch values files
//! - **HTTP backend**: reads the index published by the source controller
//! - **Profile cache**: in-memory or SQLite storage of repository snapshots
//!
//! ## Example
//!
//! ```rust,no_run
//! use chartwatch_core::{ChartReference, ObjectKey};
//! use chartwatch_repo::{ChartRepoManager, DiscoveryConfig, HttpRepoManager, RepositoryRef};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = HttpRepoManager::new(std::time::Duration::from_secs(30))?;
//! let repo = RepositoryRef::new(ObjectKey::new("flux-system", "weaveworks"), "https://charts.example.com")
//!     .with_artifact("http://source-controller/helmrepository/flux-system/weaveworks/index.yaml", "sha256:abc");
//!
//! let profiles = manager.list_charts(&repo, &DiscoveryConfig::profiles()).await?;
//! for profile in &profiles {
//!     for reference in profile.references() {
//!         let values = manager.get_values(&repo, &reference, "values.yaml").await?;
//!         println!("{} -> {} bytes", reference, values.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod cache;
pub mod error;
pub mod http;
pub mod index;
pub mod manager;
pub mod mock;

// Re-exports for convenience
pub use cache::{MemoryCache, ProfileCache, SqliteCache};
pub use error::{RepoError, Result};
pub use http::HttpRepoManager;
pub use index::{ChartEntry, RepositoryIndex};
pub use manager::{ChartRepoManager, DiscoveryConfig, RepositoryRef};
pub use mock::{MockCallCounts, MockRepoManager};
