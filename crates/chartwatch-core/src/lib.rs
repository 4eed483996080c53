//! Chartwatch Core - shared types for the chartwatch controller
//!
//! This crate provides the foundational types used throughout chartwatch:
//! - `ObjectKey`: namespace/name identity of a watched resource
//! - `ChartProfile`: an installable chart discovered in a repository
//! - `RepositorySnapshot`: the cached profiles and values of one repository
//! - `ResourceKind`: group/version/kind identifiers for release inventories
//! - `WatcherConfig`: controller configuration

pub mod config;
pub mod error;
pub mod key;
pub mod kind;
pub mod profile;
pub mod snapshot;

pub use config::{CacheBackend, WatcherConfig};
pub use error::{CoreError, Result};
pub use key::ObjectKey;
pub use kind::ResourceKind;
pub use profile::{ChartProfile, ChartReference, Maintainer, sort_versions};
pub use snapshot::{RepositorySnapshot, ValueMap, VersionValues};
