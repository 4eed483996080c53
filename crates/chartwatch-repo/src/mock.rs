//! Mock repository manager for testing
//!
//! Serves profiles and values from memory, with switches to make listing or
//! individual values fetches fail, so refresh logic can be tested without a
//! chart repository.

use async_trait::async_trait;
use chartwatch_core::{ChartProfile, ChartReference, ObjectKey};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{RepoError, Result};
use crate::manager::{ChartRepoManager, DiscoveryConfig, RepositoryRef};

/// In-memory repository manager for testing
#[derive(Clone, Default)]
pub struct MockRepoManager {
    state: Arc<RwLock<MockState>>,
    /// Track calls for assertions
    calls: Arc<RwLock<MockCallCounts>>,
}

#[derive(Default)]
struct MockState {
    profiles: Vec<ChartProfile>,
    values: HashMap<ChartReference, Vec<u8>>,
    failing: HashSet<ChartReference>,
    list_failure: Option<String>,
    delay: Option<Duration>,
}

/// Counts of calls performed for testing assertions
#[derive(Debug, Default, Clone)]
pub struct MockCallCounts {
    pub list_charts: usize,
    pub get_values: usize,
    pub forget: usize,
}

impl MockRepoManager {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the listed profiles
    pub fn set_profiles(&self, profiles: Vec<ChartProfile>) {
        self.state.write().unwrap().profiles = profiles;
    }

    /// Serve `payload` as the values of a chart version
    pub fn set_values(&self, chart: &str, version: &str, payload: &[u8]) {
        self.state
            .write()
            .unwrap()
            .values
            .insert(ChartReference::new(chart, version), payload.to_vec());
    }

    /// Make the values fetch of one chart version fail
    pub fn fail_values(&self, chart: &str, version: &str) {
        self.state
            .write()
            .unwrap()
            .failing
            .insert(ChartReference::new(chart, version));
    }

    /// Make `list_charts` fail (or succeed again with `None`)
    pub fn fail_listing(&self, message: Option<&str>) {
        self.state.write().unwrap().list_failure = message.map(String::from);
    }

    /// Delay every call, to simulate a slow repository
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().delay = delay;
    }

    /// Get call counts for assertions
    pub fn call_counts(&self) -> MockCallCounts {
        self.calls.read().unwrap().clone()
    }

    fn delay(&self) -> Option<Duration> {
        self.state.read().unwrap().delay
    }
}

#[async_trait]
impl ChartRepoManager for MockRepoManager {
    async fn list_charts(
        &self,
        repo: &RepositoryRef,
        _discovery: &DiscoveryConfig,
    ) -> Result<Vec<ChartProfile>> {
        self.calls.write().unwrap().list_charts += 1;

        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.read().unwrap();
        if let Some(message) = &state.list_failure {
            return Err(RepoError::NetworkError {
                message: format!("{}: {}", repo.key, message),
            });
        }
        Ok(state.profiles.clone())
    }

    async fn get_values(
        &self,
        repo: &RepositoryRef,
        chart: &ChartReference,
        values_file: &str,
    ) -> Result<Vec<u8>> {
        self.calls.write().unwrap().get_values += 1;

        if let Some(delay) = self.delay() {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.read().unwrap();
        if state.failing.contains(chart) {
            return Err(RepoError::HttpError {
                status: 500,
                message: format!("failed to download {} from {}", chart, repo.key),
            });
        }

        state
            .values
            .get(chart)
            .cloned()
            .ok_or_else(|| RepoError::ValuesFileNotFound {
                chart: chart.to_string(),
                file: values_file.to_string(),
            })
    }

    async fn forget(&self, _key: &ObjectKey) {
        self.calls.write().unwrap().forget += 1;
    }
}
