//! Cached repository snapshots

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::profile::{ChartProfile, ChartReference};

/// chart name -> version -> raw values file
pub type ValueMap = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// Everything cached for one repository after a refresh
///
/// A snapshot is always replaced as a whole; it is never merged with an
/// older one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositorySnapshot {
    /// Profiles as listed by the repository manager
    pub profiles: Vec<ChartProfile>,

    /// Values payloads that were fetched successfully
    #[serde(default)]
    pub values: ValueMap,

    /// Versions whose values could not be fetched during the refresh
    #[serde(default)]
    pub unavailable: Vec<ChartReference>,
}

/// Lookup result for a single chart version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionValues<'a> {
    /// Values were fetched
    Available(&'a [u8]),
    /// A fetch was attempted and failed
    Unavailable,
    /// The version was not part of the refresh
    Unknown,
}

impl RepositorySnapshot {
    pub fn new(profiles: Vec<ChartProfile>) -> Self {
        Self {
            profiles,
            ..Default::default()
        }
    }

    /// Store the values payload of a chart version
    pub fn insert_values(&mut self, reference: &ChartReference, payload: Vec<u8>) {
        self.values
            .entry(reference.chart.clone())
            .or_default()
            .insert(reference.version.clone(), payload);
    }

    /// Record a version whose values could not be fetched
    pub fn mark_unavailable(&mut self, reference: ChartReference) {
        self.unavailable.push(reference);
    }

    pub fn values_for(&self, chart: &str, version: &str) -> VersionValues<'_> {
        if let Some(payload) = self.values.get(chart).and_then(|v| v.get(version)) {
            return VersionValues::Available(payload);
        }

        if self
            .unavailable
            .iter()
            .any(|r| r.chart == chart && r.version == version)
        {
            VersionValues::Unavailable
        } else {
            VersionValues::Unknown
        }
    }

    pub fn profile(&self, chart: &str) -> Option<&ChartProfile> {
        self.profiles.iter().find(|p| p.name == chart)
    }

    /// Number of cached values payloads
    pub fn value_count(&self) -> usize {
        self.values.values().map(BTreeMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str, versions: &[&str]) -> ChartProfile {
        ChartProfile {
            name: name.to_string(),
            available_versions: versions.iter().map(|v| v.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_values_for_all_versions_of_a_chart() {
        let mut snapshot = RepositorySnapshot::new(vec![profile("podinfo", &["6.1.0", "6.0.0"])]);
        snapshot.insert_values(&ChartReference::new("podinfo", "6.1.0"), b"a: 1".to_vec());
        snapshot.insert_values(&ChartReference::new("podinfo", "6.0.0"), b"a: 0".to_vec());

        assert_eq!(snapshot.value_count(), 2);
        assert_eq!(
            snapshot.values_for("podinfo", "6.1.0"),
            VersionValues::Available(b"a: 1")
        );
        assert_eq!(
            snapshot.values_for("podinfo", "6.0.0"),
            VersionValues::Available(b"a: 0")
        );
    }

    #[test]
    fn test_unavailable_versions_are_distinguished() {
        let mut snapshot = RepositorySnapshot::new(vec![profile("podinfo", &["6.1.0", "6.0.0"])]);
        snapshot.insert_values(&ChartReference::new("podinfo", "6.1.0"), b"a: 1".to_vec());
        snapshot.mark_unavailable(ChartReference::new("podinfo", "6.0.0"));

        assert_eq!(
            snapshot.values_for("podinfo", "6.0.0"),
            VersionValues::Unavailable
        );
        assert_eq!(snapshot.values_for("podinfo", "5.0.0"), VersionValues::Unknown);
        assert_eq!(snapshot.values_for("nginx", "1.0.0"), VersionValues::Unknown);
    }

    #[test]
    fn test_serde_roundtrip_keeps_unavailable() {
        let mut snapshot = RepositorySnapshot::new(vec![profile("podinfo", &["6.0.0"])]);
        snapshot.mark_unavailable(ChartReference::new("podinfo", "6.0.0"));

        let json = serde_json::to_string(&snapshot).unwrap();
        let back: RepositorySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert!(snapshot.profile("podinfo").is_some());
    }
}
