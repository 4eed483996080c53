//! Repository index types
//!
//! Helm-compatible `index.yaml` format, plus the conversion from index
//! entries to chart profiles.

use chrono::{DateTime, Utc};
use chartwatch_core::{ChartProfile, Maintainer, ObjectKey, sort_versions};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{RepoError, Result};
use crate::manager::DiscoveryConfig;

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryIndex {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// When this index was generated
    #[serde(default)]
    pub generated: Option<DateTime<Utc>>,

    /// Charts indexed by name
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartEntry>>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl RepositoryIndex {
    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::IndexParseError {
            message: e.to_string(),
        })
    }

    /// Parse index from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let yaml = std::str::from_utf8(bytes).map_err(|e| RepoError::IndexParseError {
            message: format!("Invalid UTF-8: {}", e),
        })?;
        Self::from_yaml(yaml)
    }

    /// Get all versions of a chart
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    /// Get a specific version of a chart
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }

    /// Build the profiles of this index
    ///
    /// Only versions accepted by `discovery` are listed. Profile metadata is
    /// taken from the newest accepted version, and charts with no accepted
    /// version are left out. Profiles are ordered by name.
    pub fn profiles(&self, discovery: &DiscoveryConfig, repository: &ObjectKey) -> Vec<ChartProfile> {
        let mut profiles: Vec<ChartProfile> = self
            .entries
            .iter()
            .filter_map(|(name, entries)| {
                let accepted: Vec<&ChartEntry> =
                    entries.iter().filter(|e| discovery.accepts(e)).collect();

                let newest = accepted.iter().copied().max_by(|a, b| {
                    match (a.parsed_version(), b.parsed_version()) {
                        (Some(va), Some(vb)) => va.cmp(&vb),
                        (Some(_), None) => std::cmp::Ordering::Greater,
                        (None, Some(_)) => std::cmp::Ordering::Less,
                        (None, None) => b.version.cmp(&a.version),
                    }
                })?;

                let mut versions: Vec<String> =
                    accepted.iter().map(|e| e.version.clone()).collect();
                sort_versions(&mut versions);
                versions.dedup();

                Some(ChartProfile {
                    name: name.clone(),
                    description: newest.description.clone(),
                    home: newest.home.clone(),
                    icon: newest.icon.clone(),
                    sources: newest.sources.clone(),
                    keywords: newest.keywords.clone(),
                    maintainers: newest.maintainers.clone(),
                    annotations: newest.annotations.clone(),
                    kube_version: newest.kube_version.clone(),
                    repository: Some(repository.clone()),
                    available_versions: versions,
                })
            })
            .collect();

        profiles.sort_by(|a, b| a.name.cmp(&b.name));
        profiles
    }
}

/// Chart version entry in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    /// Chart name
    pub name: String,

    /// Chart version (semver)
    pub version: String,

    /// Application version
    #[serde(default)]
    pub app_version: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    /// Home URL
    #[serde(default)]
    pub home: Option<String>,

    /// Icon URL
    #[serde(default)]
    pub icon: Option<String>,

    /// Source URLs
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub maintainers: Vec<Maintainer>,

    /// URLs to download the chart archive
    #[serde(default)]
    pub urls: Vec<String>,

    /// SHA256 digest of the archive
    #[serde(default)]
    pub digest: Option<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    /// Supported Kubernetes versions
    #[serde(default)]
    pub kube_version: Option<String>,
}

impl ChartEntry {
    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    /// Parse version as semver
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_index() -> RepositoryIndex {
        let yaml = r#"
apiVersion: v1
generated: "2024-01-01T00:00:00Z"
entries:
  podinfo:
    - name: podinfo
      version: "6.1.0"
      description: Podinfo Helm chart for Kubernetes
      annotations:
        weave.works/profile: podinfo-profile
      urls:
        - podinfo-6.1.0.tgz
      digest: "abc123"
    - name: podinfo
      version: "6.0.0"
      description: Older podinfo
      annotations:
        weave.works/profile: podinfo-profile
      urls:
        - podinfo-6.0.0.tgz
    - name: podinfo
      version: "5.0.0"
      urls:
        - podinfo-5.0.0.tgz
  redis:
    - name: redis
      version: "17.0.0"
      description: Redis database
      urls:
        - https://example.com/charts/redis-17.0.0.tgz
"#;
        RepositoryIndex::from_yaml(yaml).unwrap()
    }

    fn repo_key() -> ObjectKey {
        ObjectKey::new("flux-system", "weaveworks")
    }

    #[test]
    fn test_parse_index() {
        let index = sample_index();
        assert_eq!(index.entries.len(), 2);
        assert!(index.generated.is_some());
        assert_eq!(index.get("podinfo").unwrap().len(), 3);
    }

    #[test]
    fn test_get_version() {
        let index = sample_index();
        let entry = index.get_version("podinfo", "6.1.0").unwrap();
        assert_eq!(entry.download_url(), Some("podinfo-6.1.0.tgz"));
        assert_eq!(entry.digest.as_deref(), Some("abc123"));
        assert!(index.get_version("podinfo", "9.9.9").is_none());
    }

    #[test]
    fn test_profiles_filter_by_annotation() {
        let index = sample_index();
        let profiles = index.profiles(&DiscoveryConfig::profiles(), &repo_key());

        assert_eq!(profiles.len(), 1);
        let podinfo = &profiles[0];
        assert_eq!(podinfo.name, "podinfo");
        assert_eq!(podinfo.available_versions, vec!["6.1.0", "6.0.0"]);
        assert_eq!(
            podinfo.description.as_deref(),
            Some("Podinfo Helm chart for Kubernetes")
        );
        assert_eq!(podinfo.repository, Some(repo_key()));
    }

    #[test]
    fn test_profiles_without_filter() {
        let index = sample_index();
        let profiles = index.profiles(&DiscoveryConfig::all(), &repo_key());

        let names: Vec<_> = profiles.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["podinfo", "redis"]);
        assert_eq!(profiles[0].available_versions, vec!["6.1.0", "6.0.0", "5.0.0"]);
    }

    #[test]
    fn test_invalid_index() {
        let result = RepositoryIndex::from_yaml("entries: [not, a, map]");
        assert!(matches!(result, Err(RepoError::IndexParseError { .. })));
    }
}
