//! HTTP repository manager
//!
//! Reads the repository index published by the source controller as the
//! `HelmRepository` artifact, and downloads chart archives listed in it.

use async_trait::async_trait;
use chartwatch_core::{ChartProfile, ChartReference, ObjectKey};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

use crate::archive::{read_chart_file, verify_digest};
use crate::error::{RepoError, Result};
use crate::index::RepositoryIndex;
use crate::manager::{ChartRepoManager, DiscoveryConfig, RepositoryRef};

/// Index parsed from one artifact revision
struct CachedIndex {
    artifact: String,
    index: Arc<RepositoryIndex>,
}

/// Repository manager backed by plain HTTP
pub struct HttpRepoManager {
    client: reqwest::Client,
    /// Request timeout the client was built with, if known
    timeout: Option<Duration>,
    /// Last parsed index per repository
    indexes: RwLock<HashMap<ObjectKey, CachedIndex>>,
}

impl HttpRepoManager {
    /// Create a manager whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("chartwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RepoError::NetworkError {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            timeout: Some(timeout),
            ..Self::with_client(client)
        })
    }

    /// Create with an existing client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the index of a repository, reusing the parsed copy while the
    /// artifact revision is unchanged
    pub async fn index(&self, repo: &RepositoryRef) -> Result<Arc<RepositoryIndex>> {
        let url = repo.require_artifact()?;
        let artifact = format!(
            "{}@{}",
            url,
            repo.artifact_revision.as_deref().unwrap_or_default()
        );

        {
            let indexes = self.indexes.read().await;
            if let Some(cached) = indexes.get(&repo.key) {
                if cached.artifact == artifact {
                    return Ok(cached.index.clone());
                }
            }
        }

        tracing::debug!(repository = %repo.key, url, "fetching repository index");
        let data = self.fetch(url).await.map_err(|e| match e {
            RepoError::HttpError { status: 404, .. } => RepoError::IndexNotFound {
                url: url.to_string(),
            },
            other => other,
        })?;
        let index = Arc::new(RepositoryIndex::from_bytes(&data)?);

        self.indexes.write().await.insert(
            repo.key.clone(),
            CachedIndex {
                artifact,
                index: index.clone(),
            },
        );

        Ok(index)
    }

    /// Number of memoized indexes
    pub async fn indexed(&self) -> usize {
        self.indexes.read().await.len()
    }

    fn request_error(&self, e: reqwest::Error) -> RepoError {
        match self.timeout {
            Some(timeout) if e.is_timeout() => RepoError::Timeout {
                seconds: timeout.as_secs(),
            },
            _ => e.into(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;
        let status = response.status();

        if !status.is_success() {
            return Err(RepoError::HttpError {
                status: status.as_u16(),
                message: format!("GET {} returned {}", url, status),
            });
        }

        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        Ok(body.to_vec())
    }
}

/// Resolve a chart URL from the index against the repository URL
fn resolve_chart_url(repo_url: &str, chart_url: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(chart_url) {
        return Ok(absolute);
    }

    let base = if repo_url.ends_with('/') {
        repo_url.to_string()
    } else {
        format!("{}/", repo_url)
    };

    let base = Url::parse(&base).map_err(|e| RepoError::InvalidRepositoryUrl {
        url: repo_url.to_string(),
        reason: e.to_string(),
    })?;

    Ok(base.join(chart_url)?)
}

#[async_trait]
impl ChartRepoManager for HttpRepoManager {
    async fn list_charts(
        &self,
        repo: &RepositoryRef,
        discovery: &DiscoveryConfig,
    ) -> Result<Vec<ChartProfile>> {
        let index = self.index(repo).await?;
        Ok(index.profiles(discovery, &repo.key))
    }

    async fn get_values(
        &self,
        repo: &RepositoryRef,
        chart: &ChartReference,
        values_file: &str,
    ) -> Result<Vec<u8>> {
        let index = self.index(repo).await?;

        if index.get(&chart.chart).is_none() {
            return Err(RepoError::ChartNotFound {
                name: chart.chart.clone(),
                repo: repo.key.to_string(),
            });
        }

        let entry = index
            .get_version(&chart.chart, &chart.version)
            .ok_or_else(|| RepoError::VersionNotFound {
                name: chart.chart.clone(),
                version: chart.version.clone(),
                repo: repo.key.to_string(),
            })?;

        let download_url = entry.download_url().ok_or_else(|| RepoError::Other(format!(
            "No download URL for {} in repository {}",
            chart, repo.key
        )))?;
        let url = resolve_chart_url(&repo.url, download_url)?;

        tracing::debug!(repository = %repo.key, chart = %chart, %url, "downloading chart");
        let data = self.fetch(url.as_str()).await?;

        if let Some(digest) = entry.digest.as_deref().filter(|d| !d.is_empty()) {
            verify_digest(&chart.chart, &data, digest)?;
        }

        read_chart_file(&data, &chart.chart, values_file)
    }

    async fn forget(&self, key: &ObjectKey) {
        self.indexes.write().await.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::build_archive;
    use sha2::{Digest, Sha256};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn index_yaml(digest: &str) -> String {
        format!(
            r#"
apiVersion: v1
entries:
  podinfo:
    - name: podinfo
      version: "6.1.0"
      annotations:
        weave.works/profile: podinfo
      urls:
        - charts/podinfo-6.1.0.tgz
      digest: "{digest}"
  plain:
    - name: plain
      version: "1.0.0"
      urls:
        - charts/plain-1.0.0.tgz
"#
        )
    }

    fn repo(server: &MockServer, revision: &str) -> RepositoryRef {
        RepositoryRef::new(ObjectKey::new("flux-system", "weaveworks"), server.uri())
            .with_artifact(format!("{}/artifact/index.yaml", server.uri()), revision)
    }

    async fn serve(server: &MockServer, archive: &[u8], digest: &str) {
        Mock::given(method("GET"))
            .and(path("/artifact/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index_yaml(digest)))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/charts/podinfo-6.1.0.tgz"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive.to_vec()))
            .mount(server)
            .await;
    }

    #[test]
    fn test_resolve_chart_url() {
        let url = resolve_chart_url("https://charts.example.com/stable", "podinfo-1.0.0.tgz").unwrap();
        assert_eq!(url.as_str(), "https://charts.example.com/stable/podinfo-1.0.0.tgz");

        let url = resolve_chart_url(
            "https://charts.example.com",
            "https://cdn.example.com/podinfo-1.0.0.tgz",
        )
        .unwrap();
        assert_eq!(url.as_str(), "https://cdn.example.com/podinfo-1.0.0.tgz");
    }

    #[tokio::test]
    async fn test_list_charts_filters_profiles() {
        let server = MockServer::start().await;
        serve(&server, b"", "").await;

        let manager = HttpRepoManager::new(Duration::from_secs(5)).unwrap();
        let profiles = manager
            .list_charts(&repo(&server, "sha256:1"), &DiscoveryConfig::profiles())
            .await
            .unwrap();

        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].name, "podinfo");
        assert_eq!(profiles[0].available_versions, vec!["6.1.0"]);
    }

    #[tokio::test]
    async fn test_get_values_from_archive() {
        let server = MockServer::start().await;
        let archive = build_archive(&[
            ("podinfo/Chart.yaml", b"name: podinfo\n"),
            ("podinfo/values.yaml", b"replicaCount: 2\n"),
        ]);
        let digest = hex::encode(Sha256::digest(&archive));
        serve(&server, &archive, &digest).await;

        let manager = HttpRepoManager::new(Duration::from_secs(5)).unwrap();
        let values = manager
            .get_values(
                &repo(&server, "sha256:1"),
                &ChartReference::new("podinfo", "6.1.0"),
                "values.yaml",
            )
            .await
            .unwrap();

        assert_eq!(values, b"replicaCount: 2\n");
    }

    #[tokio::test]
    async fn test_get_values_digest_mismatch() {
        let server = MockServer::start().await;
        let archive = build_archive(&[("podinfo/values.yaml", b"a: 1\n")]);
        serve(&server, &archive, "0000").await;

        let manager = HttpRepoManager::new(Duration::from_secs(5)).unwrap();
        let result = manager
            .get_values(
                &repo(&server, "sha256:1"),
                &ChartReference::new("podinfo", "6.1.0"),
                "values.yaml",
            )
            .await;

        assert!(matches!(result, Err(RepoError::IntegrityCheckFailed { .. })));
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let server = MockServer::start().await;
        serve(&server, b"", "").await;

        let manager = HttpRepoManager::new(Duration::from_secs(5)).unwrap();
        let result = manager
            .get_values(
                &repo(&server, "sha256:1"),
                &ChartReference::new("podinfo", "0.0.1"),
                "values.yaml",
            )
            .await;
        assert!(matches!(result, Err(RepoError::VersionNotFound { .. })));

        let result = manager
            .get_values(
                &repo(&server, "sha256:1"),
                &ChartReference::new("missing", "1.0.0"),
                "values.yaml",
            )
            .await;
        assert!(matches!(result, Err(RepoError::ChartNotFound { .. })));
    }

    #[tokio::test]
    async fn test_index_is_reused_per_revision() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifact/index.yaml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index_yaml("")))
            .expect(2)
            .mount(&server)
            .await;

        let manager = HttpRepoManager::new(Duration::from_secs(5)).unwrap();
        let discovery = DiscoveryConfig::profiles();

        manager.list_charts(&repo(&server, "sha256:1"), &discovery).await.unwrap();
        manager.list_charts(&repo(&server, "sha256:1"), &discovery).await.unwrap();
        manager.list_charts(&repo(&server, "sha256:2"), &discovery).await.unwrap();
        // expectation of exactly two fetches is verified when the server drops
    }

    #[tokio::test]
    async fn test_missing_index() {
        let server = MockServer::start().await;
        let manager = HttpRepoManager::new(Duration::from_secs(5)).unwrap();

        let result = manager
            .list_charts(&repo(&server, "sha256:1"), &DiscoveryConfig::profiles())
            .await;
        assert!(matches!(result, Err(RepoError::IndexNotFound { .. })));
    }

    #[tokio::test]
    async fn test_forget_drops_index() {
        let server = MockServer::start().await;
        serve(&server, b"", "").await;

        let manager = HttpRepoManager::new(Duration::from_secs(5)).unwrap();
        let repo = repo(&server, "sha256:1");
        manager.list_charts(&repo, &DiscoveryConfig::profiles()).await.unwrap();
        assert_eq!(manager.indexed().await, 1);

        manager.forget(&repo.key).await;
        assert_eq!(manager.indexed().await, 0);
    }

    #[tokio::test]
    async fn test_timeout_reports_configured_duration() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/artifact/index.yaml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(index_yaml(""))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let manager = HttpRepoManager::new(Duration::from_secs(1)).unwrap();
        let result = manager
            .list_charts(&repo(&server, "sha256:1"), &DiscoveryConfig::profiles())
            .await;

        assert!(matches!(result, Err(RepoError::Timeout { seconds: 1 })));
    }
}
