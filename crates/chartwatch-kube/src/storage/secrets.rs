//! Secret-backed record store

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::Client;
use kube::api::Api;

use super::{RecordStore, StoredRecord};
use crate::error::{KubeError, Result};

/// Reads Helm storage records from Kubernetes Secrets
#[derive(Clone)]
pub struct SecretRecordStore {
    client: Client,
}

impl SecretRecordStore {
    /// Create a store using the default client configuration
    pub async fn new() -> Result<Self> {
        let client = Client::try_default().await?;
        Ok(Self { client })
    }

    /// Create with an existing client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    fn secrets_api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Convert a Secret into a record; `stringData` is ignored since the API never returns it
pub(crate) fn record_from_secret(namespace: &str, name: &str, secret: Secret) -> StoredRecord {
    let mut record = StoredRecord::new(namespace, name);
    for (key, value) in secret.data.unwrap_or_default() {
        record.data.insert(key, value.0);
    }
    record
}

#[async_trait]
impl RecordStore for SecretRecordStore {
    async fn get_record(&self, namespace: &str, name: &str) -> Result<StoredRecord> {
        match self.secrets_api(namespace).get(name).await {
            Ok(secret) => Ok(record_from_secret(namespace, name, secret)),
            Err(kube::Error::Api(e)) if e.code == 404 => Err(KubeError::RecordNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    #[test]
    fn test_record_from_secret() {
        let secret = Secret {
            data: Some(BTreeMap::from([(
                "release".to_string(),
                ByteString(b"H4sIAAAA".to_vec()),
            )])),
            ..Default::default()
        };

        let record = record_from_secret("apps", "sh.helm.release.v1.podinfo.v1", secret);
        assert_eq!(record.namespace, "apps");
        assert_eq!(record.release_data(), Some(b"H4sIAAAA".as_slice()));
    }

    #[test]
    fn test_secret_without_data() {
        let record = record_from_secret("apps", "x", Secret::default());
        assert!(record.release_data().is_none());
    }
}
