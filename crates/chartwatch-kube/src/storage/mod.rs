//! Helm release storage records
//!
//! Helm keeps one Secret per release revision, named
//! `sh.helm.release.v1.<release>.v<revision>`. Its `release` entry holds
//! base64 text of the (usually gzip-compressed) JSON release record.
//!
//! Only the parts needed to recover the applied manifest are decoded.

mod mock;
mod secrets;

pub use mock::{MockRecordStore, RecordLookups};
pub use secrets::SecretRecordStore;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};

use crate::error::{KubeError, Result};

/// Prefix of Helm v3 storage record names
pub const STORAGE_PREFIX: &str = "sh.helm.release.v1";

/// Data key holding the encoded release record
pub const RELEASE_DATA_KEY: &str = "release";

/// Leading bytes of a gzip stream
pub const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Name of the storage record of a release revision
pub fn storage_record_name(release: &str, revision: i64) -> String {
    format!("{STORAGE_PREFIX}.{release}.v{revision}")
}

/// The subset of a Helm release record chartwatch reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,

    /// Rendered manifest applied by this revision
    #[serde(default)]
    pub manifest: String,
}

/// A storage record as returned by a [`RecordStore`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredRecord {
    pub namespace: String,
    pub name: String,
    /// Raw data entries, already unwrapped from the API transport encoding
    pub data: BTreeMap<String, Vec<u8>>,
}

impl StoredRecord {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// The encoded release record
    pub fn release_data(&self) -> Option<&[u8]> {
        self.data.get(RELEASE_DATA_KEY).map(Vec::as_slice)
    }
}

/// Read access to Helm storage records
///
/// Implementations must be Send + Sync for use across async tasks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record by namespace and name, `RecordNotFound` when absent
    async fn get_record(&self, namespace: &str, name: &str) -> Result<StoredRecord>;
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    async fn get_record(&self, namespace: &str, name: &str) -> Result<StoredRecord> {
        (**self).get_record(namespace, name).await
    }
}

fn corrupt(release: &str, message: impl Into<String>) -> KubeError {
    KubeError::CorruptStorageRecord {
        release: release.to_string(),
        message: message.into(),
    }
}

/// Decode a stored release record (base64, optional gzip, JSON)
#[must_use = "decoded record should be used"]
pub fn decode_release_record(raw: &[u8], release: &str) -> Result<ReleaseRecord> {
    let decoded = STANDARD
        .decode(raw.trim_ascii())
        .map_err(|e| corrupt(release, format!("base64 decode error: {e}")))?;

    let json = if decoded.starts_with(&GZIP_MAGIC) {
        let mut decoder = flate2::read::GzDecoder::new(decoded.as_slice());
        let mut inflated = Vec::new();
        decoder
            .read_to_end(&mut inflated)
            .map_err(|e| corrupt(release, format!("gzip decode error: {e}")))?;
        inflated
    } else {
        decoded
    };

    serde_json::from_slice(&json).map_err(|e| corrupt(release, format!("invalid release record: {e}")))
}

/// Decode a stored release record and return its manifest
#[must_use = "decoded manifest should be used"]
pub fn decode_release_manifest(raw: &[u8], release: &str) -> Result<String> {
    decode_release_record(raw, release).map(|record| record.manifest)
}

/// Encode a release record the way Helm stores it (JSON, optional gzip, base64)
#[must_use = "encoded data should be used for storage"]
pub fn encode_release_record(record: &ReleaseRecord, compress: bool) -> Result<String> {
    let json = serde_json::to_vec(record)?;
    let payload = if compress {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&json)
            .map_err(|e| KubeError::Serialization(e.to_string()))?;
        encoder
            .finish()
            .map_err(|e| KubeError::Serialization(e.to_string()))?
    } else {
        json
    };
    Ok(STANDARD.encode(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(manifest: &str) -> ReleaseRecord {
        ReleaseRecord {
            name: "podinfo".to_string(),
            namespace: Some("apps".to_string()),
            version: Some(2),
            manifest: manifest.to_string(),
        }
    }

    #[test]
    fn test_storage_record_name() {
        assert_eq!(storage_record_name("podinfo", 3), "sh.helm.release.v1.podinfo.v3");
    }

    #[test]
    fn test_gzip_roundtrip_preserves_manifest() {
        let manifest = "---\n# Source: podinfo/templates/svc.yaml\napiVersion: v1\nkind: Service\nmetadata:\n  name: podinfo\n";
        let encoded = encode_release_record(&record(manifest), true).unwrap();

        let raw = STANDARD.decode(&encoded).unwrap();
        assert!(raw.starts_with(&GZIP_MAGIC));

        let decoded = decode_release_manifest(encoded.as_bytes(), "apps/podinfo").unwrap();
        assert_eq!(decoded, manifest);
    }

    #[test]
    fn test_uncompressed_record() {
        let encoded = encode_release_record(&record("kind: ConfigMap"), false).unwrap();
        let decoded = decode_release_record(encoded.as_bytes(), "apps/podinfo").unwrap();
        assert_eq!(decoded, record("kind: ConfigMap"));
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let encoded = encode_release_record(&record("kind: ConfigMap"), true).unwrap();
        let padded = format!("  {encoded}\n");
        assert_eq!(
            decode_release_manifest(padded.as_bytes(), "apps/podinfo").unwrap(),
            "kind: ConfigMap"
        );
    }

    #[test]
    fn test_missing_manifest_is_empty() {
        let encoded = STANDARD.encode(br#"{"name":"podinfo"}"#);
        assert_eq!(decode_release_manifest(encoded.as_bytes(), "apps/podinfo").unwrap(), "");
    }

    #[test]
    fn test_bad_base64() {
        let err = decode_release_manifest(b"not base64 !!!", "apps/podinfo").unwrap_err();
        match err {
            KubeError::CorruptStorageRecord { release, .. } => assert_eq!(release, "apps/podinfo"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_truncated_gzip() {
        let mut compressed = STANDARD
            .decode(encode_release_record(&record("kind: ConfigMap"), true).unwrap())
            .unwrap();
        compressed.truncate(12);
        let err = decode_release_manifest(STANDARD.encode(compressed).as_bytes(), "apps/podinfo")
            .unwrap_err();
        assert!(matches!(err, KubeError::CorruptStorageRecord { .. }));
    }

    #[test]
    fn test_short_payload_is_not_gzip() {
        // two bytes of the magic followed by nothing: parsed as JSON and rejected
        let err = decode_release_manifest(STANDARD.encode([0x1f, 0x8b]).as_bytes(), "apps/podinfo")
            .unwrap_err();
        assert!(matches!(err, KubeError::CorruptStorageRecord { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let err = decode_release_manifest(STANDARD.encode(b"{").as_bytes(), "apps/podinfo").unwrap_err();
        assert!(err.to_string().contains("apps/podinfo"));
    }
}
