//! In-memory record store for testing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{RELEASE_DATA_KEY, RecordStore, ReleaseRecord, StoredRecord, encode_release_record};
use crate::error::{KubeError, Result};

/// In-memory record store, useful for unit tests without a cluster
#[derive(Clone, Default)]
pub struct MockRecordStore {
    /// (namespace, name) -> record
    records: Arc<RwLock<HashMap<(String, String), StoredRecord>>>,
    lookups: Arc<RwLock<RecordLookups>>,
}

/// Lookups performed, for assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecordLookups {
    pub count: usize,
    /// `namespace/name` of every lookup, in order
    pub names: Vec<String>,
}

impl MockRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw record
    pub fn insert(&self, record: StoredRecord) {
        let mut records = self.records.write().unwrap();
        records.insert((record.namespace.clone(), record.name.clone()), record);
    }

    /// Store a release record the way Helm does
    pub fn insert_release(
        &self,
        namespace: &str,
        name: &str,
        release: &ReleaseRecord,
        compress: bool,
    ) -> Result<()> {
        let encoded = encode_release_record(release, compress)?;
        self.insert(StoredRecord::new(namespace, name).with_data(RELEASE_DATA_KEY, encoded));
        Ok(())
    }

    pub fn lookups(&self) -> RecordLookups {
        self.lookups.read().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for MockRecordStore {
    async fn get_record(&self, namespace: &str, name: &str) -> Result<StoredRecord> {
        {
            let mut lookups = self.lookups.write().unwrap();
            lookups.count += 1;
            lookups.names.push(format!("{namespace}/{name}"));
        }

        let records = self.records.read().unwrap();
        records
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| KubeError::RecordNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
