//! # Batch Read Aggregator
//!
//! Reads 1..=100 keys in one backend call. The returned map always contains
//! every requested key; `None` marks keys that were never written or have
//! expired.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::kv::validation::validate_batch_keys;
use crate::kv::{KvBackend, KvResult, ReadOptions, ValueWithMetadata};

#[derive(Debug, Clone)]
pub struct BatchReadAggregator {
    backend: Arc<dyn KvBackend>,
}

impl BatchReadAggregator {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub async fn values(
        &self,
        keys: &[String],
        read: ReadOptions,
    ) -> KvResult<BTreeMap<String, Option<String>>> {
        validate_batch_keys(keys)?;
        let found = self.backend.batch_get(keys, read).await?;
        Ok(fill_missing(keys, found))
    }

    pub async fn values_with_metadata(
        &self,
        keys: &[String],
        read: ReadOptions,
    ) -> KvResult<BTreeMap<String, Option<ValueWithMetadata>>> {
        validate_batch_keys(keys)?;
        let found = self.backend.batch_get_with_metadata(keys, read).await?;
        Ok(fill_missing(keys, found))
    }
}

/// Ensure every requested key appears, whatever the backend returned
fn fill_missing<V>(
    keys: &[String],
    mut found: BTreeMap<String, Option<V>>,
) -> BTreeMap<String, Option<V>> {
    for key in keys {
        found.entry(key.clone()).or_insert(None);
    }
    found.retain(|k, _| keys.contains(k));
    found
}
