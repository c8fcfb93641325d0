//! # Bulk Delete Aggregator
//!
//! One delete per key, all concurrent, no retry.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::info;

use crate::kv::validation::validate_key;
use crate::kv::{KvBackend, KvError, KvResult};

use super::result::{BulkResult, EntryOutcome};

#[derive(Debug, Clone)]
pub struct BulkDeleteAggregator {
    backend: Arc<dyn KvBackend>,
}

impl BulkDeleteAggregator {
    pub fn new(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    pub async fn run(&self, keys: Vec<String>) -> KvResult<BulkResult> {
        if keys.is_empty() {
            return Err(KvError::validation("keys must contain at least one entry"));
        }

        let outcomes = join_all(keys.iter().map(|key| self.delete_one(key))).await;
        let result = BulkResult::from_outcomes(outcomes);
        info!(
            backend = self.backend.name(),
            total = result.total,
            failed = result.failed,
            "bulk delete finished"
        );
        Ok(result)
    }

    async fn delete_one(&self, key: &str) -> EntryOutcome {
        let deleted = match validate_key(key) {
            Ok(()) => self.backend.delete(key).await,
            Err(e) => Err(e),
        };
        match deleted {
            Ok(()) => EntryOutcome::ok(key),
            Err(e) => EntryOutcome::failed(key, &e),
        }
    }
}
