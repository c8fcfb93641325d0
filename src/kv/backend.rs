//! # Storage Backend Trait
//!
//! The single contract every storage variant implements. Callers hold an
//! `Arc<dyn KvBackend>` chosen once at startup and never learn which variant
//! sits behind it.

use std::collections::BTreeMap;
use std::fmt::Debug;

use async_trait::async_trait;
use futures_util::future::join_all;

use super::errors::KvResult;
use super::record::{ListOptions, ListResult, PutOptions, ReadOptions, ValueWithMetadata};

/// Key-value storage capability
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](KvBackend::get) | Value for one key, `None` when absent or expired |
/// | [`batch_get`](KvBackend::batch_get) | Values for many keys; every key appears in the map |
/// | [`get_with_metadata`](KvBackend::get_with_metadata) | Value plus metadata |
/// | [`put`](KvBackend::put) | Create or fully replace a record |
/// | [`delete`](KvBackend::delete) | Remove a record; absent keys are not an error |
/// | [`list`](KvBackend::list) | Sorted, prefix-filtered, paginated key listing |
///
/// Implementations never retry. A transient rejection is reported as
/// [`KvError::RateLimited`](super::KvError::RateLimited) and any other fault
/// as [`KvError::Storage`](super::KvError::Storage).
#[async_trait]
pub trait KvBackend: Send + Sync + Debug {
    /// Short name used in logs and the health endpoint
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str, read: ReadOptions) -> KvResult<Option<String>>;

    /// Reads many keys at once.
    ///
    /// The default fans out concurrent [`get`](KvBackend::get) calls.
    async fn batch_get(
        &self,
        keys: &[String],
        read: ReadOptions,
    ) -> KvResult<BTreeMap<String, Option<String>>> {
        let reads = join_all(keys.iter().map(|key| self.get(key, read))).await;
        keys.iter()
            .cloned()
            .zip(reads)
            .map(|(key, value)| value.map(|v| (key, v)))
            .collect()
    }

    async fn get_with_metadata(
        &self,
        key: &str,
        read: ReadOptions,
    ) -> KvResult<Option<ValueWithMetadata>>;

    /// Reads many keys with metadata at once.
    ///
    /// The default fans out concurrent
    /// [`get_with_metadata`](KvBackend::get_with_metadata) calls.
    async fn batch_get_with_metadata(
        &self,
        keys: &[String],
        read: ReadOptions,
    ) -> KvResult<BTreeMap<String, Option<ValueWithMetadata>>> {
        let reads = join_all(keys.iter().map(|key| self.get_with_metadata(key, read))).await;
        keys.iter()
            .cloned()
            .zip(reads)
            .map(|(key, value)| value.map(|v| (key, v)))
            .collect()
    }

    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> KvResult<()>;

    async fn delete(&self, key: &str) -> KvResult<()>;

    async fn list(&self, options: &ListOptions) -> KvResult<ListResult>;
}
