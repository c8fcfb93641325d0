//! # Hosted Backend
//!
//! Delegates to a hosted, eventually-consistent key-value namespace. The
//! namespace itself is an external capability described by
//! [`HostedNamespace`]; [`MemoryNamespace`] reproduces its observable
//! behaviour in process (read-time expiry, opaque list cursors, and the
//! one-write-per-key-per-second rate limit).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::backend::KvBackend;
use super::clock::Clock;
use super::cursor;
use super::errors::{KvError, KvResult};
use super::record::{
    is_live, KeyInfo, ListOptions, ListResult, PutOptions, ReadOptions, ValueWithMetadata,
};

/// Error reported by the hosted namespace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeError {
    /// HTTP status the hosted service answered with, when known
    pub status: Option<u16>,
    pub message: String,
}

impl NativeError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(Some(429), message)
    }

    /// The hosted store reports rate limiting either through a 429 status or
    /// only in the error text.
    pub fn is_rate_limit(&self) -> bool {
        if self.status == Some(429) {
            return true;
        }
        let msg = self.message.to_ascii_lowercase();
        msg.contains("429") || msg.contains("rate limit") || msg.contains("too many requests")
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({})", self.message, status),
            None => write!(f, "{}", self.message),
        }
    }
}

impl From<NativeError> for KvError {
    fn from(err: NativeError) -> Self {
        if err.is_rate_limit() {
            KvError::RateLimited(err.message)
        } else if err.status == Some(400) {
            KvError::Validation(err.message)
        } else {
            KvError::Storage(err.message)
        }
    }
}

pub type NativeResult<T> = Result<T, NativeError>;

/// Native operations of the hosted key-value service
#[async_trait]
pub trait HostedNamespace: Send + Sync + fmt::Debug {
    async fn get(
        &self,
        key: &str,
        cache_ttl: Option<i64>,
    ) -> NativeResult<Option<ValueWithMetadata>>;

    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> NativeResult<()>;

    async fn delete(&self, key: &str) -> NativeResult<()>;

    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> NativeResult<ListResult>;
}

/// [`KvBackend`] over a [`HostedNamespace`]
#[derive(Debug, Clone)]
pub struct HostedBackend {
    namespace: Arc<dyn HostedNamespace>,
}

impl HostedBackend {
    pub fn new(namespace: Arc<dyn HostedNamespace>) -> Self {
        Self { namespace }
    }
}

#[async_trait]
impl KvBackend for HostedBackend {
    fn name(&self) -> &'static str {
        "hosted"
    }

    async fn get(&self, key: &str, read: ReadOptions) -> KvResult<Option<String>> {
        let entry = self.namespace.get(key, read.cache_ttl).await?;
        Ok(entry.map(|e| e.value))
    }

    async fn get_with_metadata(
        &self,
        key: &str,
        read: ReadOptions,
    ) -> KvResult<Option<ValueWithMetadata>> {
        Ok(self.namespace.get(key, read.cache_ttl).await?)
    }

    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> KvResult<()> {
        Ok(self.namespace.put(key, value, options).await?)
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        Ok(self.namespace.delete(key).await?)
    }

    async fn list(&self, options: &ListOptions) -> KvResult<ListResult> {
        Ok(self
            .namespace
            .list(options.prefix(), options.limit(), options.cursor.as_deref())
            .await?)
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    value: String,
    metadata: Option<Value>,
    expiration: Option<i64>,
}

/// In-process hosted namespace
#[derive(Debug)]
pub struct MemoryNamespace {
    entries: RwLock<BTreeMap<String, StoredEntry>>,
    last_write: Mutex<HashMap<String, i64>>,
    write_interval_ms: i64,
    clock: Arc<dyn Clock>,
}

impl MemoryNamespace {
    /// `write_interval_ms` is the minimum spacing between writes to one key;
    /// zero disables the limit.
    pub fn new(clock: Arc<dyn Clock>, write_interval_ms: i64) -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            last_write: Mutex::new(HashMap::new()),
            write_interval_ms,
            clock,
        }
    }

    fn poisoned() -> NativeError {
        NativeError::new(Some(500), "namespace lock poisoned")
    }

    /// Record a write to `key` at `now`, or refuse it when too soon
    fn admit_write(&self, key: &str, now: i64) -> NativeResult<()> {
        if self.write_interval_ms <= 0 {
            return Ok(());
        }
        let mut last = self.last_write.lock().map_err(|_| Self::poisoned())?;
        if let Some(&prev) = last.get(key) {
            if now - prev < self.write_interval_ms {
                return Err(NativeError::rate_limited(format!(
                    "KV PUT failed: 429 Too Many Requests for key '{}'",
                    key
                )));
            }
        }
        last.insert(key.to_string(), now);
        Ok(())
    }

    /// Entries physically held, expired or not
    pub fn stored_len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HostedNamespace for MemoryNamespace {
    async fn get(
        &self,
        key: &str,
        _cache_ttl: Option<i64>,
    ) -> NativeResult<Option<ValueWithMetadata>> {
        let now = self.clock.now_millis();
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;
        Ok(entries
            .get(key)
            .filter(|e| is_live(e.expiration, now))
            .map(|e| ValueWithMetadata {
                value: e.value.clone(),
                metadata: e.metadata.clone(),
            }))
    }

    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> NativeResult<()> {
        let now = self.clock.now_millis();
        self.admit_write(key, now)?;
        let entry = StoredEntry {
            value: value.to_string(),
            metadata: options.metadata.clone(),
            expiration: options.resolve_expiration(now),
        };
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> NativeResult<()> {
        let mut entries = self.entries.write().map_err(|_| Self::poisoned())?;
        entries.remove(key);
        Ok(())
    }

    async fn list(
        &self,
        prefix: &str,
        limit: usize,
        cursor_token: Option<&str>,
    ) -> NativeResult<ListResult> {
        let now = self.clock.now_millis();
        let offset = cursor::start_offset(cursor_token, prefix).map_err(cursor_error)?;
        let skip = usize::try_from(offset).map_err(|_| cursor_error(KvError::InvalidCursor))?;
        let entries = self.entries.read().map_err(|_| Self::poisoned())?;

        let mut page: Vec<KeyInfo> = entries
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .filter(|(_, e)| is_live(e.expiration, now))
            .skip(skip)
            .take(limit + 1)
            .map(|(name, e)| KeyInfo {
                name: name.clone(),
                expiration: e.expiration,
                metadata: e.metadata.clone(),
            })
            .collect();

        let has_more = page.len() > limit;
        page.truncate(limit);
        let cursor = if has_more {
            Some(cursor::next_page(offset, page.len(), prefix).map_err(cursor_error)?)
        } else {
            None
        };
        Ok(ListResult {
            keys: page,
            list_complete: !has_more,
            cursor,
        })
    }
}

fn cursor_error(err: KvError) -> NativeError {
    NativeError::new(err.is_validation().then_some(400), err.to_string())
}
