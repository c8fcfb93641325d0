//! # KV Records
//!
//! Value types exchanged between the HTTP layer, the orchestrators and the
//! backends. Metadata is carried as an opaque JSON document.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default and maximum page size for `list`
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// A value and its metadata, as returned by `get_with_metadata`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueWithMetadata {
    pub value: String,
    pub metadata: Option<Value>,
}

/// Read options for `get` and its variants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Edge-cache hint in seconds; only the hosted store honours it
    pub cache_ttl: Option<i64>,
}

/// Write options for `put`
///
/// At most one of `expiration` (absolute, epoch seconds) and
/// `expiration_ttl` (relative seconds) may be set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PutOptions {
    pub expiration: Option<i64>,
    pub expiration_ttl: Option<i64>,
    pub metadata: Option<Value>,
}

impl PutOptions {
    /// Absolute expiration for a write happening at `now_ms`
    pub fn resolve_expiration(&self, now_ms: i64) -> Option<i64> {
        match (self.expiration, self.expiration_ttl) {
            (Some(at), _) => Some(at),
            (None, Some(ttl)) => Some((now_ms / 1000).saturating_add(ttl)),
            (None, None) => None,
        }
    }
}

/// Options for `list`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn prefix(&self) -> &str {
        self.prefix.as_deref().unwrap_or("")
    }

    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

/// One entry of a listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A listing page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult {
    pub keys: Vec<KeyInfo>,
    pub list_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Whether a record with `expiration` (epoch seconds) is still visible at `now_ms`
pub fn is_live(expiration: Option<i64>, now_ms: i64) -> bool {
    match expiration {
        Some(at) => at.saturating_mul(1000) > now_ms,
        None => true,
    }
}
