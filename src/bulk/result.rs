//! # Bulk Results
//!
//! Per-key outcomes of a bulk write or delete, merged after the fan-out
//! joins.

use serde::{Deserialize, Serialize};

use crate::kv::KvError;

/// Outcome of one sub-operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryOutcome {
    pub key: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EntryOutcome {
    pub fn ok(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(key: impl Into<String>, err: &KvError) -> Self {
        Self {
            key: key.into(),
            success: false,
            error: Some(err.to_string()),
        }
    }
}

/// Aggregate of a bulk request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    /// True only if every entry succeeded
    pub success: bool,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<EntryOutcome>,
}

impl BulkResult {
    pub fn from_outcomes(results: Vec<EntryOutcome>) -> Self {
        let total = results.len();
        let successful = results.iter().filter(|r| r.success).count();
        let failed = total - successful;
        Self {
            success: failed == 0,
            total,
            successful,
            failed,
            results,
        }
    }
}
