//! # Listing Cursors
//!
//! A cursor is a versioned offset plus a fingerprint of the prefix it was
//! issued for, serialized as JSON and encoded base64url. Clients only ever
//! see the token.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::errors::{KvError, KvResult};

const CURSOR_VERSION: u8 = 1;

/// Largest offset a backend can be asked to skip (SQLite binds `i64`)
const MAX_OFFSET: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct OffsetCursor {
    v: u8,
    offset: u64,
    prefix: String,
}

fn prefix_fingerprint(prefix: &str) -> String {
    let digest = Sha256::digest(prefix.as_bytes());
    hex::encode(&digest[..8])
}

fn seal(offset: u64, prefix: &str) -> KvResult<String> {
    let cursor = OffsetCursor {
        v: CURSOR_VERSION,
        offset,
        prefix: prefix_fingerprint(prefix),
    };
    let json = serde_json::to_vec(&cursor)
        .map_err(|e| KvError::storage(format!("Failed to encode cursor: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Encode a resumption offset for `prefix` into an opaque token
pub fn encode(offset: u64, prefix: &str) -> KvResult<String> {
    if offset > MAX_OFFSET {
        return Err(KvError::InvalidCursor);
    }
    seal(offset, prefix)
}

/// Token for the page after one of `page_len` keys starting at `offset`
pub fn next_page(offset: u64, page_len: usize, prefix: &str) -> KvResult<String> {
    let next = offset
        .checked_add(page_len as u64)
        .ok_or(KvError::InvalidCursor)?;
    encode(next, prefix)
}

/// Decode a token previously produced by [`encode`] for the same `prefix`
pub fn decode(token: &str, prefix: &str) -> KvResult<u64> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|_| KvError::InvalidCursor)?;
    let cursor: OffsetCursor =
        serde_json::from_slice(&bytes).map_err(|_| KvError::InvalidCursor)?;

    if cursor.v != CURSOR_VERSION || cursor.prefix != prefix_fingerprint(prefix) {
        return Err(KvError::InvalidCursor);
    }
    if cursor.offset > MAX_OFFSET {
        return Err(KvError::InvalidCursor);
    }
    Ok(cursor.offset)
}

/// Well-formed token for any offset, bypassing the range check
#[cfg(test)]
pub(crate) fn unchecked_token(offset: u64, prefix: &str) -> String {
    seal(offset, prefix).unwrap()
}

/// Resolve an optional token to a starting offset
pub fn start_offset(token: Option<&str>, prefix: &str) -> KvResult<u64> {
    match token {
        Some(t) if !t.is_empty() => decode(t, prefix),
        _ => Ok(0),
    }
}
