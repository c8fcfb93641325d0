//! # Input Validation
//!
//! Boundary checks applied before any call reaches a backend.

use super::errors::{KvError, KvResult};
use super::record::{PutOptions, DEFAULT_LIST_LIMIT};

/// Longest accepted key, in characters
pub const MAX_KEY_LENGTH: usize = 512;

/// Shortest accepted relative TTL, and minimum edge-cache TTL
pub const MIN_TTL_SECONDS: i64 = 60;

/// Upper bound on keys in one batch read
pub const MAX_BATCH_KEYS: usize = 100;

/// Upper bound on pairs in one bulk write
pub const MAX_BULK_PAIRS: usize = 10_000;

/// Validate a record key
pub fn validate_key(key: &str) -> KvResult<()> {
    if key.is_empty() {
        return Err(KvError::InvalidKey("key must not be empty".to_string()));
    }
    if key == "." || key == ".." {
        return Err(KvError::InvalidKey(format!("key cannot be '{}'", key)));
    }
    if key.chars().count() > MAX_KEY_LENGTH {
        return Err(KvError::InvalidKey(format!(
            "key exceeds {} characters",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

/// Validate write options against the clock at `now_ms`
pub fn validate_put_options(options: &PutOptions, now_ms: i64) -> KvResult<()> {
    match (options.expiration, options.expiration_ttl) {
        (Some(_), Some(_)) => Err(KvError::validation(
            "expiration and expirationTtl are mutually exclusive",
        )),
        (None, Some(ttl)) if ttl < MIN_TTL_SECONDS => Err(KvError::validation(format!(
            "expirationTtl must be at least {} seconds",
            MIN_TTL_SECONDS
        ))),
        (Some(at), None) if at < now_ms / 1000 + MIN_TTL_SECONDS => {
            Err(KvError::validation(format!(
                "expiration must be at least {} seconds in the future",
                MIN_TTL_SECONDS
            )))
        }
        (Some(at), None) if to_millis(Some(at)).is_none() => {
            Err(KvError::validation("expiration is out of range"))
        }
        (None, Some(ttl)) if to_millis((now_ms / 1000).checked_add(ttl)).is_none() => {
            Err(KvError::validation("expirationTtl is out of range"))
        }
        _ => Ok(()),
    }
}

/// Expiry instants are compared in milliseconds and must fit in an `i64`
fn to_millis(seconds: Option<i64>) -> Option<i64> {
    seconds.and_then(|s| s.checked_mul(1000))
}

/// Validate an edge-cache TTL hint
pub fn validate_cache_ttl(cache_ttl: Option<i64>) -> KvResult<()> {
    match cache_ttl {
        Some(ttl) if ttl < MIN_TTL_SECONDS => Err(KvError::validation(format!(
            "cacheTtl must be at least {} seconds",
            MIN_TTL_SECONDS
        ))),
        _ => Ok(()),
    }
}

/// Validate the key set of a batch read
pub fn validate_batch_keys(keys: &[String]) -> KvResult<()> {
    if keys.is_empty() || keys.len() > MAX_BATCH_KEYS {
        return Err(KvError::validation(format!(
            "keys must contain between 1 and {} entries",
            MAX_BATCH_KEYS
        )));
    }
    keys.iter().try_for_each(|k| validate_key(k))
}

/// Validate a listing page size
pub fn validate_list_limit(limit: Option<usize>) -> KvResult<()> {
    match limit {
        Some(n) if n == 0 || n > DEFAULT_LIST_LIMIT => Err(KvError::validation(format!(
            "limit must be between 1 and {}",
            DEFAULT_LIST_LIMIT
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_rules() {
        assert!(validate_key("user:1").is_ok());
        assert!(validate_key("").is_err());
        assert!(validate_key(".").is_err());
        assert!(validate_key("..").is_err());
        assert!(validate_key("...").is_ok());
        assert!(validate_key(&"a".repeat(512)).is_ok());
        assert!(validate_key(&"a".repeat(513)).is_err());
    }

    #[test]
    fn test_key_length_counts_characters() {
        // 512 two-byte characters is still within the limit
        assert!(validate_key(&"é".repeat(512)).is_ok());
    }

    #[test]
    fn test_ttl_minimum() {
        let now = 1_700_000_000_000;
        let ok = PutOptions {
            expiration_ttl: Some(60),
            ..Default::default()
        };
        let short = PutOptions {
            expiration_ttl: Some(59),
            ..Default::default()
        };
        assert!(validate_put_options(&ok, now).is_ok());
        assert!(matches!(
            validate_put_options(&short, now),
            Err(KvError::Validation(_))
        ));
    }

    #[test]
    fn test_expiration_forms_are_exclusive() {
        let both = PutOptions {
            expiration: Some(i64::MAX / 2000),
            expiration_ttl: Some(120),
            ..Default::default()
        };
        assert!(validate_put_options(&both, 0).is_err());
    }

    #[test]
    fn test_absolute_expiration_must_be_in_future() {
        let now = 1_700_000_000_000;
        let past = PutOptions {
            expiration: Some(now / 1000 - 1),
            ..Default::default()
        };
        let future = PutOptions {
            expiration: Some(now / 1000 + 3600),
            ..Default::default()
        };
        assert!(validate_put_options(&past, now).is_err());
        assert!(validate_put_options(&future, now).is_ok());
    }

    #[test]
    fn test_expiration_out_of_range() {
        let now = 1_700_000_000_000;
        let huge_ttl = PutOptions {
            expiration_ttl: Some(i64::MAX),
            ..Default::default()
        };
        let huge_at = PutOptions {
            expiration: Some(i64::MAX),
            ..Default::default()
        };
        let far_ttl = PutOptions {
            expiration_ttl: Some(10 * 365 * 24 * 3600),
            ..Default::default()
        };
        assert!(matches!(
            validate_put_options(&huge_ttl, now),
            Err(KvError::Validation(_))
        ));
        assert!(matches!(
            validate_put_options(&huge_at, now),
            Err(KvError::Validation(_))
        ));
        assert!(validate_put_options(&far_ttl, now).is_ok());
    }

    #[test]
    fn test_batch_bounds() {
        assert!(validate_batch_keys(&[]).is_err());
        let hundred: Vec<String> = (0..100).map(|i| format!("k{}", i)).collect();
        assert!(validate_batch_keys(&hundred).is_ok());
        let too_many: Vec<String> = (0..101).map(|i| format!("k{}", i)).collect();
        assert!(validate_batch_keys(&too_many).is_err());
        assert!(validate_batch_keys(&["ok".to_string(), "..".to_string()]).is_err());
    }

    #[test]
    fn test_limits_and_cache_ttl() {
        assert!(validate_list_limit(None).is_ok());
        assert!(validate_list_limit(Some(1000)).is_ok());
        assert!(validate_list_limit(Some(0)).is_err());
        assert!(validate_list_limit(Some(1001)).is_err());
        assert!(validate_cache_ttl(Some(30)).is_err());
        assert!(validate_cache_ttl(Some(60)).is_ok());
        assert!(validate_cache_ttl(None).is_ok());
    }
}
