//! # Relational Backend
//!
//! Emulates the key-value contract on a single SQLite table.
//!
//! ## Invariants
//! - Every read statement carries the expiry predicate; no sweep is needed
//!   for correctness.
//! - Each put and delete is one self-contained statement.
//! - Listing order is SQLite's BINARY collation, i.e. byte order of the key.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde_json::Value;

use super::backend::KvBackend;
use super::clock::Clock;
use super::cursor;
use super::errors::{KvError, KvResult};
use super::record::{
    KeyInfo, ListOptions, ListResult, PutOptions, ReadOptions, ValueWithMetadata,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv_entries (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    metadata   TEXT,
    expiration INTEGER,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_kv_entries_expiration
    ON kv_entries (expiration) WHERE expiration IS NOT NULL;
";

/// Visibility predicate; `?1` is always the current time in milliseconds.
const LIVE: &str = "(expiration IS NULL OR expiration * 1000 > ?1)";

/// SQLite-backed key-value storage
#[derive(Clone)]
pub struct RelationalBackend {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for RelationalBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationalBackend").finish_non_exhaustive()
    }
}

impl RelationalBackend {
    /// Open or create a database file, creating the schema if needed
    pub fn open<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> KvResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    KvError::storage(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Self::with_connection(conn, clock)
    }

    /// Open a private in-memory database
    pub fn open_in_memory(clock: Arc<dyn Clock>) -> KvResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> KvResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Delete physically expired rows, returning how many were removed
    pub async fn purge_expired(&self) -> KvResult<usize> {
        self.run(|conn, now| {
            let removed = conn.execute(
                "DELETE FROM kv_entries WHERE expiration IS NOT NULL AND expiration * 1000 <= ?1",
                params![now],
            )?;
            Ok(removed)
        })
        .await
    }

    /// Rows physically stored, expired or not
    pub async fn stored_rows(&self) -> KvResult<usize> {
        self.run(|conn, _| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM kv_entries", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool, passing the
    /// current time in milliseconds.
    async fn run<T, F>(&self, f: F) -> KvResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, i64) -> KvResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let now = self.clock.now_millis();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| KvError::storage(format!("Failed to acquire database lock: {}", e)))?;
            f(&guard, now)
        })
        .await?
    }
}

fn encode_metadata(metadata: Option<&Value>) -> KvResult<Option<String>> {
    metadata
        .map(|m| {
            serde_json::to_string(m)
                .map_err(|e| KvError::storage(format!("Failed to encode metadata: {}", e)))
        })
        .transpose()
}

fn decode_metadata(raw: Option<String>) -> KvResult<Option<Value>> {
    raw.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| KvError::storage(format!("Corrupt metadata column: {}", e)))
    })
    .transpose()
}

fn select_many(
    conn: &Connection,
    now: i64,
    keys: &[String],
) -> KvResult<BTreeMap<String, (String, Option<String>)>> {
    let placeholders: Vec<String> = (0..keys.len()).map(|i| format!("?{}", i + 2)).collect();
    let sql = format!(
        "SELECT key, value, metadata FROM kv_entries WHERE key IN ({}) AND {}",
        placeholders.join(", "),
        LIVE
    );

    let mut args: Vec<&dyn ToSql> = Vec::with_capacity(keys.len() + 1);
    args.push(&now);
    args.extend(keys.iter().map(|k| k as &dyn ToSql));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?),
            ))
        })?
        .collect::<Result<BTreeMap<_, _>, _>>()?;
    Ok(rows)
}

#[async_trait]
impl KvBackend for RelationalBackend {
    fn name(&self) -> &'static str {
        "relational"
    }

    async fn get(&self, key: &str, _read: ReadOptions) -> KvResult<Option<String>> {
        let key = key.to_string();
        self.run(move |conn, now| {
            let sql = format!("SELECT value FROM kv_entries WHERE key = ?2 AND {}", LIVE);
            let value = conn
                .query_row(&sql, params![now, key], |row| row.get::<_, String>(0))
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn batch_get(
        &self,
        keys: &[String],
        _read: ReadOptions,
    ) -> KvResult<BTreeMap<String, Option<String>>> {
        let keys = keys.to_vec();
        self.run(move |conn, now| {
            let found = select_many(conn, now, &keys)?;
            Ok(keys
                .into_iter()
                .map(|k| {
                    let value = found.get(&k).map(|(value, _)| value.clone());
                    (k, value)
                })
                .collect())
        })
        .await
    }

    async fn get_with_metadata(
        &self,
        key: &str,
        _read: ReadOptions,
    ) -> KvResult<Option<ValueWithMetadata>> {
        let key = key.to_string();
        self.run(move |conn, now| {
            let sql = format!(
                "SELECT value, metadata FROM kv_entries WHERE key = ?2 AND {}",
                LIVE
            );
            let row = conn
                .query_row(&sql, params![now, key], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
                })
                .optional()?;
            row.map(|(value, metadata)| {
                Ok(ValueWithMetadata {
                    value,
                    metadata: decode_metadata(metadata)?,
                })
            })
            .transpose()
        })
        .await
    }

    async fn batch_get_with_metadata(
        &self,
        keys: &[String],
        _read: ReadOptions,
    ) -> KvResult<BTreeMap<String, Option<ValueWithMetadata>>> {
        let keys = keys.to_vec();
        self.run(move |conn, now| {
            let found = select_many(conn, now, &keys)?;
            let mut out = BTreeMap::new();
            for key in keys {
                let entry = match found.get(&key) {
                    Some((value, metadata)) => Some(ValueWithMetadata {
                        value: value.clone(),
                        metadata: decode_metadata(metadata.clone())?,
                    }),
                    None => None,
                };
                out.insert(key, entry);
            }
            Ok(out)
        })
        .await
    }

    async fn put(&self, key: &str, value: &str, options: &PutOptions) -> KvResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        let metadata = encode_metadata(options.metadata.as_ref())?;
        let options = options.clone();
        self.run(move |conn, now| {
            let expiration = options.resolve_expiration(now);
            conn.execute(
                "INSERT INTO kv_entries (key, value, metadata, expiration, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                     value = excluded.value,
                     metadata = excluded.metadata,
                     expiration = excluded.expiration,
                     updated_at = excluded.updated_at",
                params![key, value, metadata, expiration, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> KvResult<()> {
        let key = key.to_string();
        self.run(move |conn, _| {
            conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }

    async fn list(&self, options: &ListOptions) -> KvResult<ListResult> {
        let prefix = options.prefix().to_string();
        let limit = options.limit();
        let offset = cursor::start_offset(options.cursor.as_deref(), &prefix)?;

        self.run(move |conn, now| {
            let sql = format!(
                "SELECT key, expiration, metadata FROM kv_entries
                 WHERE substr(key, 1, length(?2)) = ?2 AND {}
                 ORDER BY key
                 LIMIT ?3 OFFSET ?4",
                LIVE
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![now, prefix, (limit + 1) as i64, offset as i64],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<i64>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )?
                .collect::<Result<Vec<_>, _>>()?;

            let has_more = rows.len() > limit;
            let keys = rows
                .into_iter()
                .take(limit)
                .map(|(name, expiration, metadata)| {
                    Ok(KeyInfo {
                        name,
                        expiration,
                        metadata: decode_metadata(metadata)?,
                    })
                })
                .collect::<KvResult<Vec<_>>>()?;

            let cursor = if has_more {
                Some(cursor::next_page(offset, keys.len(), &prefix)?)
            } else {
                None
            };
            Ok(ListResult {
                keys,
                list_complete: !has_more,
                cursor,
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::clock::ManualClock;
    use serde_json::json;
    use tempfile::TempDir;

    const T0: i64 = 1_700_000_000_000;

    fn backend() -> (RelationalBackend, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let backend = RelationalBackend::open_in_memory(clock.clone()).unwrap();
        (backend, clock)
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let (kv, _) = backend();
        kv.put("user:1", "alice", &PutOptions::default()).await.unwrap();
        assert_eq!(
            kv.get("user:1", ReadOptions::default()).await.unwrap(),
            Some("alice".to_string())
        );

        kv.delete("user:1").await.unwrap();
        assert_eq!(kv.get("user:1", ReadOptions::default()).await.unwrap(), None);

        // deleting again is fine
        kv.delete("user:1").await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_value_is_not_absent() {
        let (kv, _) = backend();
        kv.put("blank", "", &PutOptions::default()).await.unwrap();
        assert_eq!(
            kv.get("blank", ReadOptions::default()).await.unwrap(),
            Some(String::new())
        );
    }

    #[tokio::test]
    async fn test_overwrite_replaces_value_and_metadata() {
        let (kv, _) = backend();
        let first = PutOptions {
            metadata: Some(json!({"v": 1})),
            ..Default::default()
        };
        kv.put("k", "one", &first).await.unwrap();
        kv.put("k", "two", &PutOptions::default()).await.unwrap();

        let got = kv
            .get_with_metadata("k", ReadOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.value, "two");
        assert_eq!(got.metadata, None);
    }

    #[tokio::test]
    async fn test_ttl_expiry_is_read_time_filter() {
        let (kv, clock) = backend();
        let opts = PutOptions {
            expiration_ttl: Some(60),
            ..Default::default()
        };
        kv.put("session", "token", &opts).await.unwrap();
        assert!(kv.get("session", ReadOptions::default()).await.unwrap().is_some());

        clock.advance(60_000);
        assert_eq!(kv.get("session", ReadOptions::default()).await.unwrap(), None);
        assert!(kv
            .get_with_metadata("session", ReadOptions::default())
            .await
            .unwrap()
            .is_none());
        assert!(kv.list(&ListOptions::default()).await.unwrap().keys.is_empty());

        // still physically stored until purged
        assert_eq!(kv.stored_rows().await.unwrap(), 1);
        assert_eq!(kv.purge_expired().await.unwrap(), 1);
        assert_eq!(kv.stored_rows().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_keeps_live_rows() {
        let (kv, clock) = backend();
        kv.put("forever", "x", &PutOptions::default()).await.unwrap();
        let opts = PutOptions {
            expiration_ttl: Some(120),
            ..Default::default()
        };
        kv.put("later", "y", &opts).await.unwrap();

        clock.advance(60_000);
        assert_eq!(kv.purge_expired().await.unwrap(), 0);
        assert_eq!(kv.stored_rows().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_batch_get_covers_every_key() {
        let (kv, clock) = backend();
        kv.put("a", "1", &PutOptions::default()).await.unwrap();
        kv.put("b", "", &PutOptions::default()).await.unwrap();
        let short = PutOptions {
            expiration_ttl: Some(60),
            ..Default::default()
        };
        kv.put("c", "3", &short).await.unwrap();
        clock.advance(61_000);

        let keys: Vec<String> = ["a", "b", "c", "missing"].iter().map(|s| s.to_string()).collect();
        let values = kv.batch_get(&keys, ReadOptions::default()).await.unwrap();

        assert_eq!(values.len(), 4);
        assert_eq!(values["a"], Some("1".to_string()));
        assert_eq!(values["b"], Some(String::new()));
        assert_eq!(values["c"], None);
        assert_eq!(values["missing"], None);
    }

    #[tokio::test]
    async fn test_batch_get_with_metadata() {
        let (kv, _) = backend();
        let opts = PutOptions {
            metadata: Some(json!({"owner": "ops"})),
            ..Default::default()
        };
        kv.put("cfg", "on", &opts).await.unwrap();

        let keys = vec!["cfg".to_string(), "nope".to_string()];
        let values = kv
            .batch_get_with_metadata(&keys, ReadOptions::default())
            .await
            .unwrap();
        let cfg = values["cfg"].as_ref().unwrap();
        assert_eq!(cfg.value, "on");
        assert_eq!(cfg.metadata, Some(json!({"owner": "ops"})));
        assert!(values["nope"].is_none());
    }

    #[tokio::test]
    async fn test_list_pagination_is_complete_and_disjoint() {
        let (kv, _) = backend();
        for i in 0..25 {
            kv.put(&format!("item:{:02}", i), "v", &PutOptions::default())
                .await
                .unwrap();
        }
        kv.put("other", "v", &PutOptions::default()).await.unwrap();

        let mut seen = Vec::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = kv
                .list(&ListOptions {
                    prefix: Some("item:".to_string()),
                    limit: Some(10),
                    cursor: cursor.take(),
                })
                .await
                .unwrap();
            pages += 1;
            seen.extend(page.keys.into_iter().map(|k| k.name));
            if page.list_complete {
                assert!(page.cursor.is_none());
                break;
            }
            cursor = page.cursor;
            assert!(cursor.is_some());
        }

        assert_eq!(pages, 3);
        let expected: Vec<String> = (0..25).map(|i| format!("item:{:02}", i)).collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_list_exact_page_is_complete() {
        let (kv, _) = backend();
        for key in ["a", "b", "c"] {
            kv.put(key, "v", &PutOptions::default()).await.unwrap();
        }
        let page = kv
            .list(&ListOptions {
                limit: Some(3),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.keys.len(), 3);
        assert!(page.list_complete);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn test_list_reports_expiration_and_metadata() {
        let (kv, _) = backend();
        let opts = PutOptions {
            expiration: Some(T0 / 1000 + 3600),
            metadata: Some(json!({"tag": 7})),
            ..Default::default()
        };
        kv.put("k", "v", &opts).await.unwrap();

        let page = kv.list(&ListOptions::default()).await.unwrap();
        assert_eq!(page.keys[0].expiration, Some(T0 / 1000 + 3600));
        assert_eq!(page.keys[0].metadata, Some(json!({"tag": 7})));
    }

    #[tokio::test]
    async fn test_list_prefix_is_literal() {
        let (kv, _) = backend();
        kv.put("a%b", "1", &PutOptions::default()).await.unwrap();
        kv.put("axb", "2", &PutOptions::default()).await.unwrap();

        let page = kv
            .list(&ListOptions {
                prefix: Some("a%".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let names: Vec<_> = page.keys.iter().map(|k| k.name.as_str()).collect();
        assert_eq!(names, vec!["a%b"]);
    }

    #[tokio::test]
    async fn test_cursor_is_bound_to_prefix() {
        let (kv, _) = backend();
        for i in 0..3 {
            kv.put(&format!("p:{}", i), "v", &PutOptions::default())
                .await
                .unwrap();
        }
        let page = kv
            .list(&ListOptions {
                prefix: Some("p:".to_string()),
                limit: Some(1),
                cursor: None,
            })
            .await
            .unwrap();

        let err = kv
            .list(&ListOptions {
                prefix: Some("q:".to_string()),
                limit: Some(1),
                cursor: page.cursor,
            })
            .await
            .unwrap_err();
        assert_eq!(err, KvError::InvalidCursor);
    }

    #[tokio::test]
    async fn test_crafted_cursor_offsets() {
        let (kv, _) = backend();
        for key in ["a", "b", "c"] {
            kv.put(key, "v", &PutOptions::default()).await.unwrap();
        }

        let err = kv
            .list(&ListOptions {
                limit: Some(1),
                cursor: Some(cursor::unchecked_token(u64::MAX, "")),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, KvError::InvalidCursor);

        let page = kv
            .list(&ListOptions {
                limit: Some(1),
                cursor: Some(cursor::unchecked_token(i64::MAX as u64, "")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.keys.is_empty());
        assert!(page.list_complete);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("kv.db");
        let clock = Arc::new(ManualClock::new(T0));

        {
            let kv = RelationalBackend::open(&path, clock.clone()).unwrap();
            kv.put("durable", "yes", &PutOptions::default()).await.unwrap();
        }

        let kv = RelationalBackend::open(&path, clock).unwrap();
        assert_eq!(
            kv.get("durable", ReadOptions::default()).await.unwrap(),
            Some("yes".to_string())
        );
    }
}
