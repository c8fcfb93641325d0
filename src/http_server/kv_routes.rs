//! KV HTTP Routes
//!
//! Single-key reads and writes, listing, batch reads, bulk writes and bulk
//! deletes. Every route runs behind the auth middleware.

use std::collections::BTreeMap;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::bulk::{BulkResult, WriteEntry};
use crate::kv::validation::{
    validate_cache_ttl, validate_key, validate_list_limit, validate_put_options,
};
use crate::kv::{KvError, ListOptions, ListResult, PutOptions, ReadOptions};

use super::errors::ApiError;
use super::server::AppState;

// ==================
// Request/Response Types
// ==================

/// How a stored value is rendered in responses
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadQuery {
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub cache_ttl: Option<i64>,
}

impl ReadQuery {
    fn read_options(&self) -> ReadOptions {
        ReadOptions {
            cache_ttl: self.cache_ttl,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub cursor: Option<String>,
}

/// Body of a single write; the key comes from the path
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteRequest {
    pub value: Value,
    #[serde(default)]
    pub expiration: Option<i64>,
    #[serde(default)]
    pub expiration_ttl: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl WriteRequest {
    /// Strings are stored verbatim, anything else as compact JSON
    pub fn value_text(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn put_options(&self) -> PutOptions {
        PutOptions {
            expiration: self.expiration,
            expiration_ttl: self.expiration_ttl,
            metadata: self.metadata.clone(),
        }
    }
}

/// A write that names its own key (`POST /kv`, bulk pairs)
#[derive(Debug, Clone, Deserialize)]
pub struct KeyedWriteRequest {
    pub key: String,
    #[serde(flatten)]
    pub body: WriteRequest,
}

impl From<KeyedWriteRequest> for WriteEntry {
    fn from(pair: KeyedWriteRequest) -> Self {
        WriteEntry {
            value: pair.body.value_text(),
            options: pair.body.put_options(),
            key: pair.key,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub keys: Vec<String>,
    #[serde(rename = "type", default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub cache_ttl: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkWriteRequest {
    pub pairs: Vec<KeyedWriteRequest>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ValueResponse {
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct MetadataResponse {
    pub key: String,
    pub value: Value,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct EntryView {
    pub value: Value,
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse<T> {
    pub values: BTreeMap<String, Option<T>>,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub success: bool,
    pub key: String,
}

type Created<T> = Result<(StatusCode, Json<T>), ApiError>;

/// Create KV routes
pub fn kv_routes() -> Router<AppState> {
    Router::new()
        .route("/kv", get(list_handler).post(create_handler))
        .route("/kv/batch", post(batch_handler))
        .route("/kv/batch/metadata", post(batch_metadata_handler))
        .route("/kv/bulk", post(bulk_write_handler))
        .route("/kv/bulk/delete", post(bulk_delete_handler))
        .route(
            "/kv/:key",
            get(get_handler).put(put_handler).delete(delete_handler),
        )
        .route("/kv/:key/metadata", get(get_metadata_handler))
}

/// Render a stored value as text or parsed JSON
fn render(key: &str, stored: String, value_type: ValueType) -> Result<Value, ApiError> {
    match value_type {
        ValueType::Text => Ok(Value::String(stored)),
        ValueType::Json => serde_json::from_str(&stored).map_err(|_| {
            ApiError::bad_request(format!("Value for key '{}' is not valid JSON", key))
                .with_hint("Use type=text to read the raw value")
        }),
    }
}

// ==================
// Handlers
// ==================

async fn get_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ReadQuery>, QueryRejection>,
) -> Result<Json<ValueResponse>, ApiError> {
    let Path(key) = path?;
    let Query(query) = query?;
    validate_key(&key)?;
    validate_cache_ttl(query.cache_ttl)?;

    let stored = state
        .backend
        .get(&key, query.read_options())
        .await?
        .ok_or_else(|| KvError::NotFound(key.clone()))?;

    let value = render(&key, stored, query.value_type)?;
    Ok(Json(ValueResponse { key, value }))
}

async fn get_metadata_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    query: Result<Query<ReadQuery>, QueryRejection>,
) -> Result<Json<MetadataResponse>, ApiError> {
    let Path(key) = path?;
    let Query(query) = query?;
    validate_key(&key)?;
    validate_cache_ttl(query.cache_ttl)?;

    let entry = state
        .backend
        .get_with_metadata(&key, query.read_options())
        .await?
        .ok_or_else(|| KvError::NotFound(key.clone()))?;

    let value = render(&key, entry.value, query.value_type)?;
    Ok(Json(MetadataResponse {
        key,
        value,
        metadata: entry.metadata,
    }))
}

async fn batch_handler(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse<Value>>, ApiError> {
    let Json(request) = body?;
    validate_cache_ttl(request.cache_ttl)?;
    let read = ReadOptions {
        cache_ttl: request.cache_ttl,
    };

    let found = state.reader.values(&request.keys, read).await?;
    let mut values = BTreeMap::new();
    for (key, stored) in found {
        let rendered = match stored {
            Some(stored) => Some(render(&key, stored, request.value_type)?),
            None => None,
        };
        values.insert(key, rendered);
    }
    Ok(Json(BatchResponse { values }))
}

async fn batch_metadata_handler(
    State(state): State<AppState>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse<EntryView>>, ApiError> {
    let Json(request) = body?;
    validate_cache_ttl(request.cache_ttl)?;
    let read = ReadOptions {
        cache_ttl: request.cache_ttl,
    };

    let found = state.reader.values_with_metadata(&request.keys, read).await?;
    let mut values = BTreeMap::new();
    for (key, entry) in found {
        let view = match entry {
            Some(entry) => Some(EntryView {
                value: render(&key, entry.value, request.value_type)?,
                metadata: entry.metadata,
            }),
            None => None,
        };
        values.insert(key, view);
    }
    Ok(Json(BatchResponse { values }))
}

async fn list_handler(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<ListResult>, ApiError> {
    let Query(query) = query?;
    validate_list_limit(query.limit)?;

    let options = ListOptions {
        prefix: query.prefix,
        limit: query.limit,
        cursor: query.cursor.filter(|c| !c.is_empty()),
    };
    Ok(Json(state.backend.list(&options).await?))
}

async fn create_handler(
    State(state): State<AppState>,
    body: Result<Json<KeyedWriteRequest>, JsonRejection>,
) -> Created<WriteResponse> {
    let Json(request) = body?;
    store(&state, request.key, request.body).await
}

async fn put_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<WriteRequest>, JsonRejection>,
) -> Created<WriteResponse> {
    let Path(key) = path?;
    let Json(request) = body?;
    store(&state, key, request).await
}

/// Single write; a rate-limit rejection surfaces as 429 without retry
async fn store(state: &AppState, key: String, request: WriteRequest) -> Created<WriteResponse> {
    validate_key(&key)?;
    let options = request.put_options();
    validate_put_options(&options, state.clock.now_millis())?;

    state
        .backend
        .put(&key, &request.value_text(), &options)
        .await?;
    debug!(key = %key, backend = state.backend.name(), "value stored");

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse { success: true, key }),
    ))
}

async fn delete_handler(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> Result<Json<WriteResponse>, ApiError> {
    let Path(key) = path?;
    validate_key(&key)?;
    state.backend.delete(&key).await?;
    debug!(key = %key, backend = state.backend.name(), "value deleted");
    Ok(Json(WriteResponse { success: true, key }))
}

async fn bulk_write_handler(
    State(state): State<AppState>,
    body: Result<Json<BulkWriteRequest>, JsonRejection>,
) -> Created<BulkResult> {
    let Json(request) = body?;
    let entries: Vec<WriteEntry> = request.pairs.into_iter().map(WriteEntry::from).collect();
    let result = state.writer.run(entries).await?;

    let status = if result.success {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(result)))
}

async fn bulk_delete_handler(
    State(state): State<AppState>,
    body: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BulkResult>), ApiError> {
    let Json(request) = body?;
    let result = state.deleter.run(request.keys).await?;

    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(result)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_text_keeps_strings_verbatim() {
        let req: WriteRequest = serde_json::from_value(json!({"value": "plain"})).unwrap();
        assert_eq!(req.value_text(), "plain");

        let req: WriteRequest = serde_json::from_value(json!({"value": {"a": [1, 2]}})).unwrap();
        assert_eq!(req.value_text(), r#"{"a":[1,2]}"#);

        let req: WriteRequest = serde_json::from_value(json!({"value": "{\"x\":1}"})).unwrap();
        assert_eq!(req.value_text(), "{\"x\":1}");
    }

    #[test]
    fn test_write_request_uses_camel_case_ttl() {
        let req: WriteRequest = serde_json::from_value(json!({
            "value": "v",
            "expirationTtl": 120,
            "metadata": {"tag": "t"}
        }))
        .unwrap();
        let opts = req.put_options();
        assert_eq!(opts.expiration_ttl, Some(120));
        assert_eq!(opts.expiration, None);
        assert_eq!(opts.metadata, Some(json!({"tag": "t"})));
    }

    #[test]
    fn test_keyed_request_flattens_body() {
        let pair: KeyedWriteRequest = serde_json::from_value(json!({
            "key": "k",
            "value": 42,
            "expiration": 1_900_000_000
        }))
        .unwrap();
        let entry = WriteEntry::from(pair);
        assert_eq!(entry.key, "k");
        assert_eq!(entry.value, "42");
        assert_eq!(entry.options.expiration, Some(1_900_000_000));
    }

    #[test]
    fn test_missing_value_is_rejected() {
        assert!(serde_json::from_value::<WriteRequest>(json!({"metadata": {}})).is_err());
    }

    #[test]
    fn test_render_json_and_text() {
        assert_eq!(
            render("k", "{\"a\":1}".into(), ValueType::Json).unwrap(),
            json!({"a": 1})
        );
        assert_eq!(
            render("k", "{\"a\":1}".into(), ValueType::Text).unwrap(),
            json!("{\"a\":1}")
        );

        let err = render("k", "not json".into(), ValueType::Json).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert!(err.body.hint.unwrap().contains("type=text"));
    }

    #[test]
    fn test_batch_request_type_field() {
        let req: BatchRequest =
            serde_json::from_value(json!({"keys": ["a"], "type": "json", "cacheTtl": 300}))
                .unwrap();
        assert_eq!(req.value_type, ValueType::Json);
        assert_eq!(req.cache_ttl, Some(300));
    }
}
