//! Entity fetch strategies plugged into the sync engine.

use async_trait::async_trait;
use chatdesk_core::{CacheKey, ChatdeskResult, JSON_ROOT_PATH};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;
use std::hash::Hash;

use super::store::CacheStore;
use crate::relational::RelationalStore;
use crate::search::{SearchIndex, SearchResult};

/// How a payload is held in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheEncoding {
    /// JSON document read with `GET_JSON` at the root
    #[default]
    Json,
    /// Plain value read with `GET`
    Scalar,
}

/// Fetch strategy for one entity type.
///
/// `prepare_payload` is the only place a payload is shaped, so values read
/// back from the cache have the same shape as values returned by a sync.
#[async_trait]
pub trait Getter: Send + Sync {
    /// Identifying arguments of one fetch.
    type Args: Send + Sync;
    /// Store result handed to the index fetch and the payload step.
    type Raw: Send + Sync;
    type Payload: Serialize + DeserializeOwned + Send + Sync;

    const ENCODING: CacheEncoding = CacheEncoding::Json;

    /// Cached payload, `None` on a miss.
    async fn get_from_cache(
        &self,
        cache: &dyn CacheStore,
        key: &CacheKey,
    ) -> ChatdeskResult<Option<Self::Payload>> {
        read_cached(cache, key, Self::ENCODING).await
    }

    /// Store data, `None` when the entity does not exist.
    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        args: &Self::Args,
    ) -> ChatdeskResult<Option<Self::Raw>>;

    /// Supplementary index data. Entities without an index dependency keep
    /// the default empty result.
    async fn get_from_search_index(
        &self,
        _index: &dyn SearchIndex,
        _args: &Self::Args,
        _db_data: Option<&Self::Raw>,
    ) -> ChatdeskResult<SearchResult> {
        Ok(SearchResult::empty())
    }

    /// Shape the payload. Pure and deterministic.
    fn prepare_payload(
        &self,
        raw: Option<Self::Raw>,
        search: SearchResult,
        args: &Self::Args,
    ) -> Self::Payload;
}

/// Fetch strategy for entities read many keys at a time.
#[async_trait]
pub trait BatchGetter: Send + Sync {
    type Id: Clone + Eq + Hash + Display + Send + Sync;
    type Payload: Serialize + DeserializeOwned + Send + Sync;

    fn key_for(&self, id: &Self::Id) -> CacheKey;

    /// One batched store query for `ids`, reshaped per id. Ids with no data
    /// are left out; order is not significant.
    async fn get_many_from_store(
        &self,
        store: &dyn RelationalStore,
        ids: &[Self::Id],
    ) -> ChatdeskResult<Vec<(Self::Id, Self::Payload)>>;
}

/// Whether a cached value counts as absent.
pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Decode a cached JSON value. Values that no longer fit the payload type
/// are reported and treated as a miss so the next sync overwrites them.
pub(crate) fn decode_cached<T: DeserializeOwned>(key: &CacheKey, value: Value) -> Option<T> {
    if is_empty_value(&value) {
        return None;
    }
    match serde_json::from_value(value) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Cached value does not decode, treating as miss");
            None
        }
    }
}

/// Decode a scalar read back from `GET`. Text payloads decode as strings,
/// numeric payloads from their JSON form.
pub(crate) fn decode_scalar<T: DeserializeOwned>(key: &CacheKey, raw: String) -> Option<T> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(payload) = serde_json::from_value(Value::String(raw.clone())) {
        return Some(payload);
    }
    match serde_json::from_str(&raw) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Cached scalar does not decode, treating as miss");
            None
        }
    }
}

/// Read a payload from the cache using the given encoding.
pub async fn read_cached<T: DeserializeOwned>(
    cache: &dyn CacheStore,
    key: &CacheKey,
    encoding: CacheEncoding,
) -> ChatdeskResult<Option<T>> {
    Ok(match encoding {
        CacheEncoding::Json => cache
            .get_json(key, JSON_ROOT_PATH)
            .await?
            .and_then(|value| decode_cached(key, value)),
        CacheEncoding::Scalar => cache
            .get(key)
            .await?
            .and_then(|raw| decode_scalar(key, raw)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_core::KeyTemplate;
    use serde_json::json;

    #[test]
    fn test_empty_values() {
        assert!(is_empty_value(&Value::Null));
        assert!(is_empty_value(&json!({})));
        assert!(is_empty_value(&json!("")));
        assert!(is_empty_value(&json!([])));
        assert!(!is_empty_value(&json!(0)));
        assert!(!is_empty_value(&json!({"id": 1})));
    }

    #[test]
    fn test_decode_scalar_text_and_integer() {
        let key = KeyTemplate::OutboundRemainingBalance.key(1);
        assert_eq!(decode_scalar::<String>(&key, "42".to_string()), Some("42".to_string()));
        assert_eq!(decode_scalar::<i64>(&key, "42".to_string()), Some(42));
        assert_eq!(decode_scalar::<i64>(&key, "abc".to_string()), None);
        assert_eq!(decode_scalar::<String>(&key, String::new()), None);
    }

    #[test]
    fn test_decode_cached_shape_mismatch_is_miss() {
        #[derive(Debug, serde::Deserialize)]
        struct Shape {
            #[allow(dead_code)]
            id: i64,
        }
        let key = KeyTemplate::AccountData.key(1);
        assert!(decode_cached::<Shape>(&key, json!({"id": 1})).is_some());
        assert!(decode_cached::<Shape>(&key, json!({"name": "x"})).is_none());
        assert!(decode_cached::<Shape>(&key, json!({})).is_none());
    }
}
