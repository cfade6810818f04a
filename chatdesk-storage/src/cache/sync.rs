//! Read-through sync engine.
//!
//! A sync loads an entity from the relational store, enriches it from the
//! search index, shapes the payload and writes it back to the cache under
//! the entity key. When neither source knows the entity nothing is written
//! and the caller sees `None`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chatdesk_core::{CacheError, CacheKey, ChatdeskResult, SyncConfig, JSON_ROOT_PATH};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;

use super::getter::{decode_cached, BatchGetter, CacheEncoding, Getter};
use super::single_flight::SingleFlight;
use super::store::{CacheStore, ScalarValue};
use crate::handles::ConnectionHandles;

/// Per-call sync options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Expiry applied after the write. `None` leaves the key persistent.
    pub ttl: Option<Duration>,
}

impl SyncOptions {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl: Some(ttl) }
    }
}

fn serialization_error(key: &CacheKey, e: serde_json::Error) -> CacheError {
    CacheError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    }
}

/// Write a payload under `key` with the command matching how it is read
/// back: JSON payloads as a document at the root, scalar payloads with `SET`.
/// The expiry is a separate call, so a crash between the two leaves the key
/// without one.
async fn write_payload(
    cache: &dyn CacheStore,
    key: &CacheKey,
    value: &Value,
    encoding: CacheEncoding,
    ttl: Option<Duration>,
) -> ChatdeskResult<()> {
    match encoding {
        CacheEncoding::Json => cache.set_json(key, JSON_ROOT_PATH, value).await?,
        CacheEncoding::Scalar => {
            let scalar = ScalarValue::from_json(value).ok_or_else(|| CacheError::Serialization {
                key: key.to_string(),
                reason: format!("scalar payload must be a string or integer, got {}", value),
            })?;
            cache.set(key, &scalar).await?
        }
    }
    if let Some(ttl) = ttl {
        cache.set_expiry(key, ttl).await?;
    }
    Ok(())
}

/// Drives getters through store, index, payload and cache write.
#[derive(Clone)]
pub struct SyncOrchestrator {
    handles: ConnectionHandles,
    config: SyncConfig,
    flights: Arc<SingleFlight>,
}

impl SyncOrchestrator {
    pub fn new(handles: ConnectionHandles, config: SyncConfig) -> Self {
        Self {
            handles,
            config,
            flights: Arc::new(SingleFlight::new()),
        }
    }

    pub fn handles(&self) -> &ConnectionHandles {
        &self.handles
    }

    /// Cached payload for `key`, syncing it on a miss.
    pub async fn read_through<G: Getter>(
        &self,
        key: &CacheKey,
        getter: &G,
        args: &G::Args,
        options: SyncOptions,
    ) -> ChatdeskResult<Option<G::Payload>> {
        let span = tracing::debug_span!(parent: self.handles.span(), "read_through", key = %key);
        async {
            if let Some(cached) = getter.get_from_cache(self.handles.cache(), key).await? {
                tracing::trace!(key = %key, "Cache hit");
                return Ok(Some(cached));
            }
            tracing::debug!(key = %key, "Data for key not found in cache");
            tracing::debug!(key = %key, "Fetching data from the relational store");
            self.sync(key, getter, args, options).await
        }
        .instrument(span)
        .await
    }

    /// Load the entity from its sources and write it to the cache.
    ///
    /// Concurrent syncs of one key share a single fetch unless single-flight
    /// is disabled.
    pub async fn sync<G: Getter>(
        &self,
        key: &CacheKey,
        getter: &G,
        args: &G::Args,
        options: SyncOptions,
    ) -> ChatdeskResult<Option<G::Payload>> {
        let span = tracing::debug_span!(parent: self.handles.span(), "sync", key = %key);
        let value = if self.config.single_flight {
            self.flights
                .run(key.as_str(), || self.fetch_and_write(key, getter, args, options))
                .instrument(span)
                .await?
        } else {
            self.fetch_and_write(key, getter, args, options)
                .instrument(span)
                .await?
        };

        match value {
            Some(value) => Ok(Some(from_json(key, value)?)),
            None => Ok(None),
        }
    }

    async fn fetch_and_write<G: Getter>(
        &self,
        key: &CacheKey,
        getter: &G,
        args: &G::Args,
        options: SyncOptions,
    ) -> ChatdeskResult<Option<Value>> {
        let db_data = getter.get_from_store(self.handles.store(), args).await?;
        let search = getter
            .get_from_search_index(self.handles.search(), args, db_data.as_ref())
            .await?;

        if db_data.is_none() && search.is_empty() {
            tracing::debug!(key = %key, "Entity not found, skipping cache write");
            return Ok(None);
        }

        let payload = getter.prepare_payload(db_data, search, args);
        let value = to_json(key, &payload)?;
        write_payload(self.handles.cache(), key, &value, G::ENCODING, options.ttl).await?;
        tracing::debug!(key = %key, ttl = ?options.ttl, "Cache synced");
        Ok(Some(value))
    }

    /// Payloads for many ids keyed by id, with one cache round trip and one
    /// store query for the misses. Ids unknown to the store are absent from
    /// the result.
    pub async fn read_through_many<G: BatchGetter>(
        &self,
        getter: &G,
        ids: &[G::Id],
    ) -> ChatdeskResult<BTreeMap<String, G::Payload>> {
        let span = tracing::debug_span!(parent: self.handles.span(), "read_through_many");
        self.fetch_many(getter, ids).instrument(span).await
    }

    async fn fetch_many<G: BatchGetter>(
        &self,
        getter: &G,
        ids: &[G::Id],
    ) -> ChatdeskResult<BTreeMap<String, G::Payload>> {
        let mut found = BTreeMap::new();
        if ids.is_empty() {
            return Ok(found);
        }

        let keys: Vec<CacheKey> = ids.iter().map(|id| getter.key_for(id)).collect();
        let cached = self
            .handles
            .cache()
            .get_multiple(&keys, JSON_ROOT_PATH)
            .await?;
        if cached.len() != keys.len() {
            return Err(CacheError::MultiGetLengthMismatch {
                expected: keys.len(),
                got: cached.len(),
            }
            .into());
        }

        let mut missing = Vec::new();
        let mut seen = HashSet::new();
        for ((id, key), value) in ids.iter().zip(&keys).zip(cached) {
            match value.and_then(|v| decode_cached::<G::Payload>(key, v)) {
                Some(payload) => {
                    found.insert(id.to_string(), payload);
                }
                None => {
                    if seen.insert(id.clone()) {
                        missing.push(id.clone());
                    }
                }
            }
        }

        tracing::debug!(
            requested = ids.len(),
            hits = found.len(),
            misses = missing.len(),
            "Batch cache lookup"
        );
        if missing.is_empty() {
            return Ok(found);
        }

        let loaded = getter
            .get_many_from_store(self.handles.store(), &missing)
            .await?;
        for (id, payload) in loaded {
            if !seen.contains(&id) {
                continue;
            }
            let key = getter.key_for(&id);
            let value = to_json(&key, &payload)?;
            self.handles
                .cache()
                .set_json(&key, JSON_ROOT_PATH, &value)
                .await?;
            found.insert(id.to_string(), payload);
        }
        Ok(found)
    }
}

fn to_json<T: Serialize>(key: &CacheKey, payload: &T) -> Result<Value, CacheError> {
    serde_json::to_value(payload).map_err(|e| serialization_error(key, e))
}

fn from_json<T: DeserializeOwned>(key: &CacheKey, value: Value) -> Result<T, CacheError> {
    serde_json::from_value(value).map_err(|e| serialization_error(key, e))
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .field("in_flight", &self.flights.in_flight())
            .finish()
    }
}
