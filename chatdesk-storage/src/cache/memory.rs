//! In-process cache store.
//!
//! Mirrors the semantics of the Redis backend closely enough to run the sync
//! engine without a server: scalar and JSON entries are distinct kinds,
//! increments fail on absent keys, and expiry is evaluated lazily on access
//! against `tokio::time::Instant` so tests can drive it with a paused clock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chatdesk_core::{CacheError, CacheKey, CacheOperation, ChatdeskResult};
use serde_json::Value;
use tokio::time::Instant;

use super::store::{CacheStats, CacheStore, ScalarValue};

#[derive(Debug, Clone, PartialEq)]
enum Stored {
    Scalar(String),
    Json(Value),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Split a JSON path into object field segments. `.` and `$` address the root.
fn path_segments(path: &str) -> Vec<&str> {
    path.trim_start_matches('$')
        .split('.')
        .filter(|s| !s.is_empty())
        .collect()
}

fn lookup<'a>(doc: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    segments.iter().try_fold(doc, |node, seg| node.get(*seg))
}

fn lookup_mut<'a>(doc: &'a mut Value, segments: &[&str]) -> Option<&'a mut Value> {
    segments
        .iter()
        .try_fold(doc, |node, seg| node.get_mut(*seg))
}

fn failed(operation: CacheOperation, key: &CacheKey, reason: impl Into<String>) -> CacheError {
    CacheError::OperationFailed {
        operation,
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn poisoned() -> CacheError {
    CacheError::Connection {
        reason: "in-memory cache lock poisoned".to_string(),
    }
}

/// Cache store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current usage statistics.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let entry_count = self
            .entries
            .read()
            .map(|m| m.values().filter(|e| e.is_live(now)).count() as u64)
            .unwrap_or(0);
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            entry_count,
        }
    }

    /// Remaining time to live of a key, `None` when absent or persistent.
    pub fn ttl(&self, key: &CacheKey) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().ok()?;
        let entry = entries.get(key.as_str()).filter(|e| e.is_live(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }

    /// Whether a live entry exists for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        let now = Instant::now();
        self.entries
            .read()
            .map(|m| m.get(key.as_str()).is_some_and(|e| e.is_live(now)))
            .unwrap_or(false)
    }

    fn record_read<T>(&self, found: &Option<T>) {
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn live_entry(&self, key: &CacheKey) -> Result<Option<Entry>, CacheError> {
        let now = Instant::now();
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries
            .get(key.as_str())
            .filter(|e| e.is_live(now))
            .cloned())
    }

    fn read_json_path(
        &self,
        operation: CacheOperation,
        key: &CacheKey,
        path: &str,
    ) -> Result<Option<Value>, CacheError> {
        match self.live_entry(key)? {
            None => Ok(None),
            Some(Entry {
                value: Stored::Scalar(_),
                ..
            }) => Err(failed(operation, key, "WRONGTYPE key holds a scalar value")),
            Some(Entry {
                value: Stored::Json(doc),
                ..
            }) => Ok(lookup(&doc, &path_segments(path)).cloned()),
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> ChatdeskResult<Option<String>> {
        let found = match self.live_entry(key)? {
            None => None,
            Some(Entry {
                value: Stored::Scalar(s),
                ..
            }) => Some(s),
            Some(_) => {
                return Err(failed(
                    CacheOperation::Get,
                    key,
                    "WRONGTYPE key holds a JSON document",
                )
                .into())
            }
        };
        self.record_read(&found);
        Ok(found)
    }

    async fn get_json(&self, key: &CacheKey, path: &str) -> ChatdeskResult<Option<Value>> {
        let found = self.read_json_path(CacheOperation::GetJson, key, path)?;
        self.record_read(&found);
        Ok(found)
    }

    async fn get_multiple(
        &self,
        keys: &[CacheKey],
        path: &str,
    ) -> ChatdeskResult<Vec<Option<Value>>> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            // JSON.MGET yields nil for keys of another kind rather than failing.
            let found = self
                .read_json_path(CacheOperation::GetMultiple, key, path)
                .unwrap_or(None);
            self.record_read(&found);
            results.push(found);
        }
        Ok(results)
    }

    async fn set(&self, key: &CacheKey, value: &ScalarValue) -> ChatdeskResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Scalar(value.to_string()),
                expires_at: None,
            },
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn set_json(&self, key: &CacheKey, path: &str, value: &Value) -> ChatdeskResult<()> {
        let now = Instant::now();
        let segments = path_segments(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;

        let Some((last, parents)) = segments.split_last() else {
            // Root writes replace the document and keep any expiry.
            let expires_at = entries
                .get(key.as_str())
                .filter(|e| e.is_live(now))
                .and_then(|e| e.expires_at);
            entries.insert(
                key.to_string(),
                Entry {
                    value: Stored::Json(value.clone()),
                    expires_at,
                },
            );
            self.writes.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        };

        let entry = entries
            .get_mut(key.as_str())
            .filter(|e| e.is_live(now))
            .ok_or_else(|| {
                failed(
                    CacheOperation::SetJson,
                    key,
                    "new documents must be created at the root",
                )
            })?;
        let Stored::Json(doc) = &mut entry.value else {
            return Err(failed(
                CacheOperation::SetJson,
                key,
                "WRONGTYPE key holds a scalar value",
            )
            .into());
        };
        let parent = lookup_mut(doc, parents)
            .and_then(Value::as_object_mut)
            .ok_or_else(|| failed(CacheOperation::SetJson, key, "path does not exist"))?;
        parent.insert((*last).to_string(), value.clone());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn set_json_nx(&self, key: &CacheKey, value: &Value) -> ChatdeskResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        if entries.get(key.as_str()).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Stored::Json(value.clone()),
                expires_at: None,
            },
        );
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    async fn increment(&self, key: &CacheKey, path: &str, by: i64) -> ChatdeskResult<i64> {
        let now = Instant::now();
        let segments = path_segments(path);
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let entry = entries
            .get_mut(key.as_str())
            .filter(|e| e.is_live(now))
            .ok_or_else(|| {
                failed(
                    CacheOperation::Increment,
                    key,
                    "could not perform this operation on a key that doesn't exist",
                )
            })?;
        let Stored::Json(doc) = &mut entry.value else {
            return Err(failed(
                CacheOperation::Increment,
                key,
                "WRONGTYPE key holds a scalar value",
            )
            .into());
        };
        let slot = lookup_mut(doc, &segments)
            .ok_or_else(|| failed(CacheOperation::Increment, key, "path does not exist"))?;
        let current = slot
            .as_i64()
            .ok_or_else(|| failed(CacheOperation::Increment, key, "value is not an integer"))?;
        let next = current + by;
        *slot = Value::from(next);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(next)
    }

    async fn set_expiry(&self, key: &CacheKey, ttl: Duration) -> ChatdeskResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        match entries.get_mut(key.as_str()).filter(|e| e.is_live(now)) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
