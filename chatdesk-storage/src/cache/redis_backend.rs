//! Redis cache store.
//!
//! JSON documents use the RedisJSON module commands (`JSON.GET`, `JSON.SET`,
//! `JSON.MGET`, `JSON.NUMINCRBY`) with legacy dot paths, which return single
//! values rather than arrays. Scalars use plain `GET`/`SET`.
//!
//! `ConnectionManager` multiplexes one connection and reconnects on loss, so
//! the store is cheap to clone and needs no pool of its own.

use std::time::Duration;

use async_trait::async_trait;
use chatdesk_core::{CacheConfig, CacheError, CacheKey, CacheOperation, ChatdeskResult};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use serde_json::Value;
use tokio::time::timeout;

use super::store::{CacheStore, ScalarValue};

const HEALTH_CHECK_TIMEOUT_MS: u64 = 1000;

/// Normalize a path to RedisJSON legacy syntax (`counter` → `.counter`).
fn legacy_path(path: &str) -> String {
    if path.starts_with('.') || path.starts_with('$') {
        path.to_string()
    } else {
        format!(".{}", path)
    }
}

fn op_failed(operation: CacheOperation, key: &CacheKey, err: RedisError) -> CacheError {
    CacheError::OperationFailed {
        operation,
        key: key.to_string(),
        reason: err.to_string(),
    }
}

fn decode(key: &CacheKey, raw: Option<String>) -> Result<Option<Value>, CacheError> {
    raw.map(|text| {
        serde_json::from_str(&text).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })
    })
    .transpose()
}

/// Cache store backed by Redis with the RedisJSON module.
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: ConnectionManager,
}

impl RedisCacheStore {
    /// Connect to the server named by the configuration.
    pub async fn connect(config: &CacheConfig) -> ChatdeskResult<Self> {
        let client = Client::open(config.url.as_str()).map_err(|e| CacheError::Connection {
            reason: format!("Failed to create Redis client: {e}"),
        })?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::Connection {
                reason: format!("Failed to connect to Redis: {e}"),
            })?;
        tracing::debug!(url = %config.url, "Connected cache store");
        Ok(Self { connection })
    }

    /// Round-trip a PING within a short deadline.
    pub async fn health_check(&self) -> ChatdeskResult<()> {
        let check = async {
            let mut conn = self.connection.clone();
            let _: String = conn.ping().await.map_err(|e| CacheError::Connection {
                reason: format!("Redis health check failed: {e}"),
            })?;
            Ok::<(), CacheError>(())
        };
        match timeout(Duration::from_millis(HEALTH_CHECK_TIMEOUT_MS), check).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(CacheError::Connection {
                reason: "Redis health check timed out".to_string(),
            }
            .into()),
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &CacheKey) -> ChatdeskResult<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn
            .get(key.as_str())
            .await
            .map_err(|e| op_failed(CacheOperation::Get, key, e))?;
        Ok(value)
    }

    async fn get_json(&self, key: &CacheKey, path: &str) -> ChatdeskResult<Option<Value>> {
        let mut conn = self.connection.clone();
        let raw: Option<String> = redis::cmd("JSON.GET")
            .arg(key.as_str())
            .arg(legacy_path(path))
            .query_async(&mut conn)
            .await
            .map_err(|e| op_failed(CacheOperation::GetJson, key, e))?;
        Ok(decode(key, raw)?)
    }

    async fn get_multiple(
        &self,
        keys: &[CacheKey],
        path: &str,
    ) -> ChatdeskResult<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection.clone();
        let mut cmd = redis::cmd("JSON.MGET");
        for key in keys {
            cmd.arg(key.as_str());
        }
        cmd.arg(legacy_path(path));
        let raw: Vec<Option<String>> = cmd.query_async(&mut conn).await.map_err(|e| {
            CacheError::OperationFailed {
                operation: CacheOperation::GetMultiple,
                key: keys
                    .iter()
                    .map(CacheKey::as_str)
                    .collect::<Vec<_>>()
                    .join(","),
                reason: e.to_string(),
            }
        })?;
        if raw.len() != keys.len() {
            return Err(CacheError::MultiGetLengthMismatch {
                expected: keys.len(),
                got: raw.len(),
            }
            .into());
        }
        keys.iter()
            .zip(raw)
            .map(|(key, value)| decode(key, value).map_err(Into::into))
            .collect()
    }

    async fn set(&self, key: &CacheKey, value: &ScalarValue) -> ChatdeskResult<()> {
        let mut conn = self.connection.clone();
        let result: Result<(), RedisError> = match value {
            ScalarValue::Text(s) => conn.set(key.as_str(), s.as_str()).await,
            ScalarValue::Integer(i) => conn.set(key.as_str(), *i).await,
        };
        result.map_err(|e| op_failed(CacheOperation::Set, key, e))?;
        Ok(())
    }

    async fn set_json(&self, key: &CacheKey, path: &str, value: &Value) -> ChatdeskResult<()> {
        let mut conn = self.connection.clone();
        let body = serde_json::to_string(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let _: Option<String> = redis::cmd("JSON.SET")
            .arg(key.as_str())
            .arg(legacy_path(path))
            .arg(body)
            .query_async(&mut conn)
            .await
            .map_err(|e| op_failed(CacheOperation::SetJson, key, e))?;
        Ok(())
    }

    async fn set_json_nx(&self, key: &CacheKey, value: &Value) -> ChatdeskResult<bool> {
        let mut conn = self.connection.clone();
        let body = serde_json::to_string(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        // Replies OK when written, nil when the key already existed.
        let reply: Option<String> = redis::cmd("JSON.SET")
            .arg(key.as_str())
            .arg(".")
            .arg(body)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(|e| op_failed(CacheOperation::SetJsonNx, key, e))?;
        Ok(reply.is_some())
    }

    async fn increment(&self, key: &CacheKey, path: &str, by: i64) -> ChatdeskResult<i64> {
        let mut conn = self.connection.clone();
        let reply: String = redis::cmd("JSON.NUMINCRBY")
            .arg(key.as_str())
            .arg(legacy_path(path))
            .arg(by)
            .query_async(&mut conn)
            .await
            .map_err(|e| op_failed(CacheOperation::Increment, key, e))?;
        reply
            .trim()
            .parse::<i64>()
            .map_err(|e| {
                CacheError::OperationFailed {
                    operation: CacheOperation::Increment,
                    key: key.to_string(),
                    reason: format!("non-integer reply {reply:?}: {e}"),
                }
                .into()
            })
    }

    async fn set_expiry(&self, key: &CacheKey, ttl: Duration) -> ChatdeskResult<bool> {
        let mut conn = self.connection.clone();
        let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let applied: bool = conn
            .expire(key.as_str(), seconds)
            .await
            .map_err(|e| op_failed(CacheOperation::SetExpiry, key, e))?;
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_core::KeyTemplate;

    #[test]
    fn test_legacy_path() {
        assert_eq!(legacy_path("."), ".");
        assert_eq!(legacy_path("counter"), ".counter");
        assert_eq!(legacy_path(".counter"), ".counter");
        assert_eq!(legacy_path("$.counter"), "$.counter");
    }

    #[test]
    fn test_decode() {
        let key = KeyTemplate::AccountData.key(1);
        assert_eq!(decode(&key, None).unwrap(), None);
        assert_eq!(
            decode(&key, Some("{\"id\":1}".to_string())).unwrap(),
            Some(serde_json::json!({"id": 1}))
        );
        assert!(matches!(
            decode(&key, Some("{oops".to_string())),
            Err(CacheError::Serialization { .. })
        ));
    }
}
