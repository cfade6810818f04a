//! Cache store trait.
//!
//! The operation set is closed: every backend exposes exactly the operations
//! listed in [`CacheOperation`](chatdesk_core::CacheOperation), one trait method each.

use async_trait::async_trait;
use chatdesk_core::{CacheKey, ChatdeskResult};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// A value written with the scalar SET operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarValue {
    Text(String),
    Integer(i64),
}

impl ScalarValue {
    /// Scalar form of a JSON value, if it has one.
    ///
    /// Only strings and integers are scalars.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(ScalarValue::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(ScalarValue::Integer),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Text(s) => f.write_str(s),
            ScalarValue::Integer(i) => write!(f, "{}", i),
        }
    }
}

/// Key-value cache with JSON document support.
///
/// Reads of absent keys return `Ok(None)`. Implementations must be safe to
/// share across tasks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `GET`: read a scalar value.
    async fn get(&self, key: &CacheKey) -> ChatdeskResult<Option<String>>;

    /// `GET_JSON`: read the JSON value at `path` of a document.
    async fn get_json(&self, key: &CacheKey, path: &str) -> ChatdeskResult<Option<Value>>;

    /// `GET_MULTIPLE`: read `path` of several documents.
    ///
    /// Returns exactly one entry per key, in the order of `keys`.
    async fn get_multiple(
        &self,
        keys: &[CacheKey],
        path: &str,
    ) -> ChatdeskResult<Vec<Option<Value>>>;

    /// `SET`: write a scalar value.
    async fn set(&self, key: &CacheKey, value: &ScalarValue) -> ChatdeskResult<()>;

    /// `SET_JSON`: write a JSON value at `path`, creating the document at the root.
    async fn set_json(&self, key: &CacheKey, path: &str, value: &Value) -> ChatdeskResult<()>;

    /// `SET_JSON_NX`: create a document only if the key is absent.
    ///
    /// Returns whether the write happened.
    async fn set_json_nx(&self, key: &CacheKey, value: &Value) -> ChatdeskResult<bool>;

    /// `INCREMENT`: add `by` to the number at `path` and return the new value.
    ///
    /// Fails when the key or path does not exist.
    async fn increment(&self, key: &CacheKey, path: &str, by: i64) -> ChatdeskResult<i64>;

    /// `SET_EXPIRY`: expire an existing key after `ttl`.
    ///
    /// Returns false when the key does not exist.
    async fn set_expiry(&self, key: &CacheKey, ttl: Duration) -> ChatdeskResult<bool>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of reads that found a value.
    pub hits: u64,
    /// Number of reads that found nothing.
    pub misses: u64,
    /// Number of writes.
    pub writes: u64,
    /// Number of entries currently held.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_selection() {
        assert_eq!(
            ScalarValue::from_json(&json!("abc")),
            Some(ScalarValue::Text("abc".to_string()))
        );
        assert_eq!(ScalarValue::from_json(&json!(42)), Some(ScalarValue::Integer(42)));
        assert_eq!(ScalarValue::from_json(&json!(1.5)), None);
        assert_eq!(ScalarValue::from_json(&json!(true)), None);
        assert_eq!(ScalarValue::from_json(&json!({"id": 1})), None);
        assert_eq!(ScalarValue::from_json(&json!([1, 2])), None);
    }

    #[test]
    fn test_scalar_display() {
        assert_eq!(ScalarValue::Integer(-7).to_string(), "-7");
        assert_eq!(ScalarValue::Text("x y".to_string()).to_string(), "x y");
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.75).abs() < f64::EPSILON);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
