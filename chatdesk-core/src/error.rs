//! Error types for Chatdesk data access operations

use crate::CacheOperation;
use thiserror::Error;

/// Relational store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Connection pool unavailable: {reason}")]
    PoolUnavailable { reason: String },

    #[error("Query {query} failed: {reason}")]
    QueryFailed { query: String, reason: String },

    #[error("Row decode failed for {query}: {reason}")]
    RowDecode { query: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Cache store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache connection failed: {reason}")]
    Connection { reason: String },

    #[error("Cache {operation} on {key} failed: {reason}")]
    OperationFailed {
        operation: CacheOperation,
        key: String,
        reason: String,
    },

    #[error("Multi-get returned {got} results for {expected} keys")]
    MultiGetLengthMismatch { expected: usize, got: usize },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Search index errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SearchError {
    #[error("Request to index {index} failed with status {status}: {reason}")]
    RequestFailed {
        index: String,
        status: u16,
        reason: String,
    },

    #[error("Transport error talking to index {index}: {reason}")]
    Transport { index: String, reason: String },

    #[error("Invalid response from index {index}: {reason}")]
    InvalidResponse { index: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported database: {database}")]
    UnsupportedDatabase { database: String },
}

/// Master error type for all Chatdesk data access errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatdeskError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Chatdesk operations.
pub type ChatdeskResult<T> = Result<T, ChatdeskError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_query_failed() {
        let err = StorageError::QueryFailed {
            query: "account_details".to_string(),
            reason: "relation does not exist".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("account_details"));
        assert!(msg.contains("relation does not exist"));
    }

    #[test]
    fn test_cache_error_display_names_operation() {
        let err = CacheError::OperationFailed {
            operation: CacheOperation::SetJson,
            key: "account:42".to_string(),
            reason: "READONLY".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("SET_JSON"));
        assert!(msg.contains("account:42"));
    }

    #[test]
    fn test_multi_get_mismatch_display() {
        let err = CacheError::MultiGetLengthMismatch {
            expected: 3,
            got: 2,
        };
        assert_eq!(
            format!("{}", err),
            "Multi-get returned 2 results for 3 keys"
        );
    }

    #[test]
    fn test_config_error_unsupported_database() {
        let err = ConfigError::UnsupportedDatabase {
            database: "Oracle".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Unsupported database"));
        assert!(msg.contains("Oracle"));
    }

    #[test]
    fn test_master_error_from_variants() {
        let err: ChatdeskError = SearchError::InvalidResponse {
            index: "visitors".to_string(),
            reason: "missing hits".to_string(),
        }
        .into();
        assert!(matches!(err, ChatdeskError::Search(_)));
        assert!(format!("{}", err).starts_with("Search error:"));

        let err: ChatdeskError = ConfigError::MissingRequired {
            field: "CHATDESK_DB_HOST".to_string(),
        }
        .into();
        assert!(matches!(err, ChatdeskError::Config(_)));
    }
}
