//! Environment-driven configuration.

use crate::{ConfigError, DatabaseKind};
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

// ============================================================================
// RELATIONAL STORE
// ============================================================================

/// Relational store connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub kind: DatabaseKind,
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait timeout for a pooled connection
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            kind: DatabaseKind::Postgres,
            host: "localhost".to_string(),
            port: 5432,
            dbname: "chatdesk".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Read from `CHATDESK_DB_*`. Fails only on an unsupported database kind.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            kind: DatabaseKind::from_db_str(&env_string("CHATDESK_DB_KIND", ""))?,
            host: env_string("CHATDESK_DB_HOST", &defaults.host),
            port: env_or("CHATDESK_DB_PORT", defaults.port),
            dbname: env_string("CHATDESK_DB_NAME", &defaults.dbname),
            user: env_string("CHATDESK_DB_USER", &defaults.user),
            password: std::env::var("CHATDESK_DB_PASSWORD").unwrap_or_default(),
            max_size: env_or("CHATDESK_DB_POOL_SIZE", defaults.max_size),
            timeout: Duration::from_secs(env_or("CHATDESK_DB_TIMEOUT", 30)),
        })
    }

    /// Connection URL for the configured backend.
    pub fn connection_url(&self) -> String {
        match self.kind {
            DatabaseKind::Postgres => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.user, self.password, self.host, self.port, self.dbname
            ),
        }
    }
}

// ============================================================================
// CACHE AND SEARCH
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub url: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self {
            url: env_string("CHATDESK_CACHE_URL", &Self::default().url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchConfig {
    pub url: String,
    pub outbound_messages_index: String,
    pub visitor_variables_index: String,
    pub conversations_index: String,
    pub timeout: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:9200".to_string(),
            outbound_messages_index: "outbound_messages".to_string(),
            visitor_variables_index: "visitor_variables".to_string(),
            conversations_index: "conversations".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            url: env_string("CHATDESK_SEARCH_URL", &defaults.url),
            outbound_messages_index: env_string(
                "CHATDESK_SEARCH_OUTBOUND_INDEX",
                &defaults.outbound_messages_index,
            ),
            visitor_variables_index: env_string(
                "CHATDESK_SEARCH_VISITOR_INDEX",
                &defaults.visitor_variables_index,
            ),
            conversations_index: env_string(
                "CHATDESK_SEARCH_CONVERSATION_INDEX",
                &defaults.conversations_index,
            ),
            timeout: Duration::from_secs(env_or("CHATDESK_SEARCH_TIMEOUT", 10)),
        }
    }
}

// ============================================================================
// SYNC AND VISITORS
// ============================================================================

/// Read-through behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Share one store fetch among concurrent syncs of the same key
    pub single_flight: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            single_flight: true,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            single_flight: env_or("CHATDESK_SYNC_SINGLE_FLIGHT", true),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitorConfig {
    /// Expiry applied to cached visitor records
    pub key_ttl: Duration,
    pub name_prefix: String,
    /// Highest sequence number before the default-name series advances
    pub max_series_no: u64,
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            key_ttl: Duration::from_secs(604_800),
            name_prefix: "Visitor".to_string(),
            max_series_no: 9999,
        }
    }
}

impl VisitorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            key_ttl: Duration::from_secs(env_or(
                "CHATDESK_VISITOR_KEY_TTL_SECS",
                defaults.key_ttl.as_secs(),
            )),
            name_prefix: env_string("CHATDESK_VISITOR_NAME_PREFIX", &defaults.name_prefix),
            max_series_no: env_or("CHATDESK_VISITOR_MAX_SERIES_NO", defaults.max_series_no),
        }
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatdeskConfig {
    pub db: DbConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub sync: SyncConfig,
    pub visitor: VisitorConfig,
}

impl ChatdeskConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            db: DbConfig::from_env()?,
            cache: CacheConfig::from_env(),
            search: SearchConfig::from_env(),
            sync: SyncConfig::from_env(),
            visitor: VisitorConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db.max_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CHATDESK_DB_POOL_SIZE".to_string(),
                value: "0".to_string(),
                reason: "pool size must be positive".to_string(),
            });
        }
        if self.visitor.max_series_no == 0 {
            return Err(ConfigError::InvalidValue {
                field: "CHATDESK_VISITOR_MAX_SERIES_NO".to_string(),
                value: "0".to_string(),
                reason: "series size must be positive".to_string(),
            });
        }
        if self.cache.url.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "CHATDESK_CACHE_URL".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        previous: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            Self { key, previous }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match &self.previous {
                Some(value) => std::env::set_var(self.key, value),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(ChatdeskConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_pool_size_rejected() {
        let mut config = ChatdeskConfig::default();
        config.db.max_size = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_zero_series_rejected() {
        let mut config = ChatdeskConfig::default();
        config.visitor.max_series_no = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_connection_url() {
        let config = DbConfig {
            user: "app".to_string(),
            password: "secret".to_string(),
            host: "db".to_string(),
            ..DbConfig::default()
        };
        assert_eq!(config.connection_url(), "postgres://app:secret@db:5432/chatdesk");
    }

    #[test]
    fn test_visitor_config_from_env() {
        let _ttl = EnvVarGuard::set("CHATDESK_VISITOR_KEY_TTL_SECS", "60");
        let _prefix = EnvVarGuard::set("CHATDESK_VISITOR_NAME_PREFIX", "Guest");
        let _max = EnvVarGuard::set("CHATDESK_VISITOR_MAX_SERIES_NO", "not-a-number");

        let config = VisitorConfig::from_env();
        assert_eq!(config.key_ttl, Duration::from_secs(60));
        assert_eq!(config.name_prefix, "Guest");
        assert_eq!(config.max_series_no, 9999);
    }

    #[test]
    fn test_unsupported_database_kind_from_env() {
        let _kind = EnvVarGuard::set("CHATDESK_DB_KIND", "MySQL");
        let err = DbConfig::from_env().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnsupportedDatabase {
                database: "MySQL".to_string()
            }
        );
    }
}
