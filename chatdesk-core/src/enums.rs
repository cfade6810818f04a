//! Closed enumerations shared across the data access layer.

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CACHE OPERATIONS
// ============================================================================

/// The closed set of operations the cache store exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheOperation {
    /// Scalar read
    Get,
    /// JSON document read at a path
    GetJson,
    /// Batched JSON read, one result per key in input order
    GetMultiple,
    /// Scalar write
    Set,
    /// JSON document write at a path
    SetJson,
    /// JSON document write only when the key is absent
    SetJsonNx,
    /// Numeric increment of a JSON field
    Increment,
    /// Expiry on an existing key
    SetExpiry,
}

impl CacheOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheOperation::Get => "GET",
            CacheOperation::GetJson => "GET_JSON",
            CacheOperation::GetMultiple => "GET_MULTIPLE",
            CacheOperation::Set => "SET",
            CacheOperation::SetJson => "SET_JSON",
            CacheOperation::SetJsonNx => "SET_JSON_NX",
            CacheOperation::Increment => "INCREMENT",
            CacheOperation::SetExpiry => "SET_EXPIRY",
        }
    }
}

impl fmt::Display for CacheOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// DATABASE KIND
// ============================================================================

/// Relational backends the connector can be built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DatabaseKind {
    #[default]
    Postgres,
}

impl DatabaseKind {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "PostgreSQL",
        }
    }

    /// Parse a configured database name. An empty string selects the default.
    pub fn from_db_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "" | "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            _ => Err(ConfigError::UnsupportedDatabase {
                database: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for DatabaseKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

// ============================================================================
// VARIABLES
// ============================================================================

/// Value format of an account variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VariableFormat {
    Name,
    Email,
    Phone,
    Number,
    #[default]
    Text,
    Date,
    Regex,
    Boolean,
}

impl VariableFormat {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            VariableFormat::Name => "name",
            VariableFormat::Email => "email",
            VariableFormat::Phone => "phone",
            VariableFormat::Number => "number",
            VariableFormat::Text => "text",
            VariableFormat::Date => "date",
            VariableFormat::Regex => "regex",
            VariableFormat::Boolean => "boolean",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, VariableFormatParseError> {
        match s.to_lowercase().as_str() {
            "name" => Ok(VariableFormat::Name),
            "email" => Ok(VariableFormat::Email),
            "phone" => Ok(VariableFormat::Phone),
            "number" => Ok(VariableFormat::Number),
            "text" => Ok(VariableFormat::Text),
            "date" => Ok(VariableFormat::Date),
            "regex" => Ok(VariableFormat::Regex),
            "boolean" => Ok(VariableFormat::Boolean),
            _ => Err(VariableFormatParseError(s.to_string())),
        }
    }

    /// Field of a search-index variable document holding a value of this format.
    ///
    /// Regex variables have no typed slot in the index.
    pub fn value_key(&self) -> Option<ValueKey> {
        match self {
            VariableFormat::Text
            | VariableFormat::Name
            | VariableFormat::Email
            | VariableFormat::Phone => Some(ValueKey::Value),
            VariableFormat::Date => Some(ValueKey::ValueDate),
            VariableFormat::Number => Some(ValueKey::ValueDouble),
            VariableFormat::Boolean => Some(ValueKey::ValueBoolean),
            VariableFormat::Regex => None,
        }
    }
}

impl fmt::Display for VariableFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl FromStr for VariableFormat {
    type Err = VariableFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid variable format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableFormatParseError(pub String);

impl fmt::Display for VariableFormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid variable format: {}", self.0)
    }
}

impl std::error::Error for VariableFormatParseError {}

/// Typed value slot of a search-index variable document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKey {
    Value,
    ValueDate,
    ValueDouble,
    ValueBoolean,
}

impl ValueKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKey::Value => "value",
            ValueKey::ValueDate => "value_date",
            ValueKey::ValueDouble => "value_double",
            ValueKey::ValueBoolean => "value_boolean",
        }
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CHANNELS
// ============================================================================

/// Messaging channel a bot is deployed on, keyed by its store id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    Web,
    FacebookMessenger,
    WhatsApp,
    Instagram,
}

impl Channel {
    pub fn id(&self) -> i64 {
        match self {
            Channel::Web => 1,
            Channel::FacebookMessenger => 2,
            Channel::WhatsApp => 3,
            Channel::Instagram => 4,
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Channel::Web),
            2 => Some(Channel::FacebookMessenger),
            3 => Some(Channel::WhatsApp),
            4 => Some(Channel::Instagram),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_kind_default_and_aliases() {
        assert_eq!(DatabaseKind::from_db_str("").unwrap(), DatabaseKind::Postgres);
        assert_eq!(
            DatabaseKind::from_db_str("PostgreSQL").unwrap(),
            DatabaseKind::Postgres
        );
        assert_eq!("postgres".parse::<DatabaseKind>().unwrap(), DatabaseKind::Postgres);
    }

    #[test]
    fn test_database_kind_rejects_unknown() {
        let err = DatabaseKind::from_db_str("Oracle").unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnsupportedDatabase {
                database: "Oracle".to_string()
            }
        );
    }

    #[test]
    fn test_value_key_per_format() {
        assert_eq!(VariableFormat::Text.value_key(), Some(ValueKey::Value));
        assert_eq!(VariableFormat::Phone.value_key(), Some(ValueKey::Value));
        assert_eq!(VariableFormat::Date.value_key(), Some(ValueKey::ValueDate));
        assert_eq!(VariableFormat::Number.value_key(), Some(ValueKey::ValueDouble));
        assert_eq!(VariableFormat::Boolean.value_key(), Some(ValueKey::ValueBoolean));
        assert_eq!(VariableFormat::Regex.value_key(), None);
    }

    #[test]
    fn test_variable_format_roundtrips_db_str() {
        for format in [
            VariableFormat::Name,
            VariableFormat::Email,
            VariableFormat::Phone,
            VariableFormat::Number,
            VariableFormat::Text,
            VariableFormat::Date,
            VariableFormat::Regex,
            VariableFormat::Boolean,
        ] {
            assert_eq!(VariableFormat::from_db_str(format.as_db_str()).unwrap(), format);
        }
        assert!(VariableFormat::from_db_str("currency").is_err());
    }

    #[test]
    fn test_cache_operation_serializes_screaming_snake() {
        let json = serde_json::to_string(&CacheOperation::SetJsonNx).unwrap();
        assert_eq!(json, "\"SET_JSON_NX\"");
        assert_eq!(CacheOperation::SetExpiry.to_string(), "SET_EXPIRY");
    }

    #[test]
    fn test_channel_ids() {
        assert_eq!(Channel::from_id(2), Some(Channel::FacebookMessenger));
        assert_eq!(Channel::FacebookMessenger.id(), 2);
        assert_eq!(Channel::from_id(99), None);
    }
}
