//! Resolution of search-index variable names to account variable patterns.

use crate::{ValueKey, VariableFormat, VariableRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account variables keyed by their pattern (`parameter`).
pub type VariableMap = BTreeMap<String, VariableRow>;

/// Normalized name that always resolves to a date.
pub const CONVERSATION_CREATED_AT: &str = "conversation_created_at";

/// Search-index prefix of contact (visitor) variables.
pub const CONTACT_PREFIX: &str = "visitor_";

/// Search-index prefix of conversation variables.
pub const CONVERSATION_PREFIX: &str = "conversation_";

const CONTACT_PATTERN_OPEN: &str = "¿·$user.info.";
const CONVERSATION_PATTERN_OPEN: &str = "¿·";
const PATTERN_CLOSE: &str = "·?";

/// Format and index value slot of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    #[serde(rename = "type")]
    pub format: VariableFormat,
    pub value_key: Option<ValueKey>,
}

/// Pattern of a contact variable, e.g. `phone` → `¿·$user.info.phone·?`.
pub fn contact_pattern(name: &str) -> String {
    format!("{}{}{}", CONTACT_PATTERN_OPEN, name, PATTERN_CLOSE)
}

/// Derive the pattern for a normalized name.
///
/// `visitor_phone_ok` → `¿·$user.info.phone_ok·?`, `conversation_topic` →
/// `¿·topic·?`. Names with neither prefix are returned unchanged.
pub fn parameter_pattern(normalized: &str) -> String {
    if normalized.starts_with(CONTACT_PREFIX) {
        return contact_pattern(&normalized.replace(CONTACT_PREFIX, ""));
    }
    if normalized.starts_with(CONVERSATION_PREFIX) {
        return format!(
            "{}{}{}",
            CONVERSATION_PATTERN_OPEN,
            normalized.replace(CONVERSATION_PREFIX, ""),
            PATTERN_CLOSE
        );
    }
    normalized.to_string()
}

/// Find the pattern whose definition carries `normalized` as its normalized name.
///
/// When several definitions match, the last one in key order wins.
pub fn pattern_for_normalized<'a>(variables: &'a VariableMap, normalized: &str) -> Option<&'a str> {
    variables
        .iter()
        .filter(|(_, v)| v.normalized_parameter == normalized)
        .map(|(k, _)| k.as_str())
        .last()
}

/// Resolve a normalized name to its format and index value slot.
///
/// Unknown variables and unparseable formats resolve as text.
pub fn variable_info(variables: &VariableMap, normalized: &str) -> VariableInfo {
    if normalized == CONVERSATION_CREATED_AT {
        return VariableInfo {
            format: VariableFormat::Date,
            value_key: Some(ValueKey::ValueDate),
        };
    }
    let format = variables
        .get(&parameter_pattern(normalized))
        .and_then(|v| v.format.as_deref())
        .and_then(|f| VariableFormat::from_db_str(f).ok())
        .unwrap_or_default();
    VariableInfo {
        format,
        value_key: format.value_key(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(parameter: &str, normalized: &str, format: Option<&str>) -> VariableRow {
        VariableRow {
            name: normalized.to_string(),
            parameter: parameter.to_string(),
            normalized_parameter: normalized.to_string(),
            format: format.map(str::to_string),
            status: Some(1),
            error_message: None,
            validation: None,
            is_contact_page_qualified_variable: false,
            variable_type: None,
        }
    }

    fn variables() -> VariableMap {
        let mut map = VariableMap::new();
        for (p, n, f) in [
            ("¿·$user.info.phone·?", "visitor_phone", Some("phone")),
            ("¿·$user.info.age·?", "visitor_age", Some("number")),
            ("¿·topic·?", "conversation_topic", None),
            ("¿·$user.info.birthday·?", "visitor_birthday", Some("date")),
        ] {
            map.insert(p.to_string(), variable(p, n, f));
        }
        map
    }

    #[test]
    fn test_parameter_pattern_prefixes() {
        assert_eq!(parameter_pattern("visitor_phone_ok"), "¿·$user.info.phone_ok·?");
        assert_eq!(parameter_pattern("conversation_topic"), "¿·topic·?");
        assert_eq!(parameter_pattern("plain"), "plain");
    }

    #[test]
    fn test_created_at_is_always_date() {
        let info = variable_info(&VariableMap::new(), CONVERSATION_CREATED_AT);
        assert_eq!(info.format, VariableFormat::Date);
        assert_eq!(info.value_key, Some(ValueKey::ValueDate));
    }

    #[test]
    fn test_variable_info_uses_format() {
        let vars = variables();
        let info = variable_info(&vars, "visitor_age");
        assert_eq!(info.format, VariableFormat::Number);
        assert_eq!(info.value_key, Some(ValueKey::ValueDouble));

        let info = variable_info(&vars, "visitor_birthday");
        assert_eq!(info.value_key, Some(ValueKey::ValueDate));
    }

    #[test]
    fn test_missing_format_and_unknown_variable_default_to_text() {
        let vars = variables();
        assert_eq!(variable_info(&vars, "conversation_topic").format, VariableFormat::Text);
        let info = variable_info(&vars, "visitor_nickname");
        assert_eq!(info.format, VariableFormat::Text);
        assert_eq!(info.value_key, Some(ValueKey::Value));
    }

    #[test]
    fn test_pattern_for_normalized() {
        let vars = variables();
        assert_eq!(
            pattern_for_normalized(&vars, "visitor_phone"),
            Some("¿·$user.info.phone·?")
        );
        assert_eq!(pattern_for_normalized(&vars, "visitor_missing"), None);
    }

    #[test]
    fn test_variable_info_serializes_type_field() {
        let info = variable_info(&VariableMap::new(), CONVERSATION_CREATED_AT);
        let json = serde_json::to_value(info).unwrap();
        assert_eq!(json, serde_json::json!({"type": "date", "value_key": "value_date"}));
    }
}
