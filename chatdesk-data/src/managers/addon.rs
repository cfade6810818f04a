//! Connected addon bundles and addon version functions.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chatdesk_core::{AddonFunctionRow, ChatdeskResult, EntityId, KeyTemplate};
use chatdesk_storage::{Getter, RelationalStore, SearchResult, SyncOptions, SyncOrchestrator};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static SCRIPT_PARAMETER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"¿·(.+?)·\?").expect("addon parameter pattern is valid"));

/// Functions of the addon version connected under one addons key.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AddonBundle {
    pub addon_version_id: Option<EntityId>,
    pub functions: Vec<AddonFunction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonFunction {
    pub function_name: String,
    pub script: String,
    pub script_language: Option<String>,
    /// Script placeholder (`¿·name·?`) → configured auth value, `null` when unset
    pub parameter: BTreeMap<String, Value>,
}

/// A function found by [`AddonManager::get_addons`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonMatch {
    pub addons_key: String,
    #[serde(flatten)]
    pub function: AddonFunction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonFunctions {
    pub authentication_type: Option<String>,
    pub functions: BTreeMap<String, AddonFunctionDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddonFunctionDefinition {
    pub parameter: Option<Value>,
    pub script: String,
    pub script_language: Option<String>,
}

/// Collect the placeholders of a script and fill each one from the auth
/// parameters' `keys.<name>.value`.
///
/// Auth parameters without a non-empty `keys` object yield no parameters.
pub fn parse_script_parameters(script: &str, auth_parameters: Option<&Value>) -> BTreeMap<String, Value> {
    let mut parameters = BTreeMap::new();
    let Some(keys) = auth_parameters
        .and_then(|auth| auth.get("keys"))
        .and_then(Value::as_object)
        .filter(|keys| !keys.is_empty())
    else {
        return parameters;
    };

    for capture in SCRIPT_PARAMETER.captures_iter(script) {
        let name = &capture[1];
        let value = keys
            .get(name)
            .and_then(|entry| entry.get("value"))
            .cloned()
            .unwrap_or(Value::Null);
        parameters.insert(format!("¿·{}·?", name), value);
    }
    parameters
}

impl From<AddonFunctionRow> for AddonFunction {
    fn from(row: AddonFunctionRow) -> Self {
        let parameter = parse_script_parameters(&row.script, row.auth_parameters.as_ref());
        Self {
            function_name: row.function_name,
            script: row.script,
            script_language: row.script_language,
            parameter,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AddonsByKey;

#[async_trait]
impl Getter for AddonsByKey {
    type Args = String;
    type Raw = Vec<AddonFunctionRow>;
    type Payload = AddonBundle;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        addons_key: &String,
    ) -> ChatdeskResult<Option<Vec<AddonFunctionRow>>> {
        let rows = store.addon_functions_by_key(addons_key).await?;
        if rows.is_empty() {
            tracing::debug!(addons_key = %addons_key, "No addon functions in store");
            return Ok(None);
        }
        Ok(Some(rows))
    }

    fn prepare_payload(
        &self,
        raw: Option<Vec<AddonFunctionRow>>,
        _search: SearchResult,
        _addons_key: &String,
    ) -> AddonBundle {
        let rows = raw.unwrap_or_default();
        AddonBundle {
            addon_version_id: rows.last().map(|row| row.addon_version_id),
            functions: rows.into_iter().map(AddonFunction::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AddonVersionFunctions;

#[async_trait]
impl Getter for AddonVersionFunctions {
    type Args = EntityId;
    type Raw = Vec<AddonFunctionRow>;
    type Payload = AddonFunctions;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        addon_version_id: &EntityId,
    ) -> ChatdeskResult<Option<Vec<AddonFunctionRow>>> {
        let rows = store.addon_version_functions(*addon_version_id).await?;
        if rows.is_empty() {
            tracing::debug!(addon_version_id, "No functions for addon version in store");
            return Ok(None);
        }
        Ok(Some(rows))
    }

    fn prepare_payload(
        &self,
        raw: Option<Vec<AddonFunctionRow>>,
        _search: SearchResult,
        _addon_version_id: &EntityId,
    ) -> AddonFunctions {
        let rows = raw.unwrap_or_default();
        AddonFunctions {
            authentication_type: rows.first().and_then(|row| row.authentication_type.clone()),
            functions: rows
                .into_iter()
                .map(|row| {
                    (
                        row.function_name,
                        AddonFunctionDefinition {
                            parameter: row.parameter,
                            script: row.script,
                            script_language: row.script_language,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AddonManager {
    orchestrator: SyncOrchestrator,
}

impl AddonManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// First function named `function_name` across the bundles of `keys`,
    /// tried in order. Bundles after the first match are not read.
    pub async fn get_addons(&self, keys: &[String], function_name: &str) -> ChatdeskResult<Option<AddonMatch>> {
        for addons_key in keys {
            let key = KeyTemplate::AddonsKey.key(addons_key);
            let Some(bundle) = self
                .orchestrator
                .read_through(&key, &AddonsByKey, addons_key, SyncOptions::default())
                .await?
            else {
                continue;
            };
            if let Some(function) = bundle
                .functions
                .into_iter()
                .find(|f| f.function_name == function_name)
            {
                return Ok(Some(AddonMatch {
                    addons_key: addons_key.clone(),
                    function,
                }));
            }
        }
        tracing::debug!(function_name, keys = keys.len(), "No addon function matched");
        Ok(None)
    }

    pub async fn get_addon_functions(&self, addon_version_id: EntityId) -> ChatdeskResult<Option<AddonFunctions>> {
        let key = KeyTemplate::AddonFunctions.key(addon_version_id);
        self.orchestrator
            .read_through(&key, &AddonVersionFunctions, &addon_version_id, SyncOptions::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_test_utils::fixtures::addon_function_row;
    use serde_json::json;

    #[test]
    fn test_parameters_filled_from_auth_keys() {
        let auth = json!({"keys": {"token": {"value": "secret"}}});
        let params = parse_script_parameters("call('¿·token·?', '¿·region·?')", Some(&auth));
        assert_eq!(params.len(), 2);
        assert_eq!(params["¿·token·?"], json!("secret"));
        assert_eq!(params["¿·region·?"], Value::Null);
    }

    #[test]
    fn test_no_parameters_without_auth_keys() {
        let script = "call('¿·token·?')";
        assert!(parse_script_parameters(script, None).is_empty());
        assert!(parse_script_parameters(script, Some(&json!({"keys": {}}))).is_empty());
        assert!(parse_script_parameters(script, Some(&json!("keys"))).is_empty());
    }

    #[test]
    fn test_match_flattens_function() {
        let function = AddonFunction::from(addon_function_row(3, "AskEmail"));
        let found = AddonMatch {
            addons_key: "k1".to_string(),
            function,
        };
        let value = serde_json::to_value(&found).unwrap();
        assert_eq!(value["addons_key"], "k1");
        assert_eq!(value["function_name"], "AskEmail");
        assert_eq!(value["parameter"]["¿·token·?"], "secret");
    }

    #[test]
    fn test_version_functions_keyed_by_name() {
        let rows = vec![addon_function_row(3, "AskEmail"), addon_function_row(3, "Lookup")];
        let payload = AddonVersionFunctions.prepare_payload(Some(rows), SearchResult::empty(), &3);
        assert_eq!(payload.functions.len(), 2);
        assert!(payload.functions.contains_key("Lookup"));
    }
}
