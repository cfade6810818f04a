//! Visitor records enriched with indexed variables and conversations.
//!
//! A visitor is cached under `visitor:{key}` with an expiry. Its variables
//! and active conversations come from the search index; when none of its
//! conversations carries a title the visitor is given a generated default
//! name such as `Visitor B17`, drawn from a per-account counter in the cache.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chatdesk_core::{
    parameter_pattern, variable_info, ChatdeskResult, EntityId, KeyTemplate,
    VariableMap, VisitorConfig, VisitorRow, CONTACT_PREFIX,
};
use chatdesk_storage::{
    read_cached, CacheEncoding, ConnectionHandles, ConversationHit, Getter, RelationalStore,
    SearchIndex, SearchResult, SyncOptions, SyncOrchestrator,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::variable::VariableManager;

/// Indexed visitor variables that are system bookkeeping, not contact data.
pub const IGNORED_VISITOR_VARIABLES: [&str; 2] = ["visitor_key", "visitor_id"];

/// Indexed name of the contact id system variable.
pub const CONTACT_ID_VARIABLE: &str = "contact_id";

/// Pattern under which the contact id is exposed.
pub const CONTACT_ID_PATTERN: &str = "¿·$user.contact_id·?";

/// Type given to every variable of a returned visitor.
pub const CONTACT_VARIABLE_TYPE: &str = "contact";

const SERIES_LETTERS: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const COUNTER_PATH: &str = "counter";

const FIELD_VARIABLES: &str = "variables";
const FIELD_ACTIVE_CONVERSATIONS: &str = "active_conversations";
const FIELD_DEFAULT_NAME: &str = "default_name";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VisitorPayload {
    pub id: Option<EntityId>,
    pub external_key: Option<String>,
    pub account_id: Option<EntityId>,
    pub channel_id: Option<EntityId>,
    /// Variable pattern → value
    pub variables: BTreeMap<String, VisitorVariable>,
    /// `"<conversation_external_key>:<bot_id>"` → thread key
    pub active_conversations: BTreeMap<String, Option<String>>,
    pub default_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_new: Option<bool>,
}

impl VisitorPayload {
    /// Mark a payload as an existing visitor read back for `visitor_key`.
    fn annotate(mut self, visitor_key: &str) -> Self {
        self.key = Some(visitor_key.to_string());
        self.is_new = Some(false);
        for variable in self.variables.values_mut() {
            variable.variable_type = Some(CONTACT_VARIABLE_TYPE.to_string());
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitorVariable {
    pub value: Value,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<String>,
}

/// Key of an active conversation entry.
pub fn active_conversation_key(conversation_external_key: &str, bot_id: EntityId) -> String {
    format!("{}:{}", conversation_external_key, bot_id)
}

/// Map the variables of an indexed visitor document to patterns.
///
/// Contact variables become `¿·$user.info.<name>·?` and the contact id
/// becomes [`CONTACT_ID_PATTERN`]. Each value is read from the slot that
/// matches the variable's format in the account.
pub fn visitor_variables(document: &Value, account_variables: &VariableMap) -> BTreeMap<String, VisitorVariable> {
    let mut variables = BTreeMap::new();
    let Some(items) = document.get("variables").and_then(Value::as_array) else {
        return variables;
    };

    for item in items {
        let Some(name) = item.get("name").and_then(Value::as_str) else {
            continue;
        };
        let pattern = if name.starts_with(CONTACT_PREFIX) && !IGNORED_VISITOR_VARIABLES.contains(&name) {
            parameter_pattern(name)
        } else if name == CONTACT_ID_VARIABLE {
            CONTACT_ID_PATTERN.to_string()
        } else {
            continue;
        };
        let value = variable_info(account_variables, name)
            .value_key
            .and_then(|slot| item.get(slot.as_str()))
            .cloned()
            .unwrap_or(Value::Null);
        variables.insert(
            pattern,
            VisitorVariable {
                value,
                variable_type: None,
            },
        );
    }
    variables
}

/// Sequence number and series letter for a default-name counter value.
///
/// Counters run `A1..A<max>`, `B1..B<max>` and so on, wrapping after `Z`.
/// A counter that is zero or negative maps to `(1, 'A')`.
pub fn series_position(counter: i64, max_series_no: u64) -> (u64, char) {
    if counter <= 0 || max_series_no == 0 {
        return (1, 'A');
    }
    let counter = counter.unsigned_abs();
    let sequence = match counter % max_series_no {
        0 => max_series_no,
        rest => rest,
    };
    let series = (counter.div_ceil(max_series_no) % SERIES_LETTERS.len() as u64) as usize;
    let letter = match series {
        0 => SERIES_LETTERS[SERIES_LETTERS.len() - 1],
        n => SERIES_LETTERS[n - 1],
    };
    (sequence, letter as char)
}

/// Per-account visitor counter backing generated default names.
#[derive(Debug, Clone, Copy)]
pub struct DefaultNameCounter<'a> {
    handles: &'a ConnectionHandles,
    config: &'a VisitorConfig,
}

impl<'a> DefaultNameCounter<'a> {
    pub fn new(handles: &'a ConnectionHandles, config: &'a VisitorConfig) -> Self {
        Self { handles, config }
    }

    /// Advance the account's counter and render the name it lands on.
    ///
    /// A missing counter is seeded from the account's visitor count in the
    /// store. Concurrent seeds do not overwrite each other.
    pub async fn next_name(&self, account_id: EntityId) -> ChatdeskResult<String> {
        let key = KeyTemplate::VisitorDefaultName.key(account_id);
        let counter = match self.increment(account_id).await {
            Some(counter) => Some(counter),
            None => {
                let visitors = self.handles.store().account_visitor_count(account_id).await?;
                let seeded = self
                    .handles
                    .cache()
                    .set_json_nx(&key, &json!({ COUNTER_PATH: visitors }))
                    .await?;
                tracing::debug!(account_id, visitors, seeded, "Seeded visitor name counter");
                self.increment(account_id).await
            }
        };
        let (sequence, series) = series_position(counter.unwrap_or_default(), self.config.max_series_no);
        Ok(format!("{} {}{}", self.config.name_prefix, series, sequence))
    }

    async fn increment(&self, account_id: EntityId) -> Option<i64> {
        let key = KeyTemplate::VisitorDefaultName.key(account_id);
        match self.handles.cache().increment(&key, COUNTER_PATH, 1).await {
            Ok(counter) => Some(counter),
            Err(e) => {
                tracing::debug!(account_id, error = %e, "Visitor name counter not incremented");
                None
            }
        }
    }
}

/// Visitor record from the store, variables and conversations from the index.
#[derive(Debug, Clone, Copy)]
pub struct VisitorDetails<'a> {
    variables: &'a VariableManager,
    names: DefaultNameCounter<'a>,
}

impl<'a> VisitorDetails<'a> {
    pub fn new(variables: &'a VariableManager, names: DefaultNameCounter<'a>) -> Self {
        Self { variables, names }
    }
}

#[async_trait]
impl<'a> Getter for VisitorDetails<'a> {
    type Args = String;
    type Raw = VisitorRow;
    type Payload = VisitorPayload;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        visitor_key: &String,
    ) -> ChatdeskResult<Option<VisitorRow>> {
        store.visitor(visitor_key).await
    }

    async fn get_from_search_index(
        &self,
        index: &dyn SearchIndex,
        _visitor_key: &String,
        db_data: Option<&VisitorRow>,
    ) -> ChatdeskResult<SearchResult> {
        let Some(visitor) = db_data else {
            return Ok(SearchResult::empty());
        };

        let variables = match index.visitor_variables(&visitor.visitor_key).await? {
            Some(document) => {
                let account_variables = self
                    .variables
                    .get_variables(visitor.account_id)
                    .await?
                    .unwrap_or_default();
                visitor_variables(&document, &account_variables)
            }
            None => BTreeMap::new(),
        };

        let mut active_conversations = BTreeMap::new();
        let mut default_name = None;
        for ConversationHit {
            conversation_external_key,
            bot_id,
            thread_key,
            title,
        } in index.visitor_conversations(&visitor.visitor_key).await?
        {
            active_conversations.insert(active_conversation_key(&conversation_external_key, bot_id), thread_key);
            default_name = title;
        }

        let default_name = match default_name.filter(|name| !name.is_empty()) {
            Some(name) => name,
            None => self.names.next_name(visitor.account_id).await?,
        };

        Ok(SearchResult::empty()
            .with(FIELD_VARIABLES, json!(variables))
            .with(FIELD_ACTIVE_CONVERSATIONS, json!(active_conversations))
            .with(FIELD_DEFAULT_NAME, Value::String(default_name)))
    }

    fn prepare_payload(&self, raw: Option<VisitorRow>, search: SearchResult, _visitor_key: &String) -> VisitorPayload {
        let field = |name: &str| search.get(name).cloned().unwrap_or(Value::Null);
        let mut payload = VisitorPayload {
            variables: serde_json::from_value(field(FIELD_VARIABLES)).unwrap_or_default(),
            active_conversations: serde_json::from_value(field(FIELD_ACTIVE_CONVERSATIONS)).unwrap_or_default(),
            default_name: field(FIELD_DEFAULT_NAME).as_str().map(str::to_string),
            ..VisitorPayload::default()
        };
        if let Some(visitor) = raw {
            payload.id = Some(visitor.id);
            payload.external_key = visitor.external_key;
            payload.account_id = Some(visitor.account_id);
            payload.channel_id = visitor.channel_id;
        }
        payload
    }
}

/// Visitor key behind an external (channel) key.
#[derive(Debug, Clone, Copy, Default)]
pub struct VisitorKeyByExternalKey;

#[async_trait]
impl Getter for VisitorKeyByExternalKey {
    type Args = String;
    type Raw = String;
    type Payload = String;

    const ENCODING: CacheEncoding = CacheEncoding::Scalar;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        external_key: &String,
    ) -> ChatdeskResult<Option<String>> {
        store.visitor_key_by_external_key(external_key).await
    }

    fn prepare_payload(&self, raw: Option<String>, _search: SearchResult, _external_key: &String) -> String {
        raw.unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct VisitorManager {
    orchestrator: SyncOrchestrator,
    variables: VariableManager,
    config: VisitorConfig,
}

impl VisitorManager {
    pub fn new(orchestrator: SyncOrchestrator, config: VisitorConfig) -> Self {
        Self {
            variables: VariableManager::new(orchestrator.clone()),
            orchestrator,
            config,
        }
    }

    /// Visitor by key, or by external key when no key is given.
    pub async fn get_visitor(
        &self,
        visitor_key: Option<&str>,
        external_key: Option<&str>,
    ) -> ChatdeskResult<Option<VisitorPayload>> {
        let visitor_key = match visitor_key.filter(|k| !k.is_empty()) {
            Some(key) => Some(key.to_string()),
            None => match external_key.filter(|k| !k.is_empty()) {
                Some(external_key) => self.visitor_key_for(external_key).await?,
                None => None,
            },
        };
        let Some(visitor_key) = visitor_key.filter(|k| !k.is_empty()) else {
            return Ok(None);
        };

        let getter = VisitorDetails::new(
            &self.variables,
            DefaultNameCounter::new(self.orchestrator.handles(), &self.config),
        );
        let key = KeyTemplate::Visitor.key(&visitor_key);
        let visitor = self
            .orchestrator
            .read_through(&key, &getter, &visitor_key, SyncOptions::with_ttl(self.config.key_ttl))
            .await?;
        Ok(visitor.map(|v| v.annotate(&visitor_key)))
    }

    async fn visitor_key_for(&self, external_key: &str) -> ChatdeskResult<Option<String>> {
        let key = KeyTemplate::VisitorExternalKey.key(external_key);
        self.orchestrator
            .read_through(
                &key,
                &VisitorKeyByExternalKey,
                &external_key.to_string(),
                SyncOptions::default(),
            )
            .await
    }

    /// Cached visitor key for an external key. Never touches the store.
    pub async fn redis_get_visitor_key(&self, external_key: &str) -> ChatdeskResult<Option<String>> {
        let key = KeyTemplate::VisitorExternalKey.key(external_key);
        read_cached(self.orchestrator.handles().cache(), &key, CacheEncoding::Scalar).await
    }

    /// Cached visitor, annotated like [`get_visitor`](Self::get_visitor). Never touches the store.
    pub async fn redis_get_visitor(&self, visitor_key: &str) -> ChatdeskResult<Option<VisitorPayload>> {
        let key = KeyTemplate::Visitor.key(visitor_key);
        let visitor: Option<VisitorPayload> =
            read_cached(self.orchestrator.handles().cache(), &key, CacheEncoding::Json).await?;
        Ok(visitor.map(|v| v.annotate(visitor_key)))
    }
}
