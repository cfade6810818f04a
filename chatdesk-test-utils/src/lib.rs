//! Chatdesk Test Utilities
//!
//! Shared test infrastructure for the Chatdesk workspace:
//! - A cache spy that records every command and can inject failures
//! - In-memory relational store and search index with call counters
//! - Proptest generators for keys, ids and cacheable values
//! - Row fixtures for common entities
//! - Assertions for Chatdesk error variants

pub use chatdesk_core::{
    AccountRow, AddonFunctionRow, AgentRoleRow, AgentRow, BotRow, BotSummaryRow, CacheError,
    CacheKey, CacheOperation, ChannelConfigurationRow, ChatdeskError, ChatdeskResult, EntityId,
    FeatureRow, KeyTemplate, LabelRow, OutboundBalanceRow, PopupMessageRow, StorageError,
    TemplateRow, TriggerRulesRow, VariableRow, VisitorRow,
};
pub use chatdesk_storage::{
    CacheStore, ConnectionHandles, ConversationHit, InMemoryCacheStore, RelationalStore,
    ScalarValue, SearchIndex,
};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// CACHE SPY
// ============================================================================

/// One command issued against the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheCall {
    pub operation: CacheOperation,
    pub key: String,
}

/// Cache store that records the commands it receives and forwards them to
/// an in-memory store.
#[derive(Debug, Default)]
pub struct SpyCacheStore {
    inner: InMemoryCacheStore,
    calls: Mutex<Vec<CacheCall>>,
    failing: Mutex<HashSet<CacheOperation>>,
    short_multi_get: AtomicBool,
}

impl SpyCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backing store, for seeding and inspecting state without recording.
    pub fn inner(&self) -> &InMemoryCacheStore {
        &self.inner
    }

    pub fn calls(&self) -> Vec<CacheCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Operations in call order.
    pub fn operations(&self) -> Vec<CacheOperation> {
        self.calls().into_iter().map(|c| c.operation).collect()
    }

    pub fn count(&self, operation: CacheOperation) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Keys written by `SET` or `SET_JSON`, in call order.
    pub fn written_keys(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c.operation, CacheOperation::Set | CacheOperation::SetJson))
            .map(|c| c.key)
            .collect()
    }

    pub fn clear_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Make every later call of `operation` fail.
    pub fn fail_on(&self, operation: CacheOperation) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(operation);
        }
    }

    /// Make `GET_MULTIPLE` return one result fewer than requested.
    pub fn shorten_multi_get(&self) {
        self.short_multi_get.store(true, Ordering::SeqCst);
    }

    fn record(&self, operation: CacheOperation, key: &str) -> Result<(), CacheError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(CacheCall {
                operation,
                key: key.to_string(),
            });
        }
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(&operation))
            .unwrap_or(false);
        if failing {
            return Err(CacheError::OperationFailed {
                operation,
                key: key.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for SpyCacheStore {
    async fn get(&self, key: &CacheKey) -> ChatdeskResult<Option<String>> {
        self.record(CacheOperation::Get, key.as_str())?;
        self.inner.get(key).await
    }

    async fn get_json(&self, key: &CacheKey, path: &str) -> ChatdeskResult<Option<Value>> {
        self.record(CacheOperation::GetJson, key.as_str())?;
        self.inner.get_json(key, path).await
    }

    async fn get_multiple(
        &self,
        keys: &[CacheKey],
        path: &str,
    ) -> ChatdeskResult<Vec<Option<Value>>> {
        let joined = keys
            .iter()
            .map(CacheKey::as_str)
            .collect::<Vec<_>>()
            .join(",");
        self.record(CacheOperation::GetMultiple, &joined)?;
        let mut values = self.inner.get_multiple(keys, path).await?;
        if self.short_multi_get.load(Ordering::SeqCst) {
            values.pop();
        }
        Ok(values)
    }

    async fn set(&self, key: &CacheKey, value: &ScalarValue) -> ChatdeskResult<()> {
        self.record(CacheOperation::Set, key.as_str())?;
        self.inner.set(key, value).await
    }

    async fn set_json(&self, key: &CacheKey, path: &str, value: &Value) -> ChatdeskResult<()> {
        self.record(CacheOperation::SetJson, key.as_str())?;
        self.inner.set_json(key, path, value).await
    }

    async fn set_json_nx(&self, key: &CacheKey, value: &Value) -> ChatdeskResult<bool> {
        self.record(CacheOperation::SetJsonNx, key.as_str())?;
        self.inner.set_json_nx(key, value).await
    }

    async fn increment(&self, key: &CacheKey, path: &str, by: i64) -> ChatdeskResult<i64> {
        self.record(CacheOperation::Increment, key.as_str())?;
        self.inner.increment(key, path, by).await
    }

    async fn set_expiry(&self, key: &CacheKey, ttl: Duration) -> ChatdeskResult<bool> {
        self.record(CacheOperation::SetExpiry, key.as_str())?;
        self.inner.set_expiry(key, ttl).await
    }
}

// ============================================================================
// RELATIONAL FIXTURE
// ============================================================================

/// Rows served by [`FixtureStore`].
#[derive(Debug, Clone, Default)]
pub struct FixtureData {
    pub accounts: HashMap<EntityId, AccountRow>,
    pub account_bots: Vec<BotSummaryRow>,
    pub features: Vec<FeatureRow>,
    pub popup_messages: Vec<PopupMessageRow>,
    pub outbound_balances: HashMap<EntityId, OutboundBalanceRow>,
    pub visitor_counts: HashMap<EntityId, i64>,
    pub conversation_counts: HashMap<EntityId, i64>,
    pub bots: HashMap<EntityId, BotRow>,
    pub bot_channel_configurations: HashMap<(EntityId, EntityId), ChannelConfigurationRow>,
    pub bot_flows: HashMap<EntityId, Value>,
    pub trigger_rules: HashMap<EntityId, Option<Value>>,
    pub bot_versions: HashMap<EntityId, Vec<EntityId>>,
    pub agents: HashMap<EntityId, AgentRow>,
    pub agent_roles: HashMap<EntityId, Vec<AgentRoleRow>>,
    pub agent_statuses: HashMap<EntityId, EntityId>,
    pub user_preferences: HashMap<EntityId, Value>,
    pub team_members: HashMap<EntityId, Vec<EntityId>>,
    pub channel_configurations: HashMap<EntityId, ChannelConfigurationRow>,
    pub account_variables: HashMap<EntityId, Vec<VariableRow>>,
    pub account_labels: HashMap<EntityId, Vec<LabelRow>>,
    pub templates: HashMap<EntityId, TemplateRow>,
    pub addon_functions_by_key: HashMap<String, Vec<AddonFunctionRow>>,
    pub addon_version_functions: HashMap<EntityId, Vec<AddonFunctionRow>>,
    pub visitors: HashMap<String, VisitorRow>,
}

/// Relational store over [`FixtureData`] that counts queries by method name.
#[derive(Debug, Default)]
pub struct FixtureStore {
    data: Mutex<FixtureData>,
    calls: Mutex<HashMap<&'static str, usize>>,
    delay: Option<Duration>,
    failure: Option<StorageError>,
}

impl FixtureStore {
    pub fn new(data: FixtureData) -> Self {
        Self {
            data: Mutex::new(data),
            ..Self::default()
        }
    }

    /// Sleep before answering each query.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every query with `error`.
    pub fn failing(error: StorageError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut FixtureData)) {
        if let Ok(mut data) = self.data.lock() {
            f(&mut data);
        }
    }

    /// Number of times `method` was called.
    pub fn calls(&self, method: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.get(method).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().map(|c| c.values().sum()).unwrap_or(0)
    }

    async fn read<T>(
        &self,
        method: &'static str,
        f: impl FnOnce(&FixtureData) -> T,
    ) -> ChatdeskResult<T> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls.entry(method).or_insert(0) += 1;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone().into());
        }
        let data = self.data.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(f(&data))
    }
}

fn by_ids<T: Clone>(rows: &HashMap<EntityId, T>, ids: &[EntityId]) -> Vec<T> {
    ids.iter().filter_map(|id| rows.get(id).cloned()).collect()
}

#[async_trait]
impl RelationalStore for FixtureStore {
    async fn accounts(&self, account_ids: &[EntityId]) -> ChatdeskResult<Vec<AccountRow>> {
        self.read("accounts", |d| by_ids(&d.accounts, account_ids))
            .await
    }

    async fn account_bots(
        &self,
        account_ids: &[EntityId],
        bot_type_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<BotSummaryRow>> {
        self.read("account_bots", |d| {
            d.account_bots
                .iter()
                .filter(|b| account_ids.contains(&b.account_id))
                .filter(|b| {
                    bot_type_ids.is_empty()
                        || b.bot_type_id.is_some_and(|t| bot_type_ids.contains(&t))
                })
                .cloned()
                .collect()
        })
        .await
    }

    async fn account_features(&self, account_ids: &[EntityId]) -> ChatdeskResult<Vec<FeatureRow>> {
        self.read("account_features", |d| {
            d.features
                .iter()
                .filter(|f| account_ids.contains(&f.account_id))
                .cloned()
                .collect()
        })
        .await
    }

    async fn account_popup_messages(
        &self,
        account_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<PopupMessageRow>> {
        self.read("account_popup_messages", |d| {
            d.popup_messages
                .iter()
                .filter(|p| account_ids.contains(&p.account_id))
                .cloned()
                .collect()
        })
        .await
    }

    async fn outbound_balance(
        &self,
        account_id: EntityId,
    ) -> ChatdeskResult<Option<OutboundBalanceRow>> {
        self.read("outbound_balance", |d| {
            d.outbound_balances.get(&account_id).cloned()
        })
        .await
    }

    async fn account_id_by_key(&self, account_key: &str) -> ChatdeskResult<Option<EntityId>> {
        self.read("account_id_by_key", |d| {
            d.accounts
                .values()
                .find(|a| a.account_key == account_key)
                .map(|a| a.id)
        })
        .await
    }

    async fn account_visitor_count(&self, account_id: EntityId) -> ChatdeskResult<i64> {
        self.read("account_visitor_count", |d| {
            d.visitor_counts.get(&account_id).copied().unwrap_or(0)
        })
        .await
    }

    async fn account_conversation_count(&self, account_id: EntityId) -> ChatdeskResult<i64> {
        self.read("account_conversation_count", |d| {
            d.conversation_counts.get(&account_id).copied().unwrap_or(0)
        })
        .await
    }

    async fn bot(&self, bot_id: EntityId) -> ChatdeskResult<Option<BotRow>> {
        self.read("bot", |d| d.bots.get(&bot_id).cloned()).await
    }

    async fn bot_channel_configuration(
        &self,
        bot_id: EntityId,
        channel_id: EntityId,
    ) -> ChatdeskResult<Option<ChannelConfigurationRow>> {
        self.read("bot_channel_configuration", |d| {
            d.bot_channel_configurations
                .get(&(bot_id, channel_id))
                .cloned()
        })
        .await
    }

    async fn bot_flow(&self, version_id: EntityId) -> ChatdeskResult<Option<Value>> {
        self.read("bot_flow", |d| d.bot_flows.get(&version_id).cloned())
            .await
    }

    async fn bot_trigger_rules(
        &self,
        bot_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<TriggerRulesRow>> {
        self.read("bot_trigger_rules", |d| {
            bot_ids
                .iter()
                .filter_map(|id| {
                    d.trigger_rules.get(id).map(|rules| TriggerRulesRow {
                        bot_id: *id,
                        trigger_rules: rules.clone(),
                    })
                })
                .collect()
        })
        .await
    }

    async fn bot_id_by_publish_key(&self, publish_key: &str) -> ChatdeskResult<Option<EntityId>> {
        self.read("bot_id_by_publish_key", |d| {
            d.bots
                .values()
                .find(|b| b.publish_key.as_deref() == Some(publish_key))
                .map(|b| b.id)
        })
        .await
    }

    async fn bot_versions(&self, bot_id: EntityId) -> ChatdeskResult<Vec<EntityId>> {
        self.read("bot_versions", |d| {
            d.bot_versions.get(&bot_id).cloned().unwrap_or_default()
        })
        .await
    }

    async fn agents(&self, agent_ids: &[EntityId]) -> ChatdeskResult<Vec<AgentRow>> {
        self.read("agents", |d| by_ids(&d.agents, agent_ids)).await
    }

    async fn agent_roles(&self, agent_id: EntityId) -> ChatdeskResult<Vec<AgentRoleRow>> {
        self.read("agent_roles", |d| {
            d.agent_roles.get(&agent_id).cloned().unwrap_or_default()
        })
        .await
    }

    async fn agent_status(&self, agent_id: EntityId) -> ChatdeskResult<Option<EntityId>> {
        self.read("agent_status", |d| d.agent_statuses.get(&agent_id).copied())
            .await
    }

    async fn user_preferences(&self, user_id: EntityId) -> ChatdeskResult<Option<Value>> {
        self.read("user_preferences", |d| {
            d.user_preferences.get(&user_id).cloned()
        })
        .await
    }

    async fn channel_configuration(
        &self,
        channel_configuration_id: EntityId,
    ) -> ChatdeskResult<Option<ChannelConfigurationRow>> {
        self.read("channel_configuration", |d| {
            d.channel_configurations
                .get(&channel_configuration_id)
                .cloned()
        })
        .await
    }

    async fn team_member_ids(&self, team_id: EntityId) -> ChatdeskResult<Vec<EntityId>> {
        self.read("team_member_ids", |d| {
            d.team_members.get(&team_id).cloned().unwrap_or_default()
        })
        .await
    }

    async fn account_labels(&self, account_id: EntityId) -> ChatdeskResult<Vec<LabelRow>> {
        self.read("account_labels", |d| {
            d.account_labels.get(&account_id).cloned().unwrap_or_default()
        })
        .await
    }

    async fn account_variables(&self, account_id: EntityId) -> ChatdeskResult<Vec<VariableRow>> {
        self.read("account_variables", |d| {
            d.account_variables
                .get(&account_id)
                .cloned()
                .unwrap_or_default()
        })
        .await
    }

    async fn outbound_template(
        &self,
        template_id: EntityId,
    ) -> ChatdeskResult<Option<TemplateRow>> {
        self.read("outbound_template", |d| d.templates.get(&template_id).cloned())
            .await
    }

    async fn addon_functions_by_key(
        &self,
        addons_key: &str,
    ) -> ChatdeskResult<Vec<AddonFunctionRow>> {
        self.read("addon_functions_by_key", |d| {
            d.addon_functions_by_key
                .get(addons_key)
                .cloned()
                .unwrap_or_default()
        })
        .await
    }

    async fn addon_version_functions(
        &self,
        addon_version_id: EntityId,
    ) -> ChatdeskResult<Vec<AddonFunctionRow>> {
        self.read("addon_version_functions", |d| {
            d.addon_version_functions
                .get(&addon_version_id)
                .cloned()
                .unwrap_or_default()
        })
        .await
    }

    async fn visitor(&self, visitor_key: &str) -> ChatdeskResult<Option<VisitorRow>> {
        self.read("visitor", |d| d.visitors.get(visitor_key).cloned())
            .await
    }

    async fn visitor_key_by_external_key(
        &self,
        external_key: &str,
    ) -> ChatdeskResult<Option<String>> {
        self.read("visitor_key_by_external_key", |d| {
            d.visitors
                .values()
                .find(|v| v.external_key.as_deref() == Some(external_key))
                .map(|v| v.visitor_key.clone())
        })
        .await
    }
}

// ============================================================================
// SEARCH FIXTURE
// ============================================================================

/// Search index over in-memory documents that counts queries.
#[derive(Debug, Default)]
pub struct FixtureSearchIndex {
    pub outbound_counts: HashMap<EntityId, i64>,
    pub visitor_documents: HashMap<String, Value>,
    pub conversations: HashMap<String, Vec<ConversationHit>>,
    calls: Mutex<usize>,
}

impl FixtureSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or(0)
    }

    fn record(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
    }
}

#[async_trait]
impl SearchIndex for FixtureSearchIndex {
    async fn used_outbound_messages(
        &self,
        account_id: EntityId,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> ChatdeskResult<i64> {
        self.record();
        Ok(self.outbound_counts.get(&account_id).copied().unwrap_or(0))
    }

    async fn visitor_variables(&self, visitor_key: &str) -> ChatdeskResult<Option<Value>> {
        self.record();
        Ok(self.visitor_documents.get(visitor_key).cloned())
    }

    async fn visitor_conversations(
        &self,
        visitor_key: &str,
    ) -> ChatdeskResult<Vec<ConversationHit>> {
        self.record();
        Ok(self
            .conversations
            .get(visitor_key)
            .cloned()
            .unwrap_or_default())
    }
}

/// Handles over the given test doubles.
pub fn handles(
    store: Arc<FixtureStore>,
    cache: Arc<SpyCacheStore>,
    search: Arc<FixtureSearchIndex>,
) -> ConnectionHandles {
    let built = ConnectionHandles::builder()
        .store(store)
        .cache(cache)
        .search(search)
        .build();
    match built {
        Ok(handles) => handles,
        Err(e) => panic!("test handles: {}", e),
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Chatdesk identifiers and cacheable values.

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    pub fn arb_entity_id() -> impl Strategy<Value = EntityId> {
        1..1_000_000i64
    }

    pub fn arb_key_template() -> impl Strategy<Value = KeyTemplate> {
        proptest::sample::select(KeyTemplate::ALL.to_vec())
    }

    pub fn arb_cache_key() -> impl Strategy<Value = CacheKey> {
        (arb_key_template(), arb_entity_id()).prop_map(|(t, id)| t.key(id))
    }

    /// Values written with a scalar `SET`.
    pub fn arb_scalar_json() -> impl Strategy<Value = Value> {
        prop_oneof![
            "[a-z0-9]{1,16}".prop_map(Value::String),
            any::<i64>().prop_map(|n| json!(n)),
        ]
    }

    /// Values written as JSON documents.
    pub fn arb_document_json() -> impl Strategy<Value = Value> {
        prop_oneof![
            (arb_entity_id(), "[a-z ]{0,12}").prop_map(|(id, name)| json!({"id": id, "name": name})),
            prop::collection::vec(any::<i32>(), 1..5).prop_map(|v| json!(v)),
            any::<bool>().prop_map(Value::Bool),
            (-1.0e6f64..1.0e6).prop_filter("fractional", |f| f.fract() != 0.0).prop_map(|f| json!(f)),
        ]
    }

    /// Visitor counter values, including the boundaries of a series.
    pub fn arb_visitor_count() -> impl Strategy<Value = i64> {
        prop_oneof![1..100_000i64, Just(9999), Just(10_000), Just(259_974)]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built rows for common scenarios.

    use super::*;
    use serde_json::json;

    pub fn account_row(id: EntityId) -> AccountRow {
        AccountRow {
            id,
            name: format!("Account {}", id),
            account_key: format!("acc-key-{}", id),
            owner_id: Some(100 + id),
            timezone: Some("UTC".to_string()),
            operating_hours: Some(json!({"monday": ["09:00", "17:00"]})),
            registered_domains: Some(vec!["example.com".to_string()]),
            site_url: Some(r#"["https://example.com"]"#.to_string()),
            is_domain_restricted: false,
            subscription_id: Some(7),
            activation_source: Some("web".to_string()),
            plan_id: Some(3),
            plan_name: Some("Growth".to_string()),
        }
    }

    pub fn bot_summary_row(id: EntityId, account_id: EntityId) -> BotSummaryRow {
        BotSummaryRow {
            id,
            account_id,
            name: format!("Bot {}", id),
            bot_type_id: Some(1),
            channel_id: Some(1),
            is_deleted: false,
        }
    }

    pub fn bot_row(id: EntityId, account_id: EntityId) -> BotRow {
        BotRow {
            id,
            account_id,
            name: format!("Bot {}", id),
            channel_id: Some(1),
            bot_type_id: Some(1),
            bot_lead_id: None,
            preview_key: Some(format!("preview-{}", id)),
            publish_key: Some(format!("publish-{}", id)),
            published_version_id: Some(id * 10),
            draft_version_id: Some(id * 10 + 1),
            settings: Some(json!({"theme": "light"})),
            is_deleted: false,
            created_by_first_name: Some("Ada".to_string()),
            created_by_last_name: Some("Lovelace".to_string()),
            created_at: NaiveDate::from_ymd_opt(2024, 1, 15)
                .and_then(|d| d.and_hms_opt(10, 30, 0)),
        }
    }

    pub fn agent_row(id: EntityId) -> AgentRow {
        AgentRow {
            id,
            email: format!("agent{}@example.com", id),
            first_name: Some("Grace".to_string()),
            last_name: Some("Hopper".to_string()),
            image_name: None,
            user_type_id: Some(2),
        }
    }

    pub fn channel_configuration_row(id: EntityId, account_id: EntityId) -> ChannelConfigurationRow {
        ChannelConfigurationRow {
            id,
            account_id,
            channel_id: 2,
            name: Some("Facebook page".to_string()),
            configuration: Some(json!({"page_id": "p-1"})),
            is_active: true,
        }
    }

    pub fn variable_row(name: &str, format: Option<&str>) -> VariableRow {
        VariableRow {
            name: name.to_string(),
            parameter: format!("¿·$user.info.{}·?", name),
            normalized_parameter: format!("visitor_{}", name),
            format: format.map(str::to_string),
            status: Some(1),
            error_message: None,
            validation: None,
            is_contact_page_qualified_variable: false,
            variable_type: Some("contact".to_string()),
        }
    }

    pub fn template_row(id: EntityId) -> TemplateRow {
        TemplateRow {
            template_id: id,
            template_name: format!("welcome_{}", id),
            channel_id: Some(3),
            channel_configuration_id: Some(5),
            status: Some("APPROVED".to_string()),
            category: Some("MARKETING".to_string()),
            channel_provider_id: Some(1),
            template_configuration: Some(json!({"language": "en"})),
            components: Some(json!([{"type": "BODY", "text": "Hi {{1}}"}])),
            media_id: None,
        }
    }

    pub fn addon_function_row(version_id: EntityId, function_name: &str) -> AddonFunctionRow {
        AddonFunctionRow {
            addon_version_id: version_id,
            authentication_type: Some("api_key".to_string()),
            function_name: function_name.to_string(),
            script: "return fetch('¿·token·?')".to_string(),
            script_language: Some("javascript".to_string()),
            parameter: Some(json!(["order_id"])),
            auth_parameters: Some(json!({"keys": {"token": {"value": "secret"}}})),
        }
    }

    pub fn label_row(id: EntityId, label: &str) -> LabelRow {
        LabelRow {
            id,
            label: label.to_string(),
            created_by: Some(11),
            created_at: NaiveDate::from_ymd_opt(2024, 3, 1).and_then(|d| d.and_hms_opt(9, 30, 0)),
        }
    }

    pub fn visitor_row(id: EntityId, visitor_key: &str, account_id: EntityId) -> VisitorRow {
        VisitorRow {
            id,
            visitor_key: visitor_key.to_string(),
            external_key: Some(format!("ext-{}", visitor_key)),
            account_id,
            channel_id: Some(1),
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Chatdesk error variants.

    use super::*;

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &ChatdeskResult<T>) {
        match result {
            Err(ChatdeskError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_cache_error<T: std::fmt::Debug>(result: &ChatdeskResult<T>) {
        match result {
            Err(ChatdeskError::Cache(_)) => {}
            other => panic!("Expected Cache error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_multi_get_mismatch<T: std::fmt::Debug>(
        result: &ChatdeskResult<T>,
        expected: usize,
        got: usize,
    ) {
        match result {
            Err(ChatdeskError::Cache(CacheError::MultiGetLengthMismatch {
                expected: e,
                got: g,
            })) => {
                assert_eq!(*e, expected, "Wrong expected length");
                assert_eq!(*g, got, "Wrong returned length");
            }
            other => panic!(
                "Expected MultiGetLengthMismatch({}, {}), got: {:?}",
                expected, got, other
            ),
        }
    }

    /// Assert the spy saw exactly these operations, in order.
    #[track_caller]
    pub fn assert_operations(spy: &SpyCacheStore, expected: &[CacheOperation]) {
        assert_eq!(spy.operations(), expected, "Unexpected cache commands");
    }
}
