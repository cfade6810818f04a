//! Relational store access.
//!
//! Each method is one logical query keyed by entity and identifier(s) and
//! returns typed rows. Absence is an empty result, never an error.
//! Implementations acquire a pooled session per call and release it on every
//! exit path.

mod postgres;

pub use postgres::{create_pool, PgRelationalStore};

use async_trait::async_trait;
use chatdesk_core::{
    AccountRow, AddonFunctionRow, AgentRoleRow, AgentRow, BotRow, BotSummaryRow,
    ChannelConfigurationRow, ChatdeskResult, EntityId, FeatureRow, LabelRow, OutboundBalanceRow,
    PopupMessageRow, TemplateRow, TriggerRulesRow, VariableRow, VisitorRow,
};
use serde_json::Value;

/// Read-only queries against the relational schema.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    // ========================================================================
    // ACCOUNT
    // ========================================================================

    async fn accounts(&self, account_ids: &[EntityId]) -> ChatdeskResult<Vec<AccountRow>>;

    /// Bots of the given accounts, including deleted ones. An empty
    /// `bot_type_ids` selects every type.
    async fn account_bots(
        &self,
        account_ids: &[EntityId],
        bot_type_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<BotSummaryRow>>;

    async fn account_features(&self, account_ids: &[EntityId]) -> ChatdeskResult<Vec<FeatureRow>>;

    async fn account_popup_messages(
        &self,
        account_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<PopupMessageRow>>;

    async fn outbound_balance(
        &self,
        account_id: EntityId,
    ) -> ChatdeskResult<Option<OutboundBalanceRow>>;

    async fn account_id_by_key(&self, account_key: &str) -> ChatdeskResult<Option<EntityId>>;

    async fn account_visitor_count(&self, account_id: EntityId) -> ChatdeskResult<i64>;

    async fn account_conversation_count(&self, account_id: EntityId) -> ChatdeskResult<i64>;

    // ========================================================================
    // BOT
    // ========================================================================

    async fn bot(&self, bot_id: EntityId) -> ChatdeskResult<Option<BotRow>>;

    /// Channel configuration a bot is connected to on one channel.
    async fn bot_channel_configuration(
        &self,
        bot_id: EntityId,
        channel_id: EntityId,
    ) -> ChatdeskResult<Option<ChannelConfigurationRow>>;

    /// Conversation dialog of a bot version.
    async fn bot_flow(&self, version_id: EntityId) -> ChatdeskResult<Option<Value>>;

    async fn bot_trigger_rules(&self, bot_ids: &[EntityId]) -> ChatdeskResult<Vec<TriggerRulesRow>>;

    async fn bot_id_by_publish_key(&self, publish_key: &str) -> ChatdeskResult<Option<EntityId>>;

    async fn bot_versions(&self, bot_id: EntityId) -> ChatdeskResult<Vec<EntityId>>;

    // ========================================================================
    // AGENT
    // ========================================================================

    async fn agents(&self, agent_ids: &[EntityId]) -> ChatdeskResult<Vec<AgentRow>>;

    async fn agent_roles(&self, agent_id: EntityId) -> ChatdeskResult<Vec<AgentRoleRow>>;

    async fn agent_status(&self, agent_id: EntityId) -> ChatdeskResult<Option<EntityId>>;

    async fn user_preferences(&self, user_id: EntityId) -> ChatdeskResult<Option<Value>>;

    /// User ids of a team's members.
    async fn team_member_ids(&self, team_id: EntityId) -> ChatdeskResult<Vec<EntityId>>;

    // ========================================================================
    // CONFIGURATION
    // ========================================================================

    async fn channel_configuration(
        &self,
        channel_configuration_id: EntityId,
    ) -> ChatdeskResult<Option<ChannelConfigurationRow>>;

    async fn account_variables(&self, account_id: EntityId) -> ChatdeskResult<Vec<VariableRow>>;

    /// Conversation labels of an account, ordered by id.
    async fn account_labels(&self, account_id: EntityId) -> ChatdeskResult<Vec<LabelRow>>;

    async fn outbound_template(&self, template_id: EntityId)
        -> ChatdeskResult<Option<TemplateRow>>;

    /// Functions of every addon version connected under an addons key.
    async fn addon_functions_by_key(
        &self,
        addons_key: &str,
    ) -> ChatdeskResult<Vec<AddonFunctionRow>>;

    async fn addon_version_functions(
        &self,
        addon_version_id: EntityId,
    ) -> ChatdeskResult<Vec<AddonFunctionRow>>;

    // ========================================================================
    // VISITOR
    // ========================================================================

    async fn visitor(&self, visitor_key: &str) -> ChatdeskResult<Option<VisitorRow>>;

    async fn visitor_key_by_external_key(
        &self,
        external_key: &str,
    ) -> ChatdeskResult<Option<String>>;
}
