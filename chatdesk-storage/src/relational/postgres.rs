//! PostgreSQL relational store over a deadpool connection pool.

use async_trait::async_trait;
use chatdesk_core::{
    AccountRow, AddonFunctionRow, AgentRoleRow, AgentRow, BotRow, BotSummaryRow,
    ChannelConfigurationRow, ChatdeskResult, DatabaseKind, DbConfig, EntityId, FeatureRow,
    LabelRow, OutboundBalanceRow, PopupMessageRow, StorageError, TemplateRow, TriggerRulesRow,
    VariableRow, VisitorRow,
};
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

use super::RelationalStore;

// ============================================================================
// CONNECTION POOL
// ============================================================================

/// Create a connection pool from configuration.
pub fn create_pool(config: &DbConfig) -> ChatdeskResult<Pool> {
    let DatabaseKind::Postgres = config.kind;
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.dbname = Some(config.dbname.clone());
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    let mut pool_config = deadpool_postgres::PoolConfig::new(config.max_size);
    pool_config.timeouts.wait = Some(config.timeout);
    cfg.pool = Some(pool_config);

    cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
        StorageError::PoolUnavailable {
            reason: format!("Failed to create pool: {}", e),
        }
        .into()
    })
}

// ============================================================================
// ROW DECODING
// ============================================================================

trait FromPgRow: Sized {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error>;
}

impl FromPgRow for AccountRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            account_key: row.try_get("account_key")?,
            owner_id: row.try_get("owner_id")?,
            timezone: row.try_get("timezone")?,
            operating_hours: row.try_get("operating_hours")?,
            registered_domains: row.try_get("registered_domains")?,
            site_url: row.try_get("site_url")?,
            is_domain_restricted: row.try_get("is_domain_restricted")?,
            subscription_id: row.try_get("subscription_id")?,
            activation_source: row.try_get("activation_source")?,
            plan_id: row.try_get("plan_id")?,
            plan_name: row.try_get("plan_name")?,
        })
    }
}

impl FromPgRow for BotSummaryRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            name: row.try_get("name")?,
            bot_type_id: row.try_get("bot_type_id")?,
            channel_id: row.try_get("channel_id")?,
            is_deleted: row.try_get("is_deleted")?,
        })
    }
}

impl FromPgRow for FeatureRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            account_id: row.try_get("account_id")?,
            feature_id: row.try_get("feature_id")?,
            key: row.try_get("key")?,
            config: row.try_get("config")?,
        })
    }
}

impl FromPgRow for PopupMessageRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            url_regex: row.try_get("url_regex")?,
            message: row.try_get("message")?,
        })
    }
}

impl FromPgRow for OutboundBalanceRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            account_id: row.try_get("account_id")?,
            start_at: row.try_get("start_at")?,
            end_at: row.try_get("end_at")?,
            config: row.try_get("config")?,
        })
    }
}

impl FromPgRow for BotRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            name: row.try_get("name")?,
            channel_id: row.try_get("channel_id")?,
            bot_type_id: row.try_get("bot_type_id")?,
            bot_lead_id: row.try_get("bot_lead_id")?,
            preview_key: row.try_get("preview_key")?,
            publish_key: row.try_get("publish_key")?,
            published_version_id: row.try_get("published_version_id")?,
            draft_version_id: row.try_get("draft_version_id")?,
            settings: row.try_get("settings")?,
            is_deleted: row.try_get("is_deleted")?,
            created_by_first_name: row.try_get("created_by_first_name")?,
            created_by_last_name: row.try_get("created_by_last_name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromPgRow for TriggerRulesRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            bot_id: row.try_get("bot_id")?,
            trigger_rules: row.try_get("trigger_rules")?,
        })
    }
}

impl FromPgRow for AgentRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            image_name: row.try_get("image_name")?,
            user_type_id: row.try_get("user_type_id")?,
        })
    }
}

impl FromPgRow for AgentRoleRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            account_id: row.try_get("account_id")?,
            role: row.try_get("role")?,
        })
    }
}

impl FromPgRow for ChannelConfigurationRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            account_id: row.try_get("account_id")?,
            channel_id: row.try_get("channel_id")?,
            name: row.try_get("name")?,
            configuration: row.try_get("configuration")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl FromPgRow for VariableRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            name: row.try_get("name")?,
            parameter: row.try_get("parameter")?,
            normalized_parameter: row.try_get("normalized_parameter")?,
            format: row.try_get("format")?,
            status: row.try_get("status")?,
            error_message: row.try_get("error_message")?,
            validation: row.try_get("validation")?,
            is_contact_page_qualified_variable: row
                .try_get("is_contact_page_qualified_variable")?,
            variable_type: row.try_get("type")?,
        })
    }
}

impl FromPgRow for TemplateRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            template_id: row.try_get("template_id")?,
            template_name: row.try_get("template_name")?,
            channel_id: row.try_get("channel_id")?,
            channel_configuration_id: row.try_get("channel_configuration_id")?,
            status: row.try_get("status")?,
            category: row.try_get("category")?,
            channel_provider_id: row.try_get("channel_provider_id")?,
            template_configuration: row.try_get("template_configuration")?,
            components: row.try_get("components")?,
            media_id: row.try_get("media_id")?,
        })
    }
}

impl FromPgRow for AddonFunctionRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            addon_version_id: row.try_get("addon_version_id")?,
            authentication_type: row.try_get("authentication_type")?,
            function_name: row.try_get("function_name")?,
            script: row.try_get("script")?,
            script_language: row.try_get("script_language")?,
            parameter: row.try_get("parameter")?,
            auth_parameters: row.try_get("auth_parameters")?,
        })
    }
}

impl FromPgRow for LabelRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            label: row.try_get("label")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromPgRow for VisitorRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            visitor_key: row.try_get("visitor_key")?,
            external_key: row.try_get("external_key")?,
            account_id: row.try_get("account_id")?,
            channel_id: row.try_get("channel_id")?,
        })
    }
}

// ============================================================================
// SQL
// ============================================================================

const ACCOUNTS_SQL: &str = "\
    SELECT a.id, a.name, a.account_key, a.owner_id, a.timezone, a.operating_hours, \
           a.registered_domains, a.site_url, a.is_domain_restricted, \
           s.id AS subscription_id, s.activation_source, p.id AS plan_id, p.name AS plan_name \
    FROM accounts a \
    LEFT JOIN subscriptions s ON s.account_id = a.id AND s.is_active \
    LEFT JOIN plans p ON p.id = s.plan_id \
    WHERE a.id = ANY($1) AND NOT a.is_deleted";

const ACCOUNT_BOTS_SQL: &str = "\
    SELECT id, account_id, name, bot_type_id, channel_id, is_deleted \
    FROM bots \
    WHERE account_id = ANY($1) AND (cardinality($2::bigint[]) = 0 OR bot_type_id = ANY($2)) \
    ORDER BY id";

const ACCOUNT_FEATURES_SQL: &str = "\
    SELECT s.account_id, f.id AS feature_id, f.key, pf.config \
    FROM subscriptions s \
    JOIN plan_features pf ON pf.plan_id = s.plan_id \
    JOIN features f ON f.id = pf.feature_id \
    WHERE s.account_id = ANY($1) AND s.is_active";

const POPUP_MESSAGES_SQL: &str = "\
    SELECT id, account_id, url_regex, message \
    FROM popup_messages \
    WHERE account_id = ANY($1) AND is_active \
    ORDER BY id";

const OUTBOUND_BALANCE_SQL: &str = "\
    SELECT s.account_id, s.start_at, s.end_at, p.config \
    FROM subscriptions s \
    JOIN plans p ON p.id = s.plan_id \
    WHERE s.account_id = $1 AND s.is_active \
    ORDER BY s.start_at DESC \
    LIMIT 1";

const BOT_SQL: &str = "\
    SELECT b.id, b.account_id, b.name, b.channel_id, b.bot_type_id, b.bot_lead_id, \
           b.preview_key, b.publish_key, b.published_version_id, b.draft_version_id, \
           b.settings, b.is_deleted, b.created_at, \
           u.first_name AS created_by_first_name, u.last_name AS created_by_last_name \
    FROM bots b \
    LEFT JOIN users u ON u.id = b.created_by \
    WHERE b.id = $1";

const BOT_CHANNEL_CONFIGURATION_SQL: &str = "\
    SELECT cc.id, cc.account_id, cc.channel_id, cc.name, cc.configuration, cc.is_active \
    FROM bot_channel_configurations bcc \
    JOIN channel_configurations cc ON cc.id = bcc.channel_configuration_id \
    WHERE bcc.bot_id = $1 AND cc.channel_id = $2 \
    LIMIT 1";

const VISITOR_SQL: &str = "\
    SELECT id, visitor_key, external_key, account_id, channel_id \
    FROM visitors \
    WHERE visitor_key = $1";

const ADDON_FUNCTIONS_BY_KEY_SQL: &str = "\
    SELECT av.id AS addon_version_id, a.authentication_type, af.name AS function_name, \
           af.script, af.script_language, af.parameter, ca.auth_parameters \
    FROM connected_addons ca \
    JOIN addon_versions av ON av.id = ca.addon_version_id \
    JOIN addons a ON a.id = av.addon_id \
    JOIN addon_functions af ON af.addon_version_id = av.id \
    WHERE ca.addons_key = $1 AND ca.is_active \
    ORDER BY af.id";

const ADDON_VERSION_FUNCTIONS_SQL: &str = "\
    SELECT av.id AS addon_version_id, a.authentication_type, af.name AS function_name, \
           af.script, af.script_language, af.parameter, NULL::jsonb AS auth_parameters \
    FROM addon_versions av \
    JOIN addons a ON a.id = av.addon_id \
    JOIN addon_functions af ON af.addon_version_id = av.id \
    WHERE av.id = $1 \
    ORDER BY af.id";

fn query_failed(query: &str, e: tokio_postgres::Error) -> StorageError {
    StorageError::QueryFailed {
        query: query.to_string(),
        reason: e.to_string(),
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Relational store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgRelationalStore {
    pool: Pool,
}

impl PgRelationalStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DbConfig) -> ChatdeskResult<Self> {
        Ok(Self::new(create_pool(config)?))
    }

    /// Acquire a pooled session. It returns to the pool when dropped.
    pub async fn session(&self) -> ChatdeskResult<Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::PoolUnavailable {
                reason: e.to_string(),
            }
            .into()
        })
    }

    async fn query_rows<T: FromPgRow>(
        &self,
        query: &'static str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> ChatdeskResult<Vec<T>> {
        let session = self.session().await?;
        let rows = session
            .query(sql, params)
            .await
            .map_err(|e| query_failed(query, e))?;
        rows.iter()
            .map(|row| {
                T::from_row(row).map_err(|e| {
                    StorageError::RowDecode {
                        query: query.to_string(),
                        reason: e.to_string(),
                    }
                    .into()
                })
            })
            .collect()
    }

    async fn query_first<T: FromPgRow>(
        &self,
        query: &'static str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> ChatdeskResult<Option<T>> {
        Ok(self.query_rows(query, sql, params).await?.into_iter().next())
    }

    /// Single column of at most one row.
    async fn query_scalar<T>(
        &self,
        query: &'static str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> ChatdeskResult<Option<T>>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        let session = self.session().await?;
        let row = session
            .query_opt(sql, params)
            .await
            .map_err(|e| query_failed(query, e))?;
        match row {
            Some(row) => row.try_get::<_, Option<T>>(0).map_err(|e| {
                StorageError::RowDecode {
                    query: query.to_string(),
                    reason: e.to_string(),
                }
                .into()
            }),
            None => Ok(None),
        }
    }

    async fn count(
        &self,
        query: &'static str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> ChatdeskResult<i64> {
        Ok(self
            .query_scalar::<i64>(query, sql, params)
            .await?
            .unwrap_or(0))
    }
}

#[async_trait]
impl RelationalStore for PgRelationalStore {
    async fn accounts(&self, account_ids: &[EntityId]) -> ChatdeskResult<Vec<AccountRow>> {
        self.query_rows("accounts", ACCOUNTS_SQL, &[&account_ids])
            .await
    }

    async fn account_bots(
        &self,
        account_ids: &[EntityId],
        bot_type_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<BotSummaryRow>> {
        self.query_rows("account_bots", ACCOUNT_BOTS_SQL, &[&account_ids, &bot_type_ids])
            .await
    }

    async fn account_features(&self, account_ids: &[EntityId]) -> ChatdeskResult<Vec<FeatureRow>> {
        self.query_rows("account_features", ACCOUNT_FEATURES_SQL, &[&account_ids])
            .await
    }

    async fn account_popup_messages(
        &self,
        account_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<PopupMessageRow>> {
        self.query_rows("account_popup_messages", POPUP_MESSAGES_SQL, &[&account_ids])
            .await
    }

    async fn outbound_balance(
        &self,
        account_id: EntityId,
    ) -> ChatdeskResult<Option<OutboundBalanceRow>> {
        self.query_first("outbound_balance", OUTBOUND_BALANCE_SQL, &[&account_id])
            .await
    }

    async fn account_id_by_key(&self, account_key: &str) -> ChatdeskResult<Option<EntityId>> {
        self.query_scalar(
            "account_id_by_key",
            "SELECT id FROM accounts WHERE account_key = $1 AND NOT is_deleted",
            &[&account_key],
        )
        .await
    }

    async fn account_visitor_count(&self, account_id: EntityId) -> ChatdeskResult<i64> {
        self.count(
            "account_visitor_count",
            "SELECT COUNT(id) FROM visitors WHERE account_id = $1",
            &[&account_id],
        )
        .await
    }

    async fn account_conversation_count(&self, account_id: EntityId) -> ChatdeskResult<i64> {
        self.count(
            "account_conversation_count",
            "SELECT COUNT(id) FROM conversations WHERE account_id = $1",
            &[&account_id],
        )
        .await
    }

    async fn bot(&self, bot_id: EntityId) -> ChatdeskResult<Option<BotRow>> {
        self.query_first("bot", BOT_SQL, &[&bot_id]).await
    }

    async fn bot_channel_configuration(
        &self,
        bot_id: EntityId,
        channel_id: EntityId,
    ) -> ChatdeskResult<Option<ChannelConfigurationRow>> {
        self.query_first(
            "bot_channel_configuration",
            BOT_CHANNEL_CONFIGURATION_SQL,
            &[&bot_id, &channel_id],
        )
        .await
    }

    async fn bot_flow(&self, version_id: EntityId) -> ChatdeskResult<Option<Value>> {
        self.query_scalar(
            "bot_flow",
            "SELECT conversation_dialog FROM bot_versions WHERE id = $1",
            &[&version_id],
        )
        .await
    }

    async fn bot_trigger_rules(&self, bot_ids: &[EntityId]) -> ChatdeskResult<Vec<TriggerRulesRow>> {
        self.query_rows(
            "bot_trigger_rules",
            "SELECT id AS bot_id, trigger_rules FROM bots WHERE id = ANY($1)",
            &[&bot_ids],
        )
        .await
    }

    async fn bot_id_by_publish_key(&self, publish_key: &str) -> ChatdeskResult<Option<EntityId>> {
        self.query_scalar(
            "bot_id_by_publish_key",
            "SELECT id FROM bots WHERE publish_key = $1 AND NOT is_deleted",
            &[&publish_key],
        )
        .await
    }

    async fn bot_versions(&self, bot_id: EntityId) -> ChatdeskResult<Vec<EntityId>> {
        let session = self.session().await?;
        let rows = session
            .query(
                "SELECT id FROM bot_versions WHERE bot_id = $1 ORDER BY id",
                &[&bot_id],
            )
            .await
            .map_err(|e| query_failed("bot_versions", e))?;
        rows.iter()
            .map(|row| {
                row.try_get::<_, EntityId>(0).map_err(|e| {
                    StorageError::RowDecode {
                        query: "bot_versions".to_string(),
                        reason: e.to_string(),
                    }
                    .into()
                })
            })
            .collect()
    }

    async fn agents(&self, agent_ids: &[EntityId]) -> ChatdeskResult<Vec<AgentRow>> {
        self.query_rows(
            "agents",
            "SELECT id, email, first_name, last_name, image_name, user_type_id \
             FROM users WHERE id = ANY($1)",
            &[&agent_ids],
        )
        .await
    }

    async fn agent_roles(&self, agent_id: EntityId) -> ChatdeskResult<Vec<AgentRoleRow>> {
        self.query_rows(
            "agent_roles",
            "SELECT ua.account_id, r.name AS role \
             FROM user_accounts ua JOIN roles r ON r.id = ua.role_id \
             WHERE ua.user_id = $1",
            &[&agent_id],
        )
        .await
    }

    async fn agent_status(&self, agent_id: EntityId) -> ChatdeskResult<Option<EntityId>> {
        self.query_scalar(
            "agent_status",
            "SELECT status_id FROM agent_statuses WHERE user_id = $1",
            &[&agent_id],
        )
        .await
    }

    async fn user_preferences(&self, user_id: EntityId) -> ChatdeskResult<Option<Value>> {
        self.query_scalar(
            "user_preferences",
            "SELECT preferences FROM user_preferences WHERE user_id = $1",
            &[&user_id],
        )
        .await
    }

    async fn team_member_ids(&self, team_id: EntityId) -> ChatdeskResult<Vec<EntityId>> {
        let session = self.session().await?;
        let rows = session
            .query(
                "SELECT user_id FROM team_members WHERE team_id = $1 ORDER BY user_id",
                &[&team_id],
            )
            .await
            .map_err(|e| query_failed("team_member_ids", e))?;
        rows.iter()
            .map(|row| {
                row.try_get::<_, EntityId>(0).map_err(|e| {
                    StorageError::RowDecode {
                        query: "team_member_ids".to_string(),
                        reason: e.to_string(),
                    }
                    .into()
                })
            })
            .collect()
    }

    async fn channel_configuration(
        &self,
        channel_configuration_id: EntityId,
    ) -> ChatdeskResult<Option<ChannelConfigurationRow>> {
        self.query_first(
            "channel_configuration",
            "SELECT id, account_id, channel_id, name, configuration, is_active \
             FROM channel_configurations WHERE id = $1",
            &[&channel_configuration_id],
        )
        .await
    }

    async fn account_variables(&self, account_id: EntityId) -> ChatdeskResult<Vec<VariableRow>> {
        self.query_rows(
            "account_variables",
            "SELECT name, parameter, normalized_parameter, format, status, error_message, \
                    validation, is_contact_page_qualified_variable, type \
             FROM variables WHERE account_id = $1 AND NOT is_deleted",
            &[&account_id],
        )
        .await
    }

    async fn account_labels(&self, account_id: EntityId) -> ChatdeskResult<Vec<LabelRow>> {
        self.query_rows(
            "account_labels",
            "SELECT id, label, created_by, created_at \
             FROM conversation_labels WHERE account_id = $1 ORDER BY id",
            &[&account_id],
        )
        .await
    }

    async fn outbound_template(
        &self,
        template_id: EntityId,
    ) -> ChatdeskResult<Option<TemplateRow>> {
        self.query_first(
            "outbound_template",
            "SELECT id AS template_id, name AS template_name, channel_id, \
                    channel_configuration_id, status, category, channel_provider_id, \
                    template_configuration, components, media_id \
             FROM outbound_templates WHERE id = $1",
            &[&template_id],
        )
        .await
    }

    async fn addon_functions_by_key(
        &self,
        addons_key: &str,
    ) -> ChatdeskResult<Vec<AddonFunctionRow>> {
        self.query_rows("addon_functions_by_key", ADDON_FUNCTIONS_BY_KEY_SQL, &[&addons_key])
            .await
    }

    async fn addon_version_functions(
        &self,
        addon_version_id: EntityId,
    ) -> ChatdeskResult<Vec<AddonFunctionRow>> {
        self.query_rows(
            "addon_version_functions",
            ADDON_VERSION_FUNCTIONS_SQL,
            &[&addon_version_id],
        )
            .await
    }

    async fn visitor(&self, visitor_key: &str) -> ChatdeskResult<Option<VisitorRow>> {
        self.query_first("visitor", VISITOR_SQL, &[&visitor_key])
            .await
    }

    async fn visitor_key_by_external_key(
        &self,
        external_key: &str,
    ) -> ChatdeskResult<Option<String>> {
        self.query_scalar(
            "visitor_key_by_external_key",
            "SELECT visitor_key FROM visitors WHERE external_key = $1",
            &[&external_key],
        )
        .await
    }
}

impl std::fmt::Debug for PgRelationalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = self.pool.status();
        f.debug_struct("PgRelationalStore")
            .field("size", &status.size)
            .field("available", &status.available)
            .finish()
    }
}
