//! Bot details, conversation flows, trigger rules and publish keys.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chatdesk_core::{
    BotRow, CacheKey, Channel, ChannelConfigurationRow, ChatdeskResult, EntityId, KeyTemplate,
};
use chatdesk_storage::{
    BatchGetter, CacheEncoding, Getter, RelationalStore, SearchResult, SyncOptions,
    SyncOrchestrator,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BotPayload {
    pub bot_id: EntityId,
    pub bot_lead_id: Option<EntityId>,
    pub account_id: EntityId,
    pub bot_title: String,
    pub channel_id: Option<EntityId>,
    #[serde(rename = "type")]
    pub bot_type_id: Option<EntityId>,
    pub preview_key: Option<String>,
    pub publish_key: Option<String>,
    pub latest_publish_version_id: Option<EntityId>,
    pub latest_preview_version_id: Option<EntityId>,
    pub settings: Option<Value>,
    pub is_deleted: bool,
    pub created_by_name: String,
    pub created_at: Option<String>,
    /// Messenger page configuration, `{}` for other channels
    pub channel_configurations: Value,
}

#[derive(Debug, Clone)]
pub struct BotRows {
    pub bot: BotRow,
    pub channel_configuration: Option<ChannelConfigurationRow>,
}

fn channel_configuration_json(row: &ChannelConfigurationRow) -> Value {
    json!({
        "id": row.id,
        "account_id": row.account_id,
        "channel_id": row.channel_id,
        "name": row.name,
        "configuration": row.configuration,
        "is_active": row.is_active,
    })
}

/// One bot with its creator and messenger configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BotDetails;

#[async_trait]
impl Getter for BotDetails {
    type Args = EntityId;
    type Raw = BotRows;
    type Payload = BotPayload;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        bot_id: &EntityId,
    ) -> ChatdeskResult<Option<BotRows>> {
        let Some(bot) = store.bot(*bot_id).await? else {
            tracing::debug!(bot_id, "No bot in store");
            return Ok(None);
        };
        let messenger = Channel::FacebookMessenger.id();
        let channel_configuration = if bot.channel_id == Some(messenger) {
            store.bot_channel_configuration(bot.id, messenger).await?
        } else {
            None
        };
        Ok(Some(BotRows {
            bot,
            channel_configuration,
        }))
    }

    fn prepare_payload(&self, raw: Option<BotRows>, _search: SearchResult, bot_id: &EntityId) -> BotPayload {
        let Some(BotRows {
            bot,
            channel_configuration,
        }) = raw
        else {
            return BotPayload {
                bot_id: *bot_id,
                channel_configurations: json!({}),
                ..BotPayload::default()
            };
        };

        BotPayload {
            bot_id: bot.id,
            bot_lead_id: bot.bot_lead_id,
            account_id: bot.account_id,
            bot_title: bot.name,
            channel_id: bot.channel_id,
            bot_type_id: bot.bot_type_id,
            preview_key: bot.preview_key,
            publish_key: bot.publish_key,
            latest_publish_version_id: bot.published_version_id,
            latest_preview_version_id: bot.draft_version_id,
            settings: bot.settings,
            is_deleted: bot.is_deleted,
            created_by_name: format!(
                "{} {}",
                bot.created_by_first_name.unwrap_or_default(),
                bot.created_by_last_name.unwrap_or_default()
            ),
            created_at: bot
                .created_at
                .map(|t| t.format(CREATED_AT_FORMAT).to_string()),
            channel_configurations: channel_configuration
                .as_ref()
                .map_or_else(|| json!({}), channel_configuration_json),
        }
    }
}

/// Conversation dialog of a bot version.
#[derive(Debug, Clone, Copy, Default)]
pub struct BotFlow;

#[async_trait]
impl Getter for BotFlow {
    type Args = EntityId;
    type Raw = Value;
    type Payload = Value;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        version_id: &EntityId,
    ) -> ChatdeskResult<Option<Value>> {
        Ok(store.bot_flow(*version_id).await?.filter(|v| !v.is_null()))
    }

    fn prepare_payload(&self, raw: Option<Value>, _search: SearchResult, _version_id: &EntityId) -> Value {
        raw.unwrap_or_else(|| json!({}))
    }
}

/// Trigger rules of many bots. Bots without rules are not cached.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipleBotTriggerRules;

#[async_trait]
impl BatchGetter for MultipleBotTriggerRules {
    type Id = EntityId;
    type Payload = Value;

    fn key_for(&self, bot_id: &EntityId) -> CacheKey {
        KeyTemplate::BotTriggerRules.key(bot_id)
    }

    async fn get_many_from_store(
        &self,
        store: &dyn RelationalStore,
        bot_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<(EntityId, Value)>> {
        Ok(store
            .bot_trigger_rules(bot_ids)
            .await?
            .into_iter()
            .filter_map(|row| {
                row.trigger_rules
                    .filter(|rules| !rules.is_null())
                    .map(|rules| (row.bot_id, rules))
            })
            .collect())
    }
}

/// Bot id behind a publish key.
#[derive(Debug, Clone, Copy, Default)]
pub struct BotIdByPublishKey;

#[async_trait]
impl Getter for BotIdByPublishKey {
    type Args = String;
    type Raw = EntityId;
    type Payload = EntityId;

    const ENCODING: CacheEncoding = CacheEncoding::Scalar;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        publish_key: &String,
    ) -> ChatdeskResult<Option<EntityId>> {
        store.bot_id_by_publish_key(publish_key).await
    }

    fn prepare_payload(&self, raw: Option<EntityId>, _search: SearchResult, _key: &String) -> EntityId {
        raw.unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct BotManager {
    orchestrator: SyncOrchestrator,
}

impl BotManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn get_bot_details(&self, bot_id: EntityId) -> ChatdeskResult<Option<BotPayload>> {
        let key = KeyTemplate::BotData.key(bot_id);
        self.orchestrator
            .read_through(&key, &BotDetails, &bot_id, SyncOptions::default())
            .await
    }

    pub async fn get_bot_flow_details(&self, version_id: EntityId) -> ChatdeskResult<Option<Value>> {
        let key = KeyTemplate::BotFlow.key(version_id);
        self.orchestrator
            .read_through(&key, &BotFlow, &version_id, SyncOptions::default())
            .await
    }

    pub async fn get_multiple_bot_trigger_rules(
        &self,
        bot_ids: &[EntityId],
    ) -> ChatdeskResult<BTreeMap<String, Value>> {
        self.orchestrator
            .read_through_many(&MultipleBotTriggerRules, bot_ids)
            .await
    }

    pub async fn get_bot_id_by_publish_key(&self, publish_key: &str) -> ChatdeskResult<Option<EntityId>> {
        let key = KeyTemplate::BotPublishKeyIdMapping.key(publish_key);
        self.orchestrator
            .read_through(&key, &BotIdByPublishKey, &publish_key.to_string(), SyncOptions::default())
            .await
    }

    /// Version ids of a bot in ascending order, straight from the store.
    pub async fn get_bot_versions(&self, bot_id: EntityId) -> ChatdeskResult<Vec<EntityId>> {
        self.orchestrator.handles().store().bot_versions(bot_id).await
    }
}
