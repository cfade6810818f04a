//! Channel configurations by id.

use async_trait::async_trait;
use chatdesk_core::{ChannelConfigurationRow, ChatdeskResult, EntityId, KeyTemplate};
use chatdesk_storage::{Getter, RelationalStore, SearchResult, SyncOptions, SyncOrchestrator};

#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelConfigurationDetails;

#[async_trait]
impl Getter for ChannelConfigurationDetails {
    type Args = EntityId;
    type Raw = ChannelConfigurationRow;
    type Payload = ChannelConfigurationRow;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        id: &EntityId,
    ) -> ChatdeskResult<Option<ChannelConfigurationRow>> {
        store.channel_configuration(*id).await
    }

    fn prepare_payload(
        &self,
        raw: Option<ChannelConfigurationRow>,
        _search: SearchResult,
        id: &EntityId,
    ) -> ChannelConfigurationRow {
        raw.unwrap_or_else(|| ChannelConfigurationRow {
            id: *id,
            account_id: 0,
            channel_id: 0,
            name: None,
            configuration: None,
            is_active: false,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChannelConfigurationManager {
    orchestrator: SyncOrchestrator,
}

impl ChannelConfigurationManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn get_channel_configuration(
        &self,
        id: EntityId,
    ) -> ChatdeskResult<Option<ChannelConfigurationRow>> {
        let key = KeyTemplate::ChannelConfiguration.key(id);
        self.orchestrator
            .read_through(&key, &ChannelConfigurationDetails, &id, SyncOptions::default())
            .await
    }
}
