//! Outbound message templates.

use async_trait::async_trait;
use chatdesk_core::{ChatdeskResult, EntityId, KeyTemplate, TemplateRow};
use chatdesk_storage::{Getter, RelationalStore, SearchResult, SyncOptions, SyncOrchestrator};

/// Cached template shape, identical to the store projection.
pub type TemplatePayload = TemplateRow;

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateDetails;

#[async_trait]
impl Getter for TemplateDetails {
    type Args = EntityId;
    type Raw = TemplateRow;
    type Payload = TemplatePayload;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        template_id: &EntityId,
    ) -> ChatdeskResult<Option<TemplateRow>> {
        store.outbound_template(*template_id).await
    }

    fn prepare_payload(
        &self,
        raw: Option<TemplateRow>,
        _search: SearchResult,
        template_id: &EntityId,
    ) -> TemplatePayload {
        raw.unwrap_or_else(|| TemplateRow {
            template_id: *template_id,
            template_name: String::new(),
            channel_id: None,
            channel_configuration_id: None,
            status: None,
            category: None,
            channel_provider_id: None,
            template_configuration: None,
            components: None,
            media_id: None,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TemplateManager {
    orchestrator: SyncOrchestrator,
}

impl TemplateManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn get_template_details(&self, template_id: EntityId) -> ChatdeskResult<Option<TemplatePayload>> {
        let key = KeyTemplate::OutboundTemplate.key(template_id);
        self.orchestrator
            .read_through(&key, &TemplateDetails, &template_id, SyncOptions::default())
            .await
    }
}
