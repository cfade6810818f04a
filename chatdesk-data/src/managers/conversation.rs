//! Conversation lookups.
//!
//! Conversation documents are written to the cache by the messaging service;
//! this layer only reads them and never syncs.

use chatdesk_core::{ChatdeskResult, EntityId, KeyTemplate};
use chatdesk_storage::{read_cached, CacheEncoding, SyncOrchestrator};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct ConversationManager {
    orchestrator: SyncOrchestrator,
}

impl ConversationManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Cached conversation document. An empty key is `None` without a cache call.
    pub async fn get_conversation(&self, conversation_key: &str) -> ChatdeskResult<Option<Value>> {
        if conversation_key.is_empty() {
            return Ok(None);
        }
        let key = KeyTemplate::Conversation.key(conversation_key);
        read_cached(self.orchestrator.handles().cache(), &key, CacheEncoding::Json).await
    }

    pub async fn get_account_total_conversation_count(&self, account_id: EntityId) -> ChatdeskResult<i64> {
        self.orchestrator
            .handles()
            .store()
            .account_conversation_count(account_id)
            .await
    }
}
