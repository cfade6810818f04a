//! Conversation labels of an account.

use async_trait::async_trait;
use chatdesk_core::{ChatdeskResult, EntityId, KeyTemplate, LabelRow};
use chatdesk_storage::{Getter, RelationalStore, SearchResult, SyncOptions, SyncOrchestrator};
use serde::{Deserialize, Serialize};

const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPayload {
    pub id: EntityId,
    pub label: String,
    pub created_by: Option<EntityId>,
    pub created_at: Option<String>,
}

impl From<LabelRow> for LabelPayload {
    fn from(row: LabelRow) -> Self {
        Self {
            id: row.id,
            label: row.label,
            created_by: row.created_by,
            created_at: row.created_at.map(|t| t.format(CREATED_AT_FORMAT).to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AccountLabels;

#[async_trait]
impl Getter for AccountLabels {
    type Args = EntityId;
    type Raw = Vec<LabelRow>;
    type Payload = Vec<LabelPayload>;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        account_id: &EntityId,
    ) -> ChatdeskResult<Option<Vec<LabelRow>>> {
        let rows = store.account_labels(*account_id).await?;
        if rows.is_empty() {
            tracing::debug!(account_id, "No labels for account in store");
            return Ok(None);
        }
        Ok(Some(rows))
    }

    fn prepare_payload(
        &self,
        raw: Option<Vec<LabelRow>>,
        _search: SearchResult,
        _account_id: &EntityId,
    ) -> Vec<LabelPayload> {
        raw.unwrap_or_default().into_iter().map(LabelPayload::from).collect()
    }
}

#[derive(Debug, Clone)]
pub struct LabelManager {
    orchestrator: SyncOrchestrator,
}

impl LabelManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Labels in id order, `None` for an account without labels.
    pub async fn get_account_labels(&self, account_id: EntityId) -> ChatdeskResult<Option<Vec<LabelPayload>>> {
        let key = KeyTemplate::AccountLabels.key(account_id);
        self.orchestrator
            .read_through(&key, &AccountLabels, &account_id, SyncOptions::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_test_utils::fixtures::label_row;

    #[test]
    fn test_created_at_rendered_as_text() {
        let payload = LabelPayload::from(label_row(4, "vip"));
        assert_eq!(payload.created_at.as_deref(), Some("2024-03-01 09:30:00"));

        let mut row = label_row(5, "spam");
        row.created_at = None;
        assert_eq!(LabelPayload::from(row).created_at, None);
    }
}
