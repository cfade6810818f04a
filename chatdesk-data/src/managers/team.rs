//! Team membership.

use async_trait::async_trait;
use chatdesk_core::{ChatdeskResult, EntityId, KeyTemplate};
use chatdesk_storage::{Getter, RelationalStore, SearchResult, SyncOptions, SyncOrchestrator};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamPayload {
    /// Members as `agent_<user_id>`
    pub members: Vec<String>,
}

/// Name a team member the way agent entries are addressed elsewhere.
pub fn member_name(user_id: EntityId) -> String {
    format!("agent_{}", user_id)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TeamMembers;

#[async_trait]
impl Getter for TeamMembers {
    type Args = EntityId;
    type Raw = Vec<EntityId>;
    type Payload = TeamPayload;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        team_id: &EntityId,
    ) -> ChatdeskResult<Option<Vec<EntityId>>> {
        let members = store.team_member_ids(*team_id).await?;
        if members.is_empty() {
            tracing::debug!(team_id, "No members for team in store");
            return Ok(None);
        }
        Ok(Some(members))
    }

    fn prepare_payload(&self, raw: Option<Vec<EntityId>>, _search: SearchResult, _team_id: &EntityId) -> TeamPayload {
        TeamPayload {
            members: raw.unwrap_or_default().into_iter().map(member_name).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TeamManager {
    orchestrator: SyncOrchestrator,
}

impl TeamManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn get_team_members(&self, team_id: EntityId) -> ChatdeskResult<Option<TeamPayload>> {
        let key = KeyTemplate::TeamData.key(team_id);
        self.orchestrator
            .read_through(&key, &TeamMembers, &team_id, SyncOptions::default())
            .await
    }
}
