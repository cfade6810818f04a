//! Agent profiles, account roles and user preferences.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chatdesk_core::{AgentRoleRow, AgentRow, CacheKey, ChatdeskResult, EntityId, KeyTemplate};
use chatdesk_storage::{
    BatchGetter, Getter, RelationalStore, SearchResult, SyncOptions, SyncOrchestrator,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPayload {
    pub email: String,
    pub id: EntityId,
    pub first_name: String,
    pub last_name: String,
    pub image_name: Option<String>,
    pub user_type_id: Option<EntityId>,
}

impl From<AgentRow> for AgentPayload {
    fn from(row: AgentRow) -> Self {
        Self {
            email: row.email,
            id: row.id,
            first_name: row.first_name.unwrap_or_default(),
            last_name: row.last_name.unwrap_or_default(),
            image_name: row.image_name,
            user_type_id: row.user_type_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRolesPayload {
    pub status_id: EntityId,
    pub access: AgentAccess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAccess {
    /// Keyed `account_<id>`
    pub accounts: BTreeMap<String, RoleGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
}

fn account_access_key(account_id: EntityId) -> String {
    format!("account_{}", account_id)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentDetails;

#[async_trait]
impl Getter for AgentDetails {
    type Args = EntityId;
    type Raw = AgentRow;
    type Payload = AgentPayload;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        agent_id: &EntityId,
    ) -> ChatdeskResult<Option<AgentRow>> {
        let agent = store.agents(&[*agent_id]).await?.into_iter().next();
        if agent.is_none() {
            tracing::debug!(agent_id, "No agent in store");
        }
        Ok(agent)
    }

    fn prepare_payload(&self, raw: Option<AgentRow>, _search: SearchResult, agent_id: &EntityId) -> AgentPayload {
        raw.map(AgentPayload::from).unwrap_or_else(|| AgentPayload {
            email: String::new(),
            id: *agent_id,
            first_name: String::new(),
            last_name: String::new(),
            image_name: None,
            user_type_id: None,
        })
    }
}

/// Status and per-account roles of an agent. Both parts must exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgentRoles;

#[async_trait]
impl Getter for AgentRoles {
    type Args = EntityId;
    type Raw = (Vec<AgentRoleRow>, EntityId);
    type Payload = AgentRolesPayload;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        agent_id: &EntityId,
    ) -> ChatdeskResult<Option<(Vec<AgentRoleRow>, EntityId)>> {
        let roles = store.agent_roles(*agent_id).await?;
        let status = store.agent_status(*agent_id).await?;
        match status {
            Some(status) if !roles.is_empty() => Ok(Some((roles, status))),
            _ => {
                tracing::debug!(agent_id, "No roles for agent in store");
                Ok(None)
            }
        }
    }

    fn prepare_payload(
        &self,
        raw: Option<(Vec<AgentRoleRow>, EntityId)>,
        _search: SearchResult,
        _agent_id: &EntityId,
    ) -> AgentRolesPayload {
        let (roles, status_id) = raw.unwrap_or_default();
        AgentRolesPayload {
            status_id,
            access: AgentAccess {
                accounts: roles
                    .into_iter()
                    .map(|r| (account_access_key(r.account_id), RoleGrant { role: r.role }))
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MultipleAgentDetails;

#[async_trait]
impl BatchGetter for MultipleAgentDetails {
    type Id = EntityId;
    type Payload = AgentPayload;

    fn key_for(&self, agent_id: &EntityId) -> CacheKey {
        KeyTemplate::AgentData.key(agent_id)
    }

    async fn get_many_from_store(
        &self,
        store: &dyn RelationalStore,
        agent_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<(EntityId, AgentPayload)>> {
        Ok(store
            .agents(agent_ids)
            .await?
            .into_iter()
            .map(|row| (row.id, AgentPayload::from(row)))
            .collect())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UserPreferences;

#[async_trait]
impl Getter for UserPreferences {
    type Args = EntityId;
    type Raw = Value;
    type Payload = Value;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        user_id: &EntityId,
    ) -> ChatdeskResult<Option<Value>> {
        Ok(store.user_preferences(*user_id).await?.filter(|v| !v.is_null()))
    }

    fn prepare_payload(&self, raw: Option<Value>, _search: SearchResult, _user_id: &EntityId) -> Value {
        raw.unwrap_or_else(|| json!({}))
    }
}

#[derive(Debug, Clone)]
pub struct AgentManager {
    orchestrator: SyncOrchestrator,
}

impl AgentManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn get_agent_details(&self, agent_id: EntityId) -> ChatdeskResult<Option<AgentPayload>> {
        let key = KeyTemplate::AgentData.key(agent_id);
        self.orchestrator
            .read_through(&key, &AgentDetails, &agent_id, SyncOptions::default())
            .await
    }

    pub async fn get_agent_roles(&self, agent_id: EntityId) -> ChatdeskResult<Option<AgentRolesPayload>> {
        let key = KeyTemplate::AgentRole.key(agent_id);
        self.orchestrator
            .read_through(&key, &AgentRoles, &agent_id, SyncOptions::default())
            .await
    }

    /// Agents keyed by stringified id. Unknown ids are left out.
    pub async fn get_multiple_agent_details(
        &self,
        agent_ids: &[EntityId],
    ) -> ChatdeskResult<BTreeMap<String, AgentPayload>> {
        self.orchestrator
            .read_through_many(&MultipleAgentDetails, agent_ids)
            .await
    }

    pub async fn get_user_preferences(&self, user_id: EntityId) -> ChatdeskResult<Option<Value>> {
        let key = KeyTemplate::UserPreference.key(user_id);
        self.orchestrator
            .read_through(&key, &UserPreferences, &user_id, SyncOptions::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_test_utils::fixtures::agent_row;

    #[test]
    fn test_roles_keyed_by_account() {
        let roles = vec![
            AgentRoleRow {
                account_id: 3,
                role: "admin".to_string(),
            },
            AgentRoleRow {
                account_id: 8,
                role: "agent".to_string(),
            },
        ];
        let payload = AgentRoles.prepare_payload(Some((roles, 1)), SearchResult::empty(), &10);
        assert_eq!(payload.status_id, 1);
        assert_eq!(payload.access.accounts["account_3"].role, "admin");
        assert_eq!(payload.access.accounts["account_8"].role, "agent");
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["access"]["accounts"]["account_3"]["role"], "admin");
    }

    #[test]
    fn test_missing_names_become_empty() {
        let mut row = agent_row(4);
        row.first_name = None;
        let payload = AgentPayload::from(row);
        assert_eq!(payload.first_name, "");
        assert_eq!(payload.last_name, "Hopper");
    }
}
