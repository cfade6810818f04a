//! Account variable definitions.

use async_trait::async_trait;
use chatdesk_core::{
    variable_info, ChatdeskResult, EntityId, KeyTemplate, VariableInfo, VariableMap, VariableRow,
};
use chatdesk_storage::{Getter, RelationalStore, SearchResult, SyncOptions, SyncOrchestrator};

/// Variables of an account keyed by their pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountVariables;

#[async_trait]
impl Getter for AccountVariables {
    type Args = EntityId;
    type Raw = Vec<VariableRow>;
    type Payload = VariableMap;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        account_id: &EntityId,
    ) -> ChatdeskResult<Option<Vec<VariableRow>>> {
        let rows = store.account_variables(*account_id).await?;
        Ok(if rows.is_empty() { None } else { Some(rows) })
    }

    fn prepare_payload(
        &self,
        raw: Option<Vec<VariableRow>>,
        _search: SearchResult,
        _account_id: &EntityId,
    ) -> VariableMap {
        raw.unwrap_or_default()
            .into_iter()
            .map(|row| (row.parameter.clone(), row))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct VariableManager {
    orchestrator: SyncOrchestrator,
}

impl VariableManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn get_variables(&self, account_id: EntityId) -> ChatdeskResult<Option<VariableMap>> {
        let key = KeyTemplate::AccountVariables.key(account_id);
        self.orchestrator
            .read_through(&key, &AccountVariables, &account_id, SyncOptions::default())
            .await
    }

    /// Format and index value slot of a normalized variable name. Accounts
    /// without variables resolve every name as text.
    pub async fn get_variable_info(&self, account_id: EntityId, normalized: &str) -> ChatdeskResult<VariableInfo> {
        let variables = self.get_variables(account_id).await?.unwrap_or_default();
        Ok(variable_info(&variables, normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_test_utils::fixtures::variable_row;

    #[test]
    fn test_variables_keyed_by_parameter() {
        let rows = vec![variable_row("phone", Some("phone")), variable_row("age", Some("number"))];
        let map = AccountVariables.prepare_payload(Some(rows), SearchResult::empty(), &1);
        assert_eq!(map.len(), 2);
        assert_eq!(map["¿·$user.info.age·?"].normalized_parameter, "visitor_age");
    }
}
