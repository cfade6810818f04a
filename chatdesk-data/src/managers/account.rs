//! Account details, outbound message balance and account key lookups.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chatdesk_core::{
    AccountRow, BotSummaryRow, CacheKey, ChatdeskResult, EntityId, FeatureRow, KeyTemplate,
    OutboundBalanceRow, PopupMessageRow,
};
use chatdesk_storage::{
    BatchGetter, CacheEncoding, Getter, RelationalStore, SearchIndex, SearchResult, SyncOptions,
    SyncOrchestrator,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const USED_OUTBOUND_MESSAGES: &str = "used_outbound_messages";
const MAX_OUTBOUND_MESSAGES: &str = "max_outbound_messages";

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountPayload {
    pub account_id: EntityId,
    pub account_name: String,
    pub account_key: String,
    pub owner_id: Option<EntityId>,
    pub timezone: Option<String>,
    /// Operating hours JSON re-encoded as a string
    pub operating_hours: Option<String>,
    /// 0 or 1
    pub is_domain_restricted: u8,
    pub registered_domains: Option<Vec<String>>,
    pub site_url: Option<Value>,
    pub bots: Vec<String>,
    pub deleted_bots: Vec<String>,
    pub subscription: Subscription,
    pub popup_messages: Vec<PopupMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Option<EntityId>,
    pub activation_source: Option<String>,
    pub plan: Plan,
    pub features: BTreeMap<String, Feature>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: Option<EntityId>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: EntityId,
    pub config: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupMessage {
    pub id: EntityId,
    pub url_regex: String,
    pub message: String,
}

/// Store rows making up one account.
#[derive(Debug, Clone)]
pub struct AccountRows {
    pub account: AccountRow,
    pub bots: Vec<BotSummaryRow>,
    pub features: Vec<FeatureRow>,
    pub popup_messages: Vec<PopupMessageRow>,
}

fn compose_account(
    account: AccountRow,
    bots: &[BotSummaryRow],
    features: &[FeatureRow],
    popup_messages: &[PopupMessageRow],
) -> AccountPayload {
    let (deleted, live): (Vec<_>, Vec<_>) = bots
        .iter()
        .filter(|b| b.account_id == account.id)
        .partition(|b| b.is_deleted);

    let features = features
        .iter()
        .filter(|f| f.account_id == account.id)
        .map(|f| {
            (
                f.key.clone(),
                Feature {
                    id: f.feature_id,
                    config: f.config.clone(),
                },
            )
        })
        .collect();

    let popup_messages = popup_messages
        .iter()
        .filter(|p| p.account_id == account.id)
        .map(|p| PopupMessage {
            id: p.id,
            url_regex: p.url_regex.clone(),
            message: p.message.clone(),
        })
        .collect();

    // Unparseable site urls are kept as the raw text.
    let site_url = account.site_url.as_deref().filter(|s| !s.is_empty()).map(|s| {
        serde_json::from_str(s).unwrap_or_else(|_| Value::String(s.to_string()))
    });

    AccountPayload {
        account_id: account.id,
        account_name: account.name,
        account_key: account.account_key,
        owner_id: account.owner_id,
        timezone: account.timezone,
        operating_hours: account
            .operating_hours
            .filter(|v| !v.is_null())
            .map(|v| v.to_string()),
        is_domain_restricted: u8::from(account.is_domain_restricted),
        registered_domains: account.registered_domains.filter(|d| !d.is_empty()),
        site_url,
        bots: live.iter().map(|b| b.id.to_string()).collect(),
        deleted_bots: deleted.iter().map(|b| b.id.to_string()).collect(),
        subscription: Subscription {
            id: account.subscription_id,
            activation_source: account.activation_source,
            plan: Plan {
                id: account.plan_id,
                name: account.plan_name,
            },
            features,
        },
        popup_messages,
    }
}

// ============================================================================
// GETTERS
// ============================================================================

/// One account with its bots, features and popup messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountDetails;

#[async_trait]
impl Getter for AccountDetails {
    type Args = EntityId;
    type Raw = AccountRows;
    type Payload = AccountPayload;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        account_id: &EntityId,
    ) -> ChatdeskResult<Option<AccountRows>> {
        let ids = [*account_id];
        let Some(account) = store.accounts(&ids).await?.into_iter().next() else {
            tracing::debug!(account_id, "No account in store");
            return Ok(None);
        };
        Ok(Some(AccountRows {
            account,
            bots: store.account_bots(&ids, &[]).await?,
            features: store.account_features(&ids).await?,
            popup_messages: store.account_popup_messages(&ids).await?,
        }))
    }

    fn prepare_payload(
        &self,
        raw: Option<AccountRows>,
        _search: SearchResult,
        account_id: &EntityId,
    ) -> AccountPayload {
        match raw {
            Some(rows) => compose_account(rows.account, &rows.bots, &rows.features, &rows.popup_messages),
            None => compose_account(empty_account(*account_id), &[], &[], &[]),
        }
    }
}

fn empty_account(id: EntityId) -> AccountRow {
    AccountRow {
        id,
        name: String::new(),
        account_key: String::new(),
        owner_id: None,
        timezone: None,
        operating_hours: None,
        registered_domains: None,
        site_url: None,
        is_domain_restricted: false,
        subscription_id: None,
        activation_source: None,
        plan_id: None,
        plan_name: None,
    }
}

/// Several accounts in one store round trip.
#[derive(Debug, Clone, Copy, Default)]
pub struct MultipleAccountDetails;

#[async_trait]
impl BatchGetter for MultipleAccountDetails {
    type Id = EntityId;
    type Payload = AccountPayload;

    fn key_for(&self, account_id: &EntityId) -> CacheKey {
        KeyTemplate::AccountData.key(account_id)
    }

    async fn get_many_from_store(
        &self,
        store: &dyn RelationalStore,
        account_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<(EntityId, AccountPayload)>> {
        let accounts = store.accounts(account_ids).await?;
        let bots = store.account_bots(account_ids, &[]).await?;
        let features = store.account_features(account_ids).await?;
        let popup_messages = store.account_popup_messages(account_ids).await?;
        Ok(accounts
            .into_iter()
            .map(|account| {
                let id = account.id;
                (id, compose_account(account, &bots, &features, &popup_messages))
            })
            .collect())
    }
}

/// Outbound messages left in the current billing period, as text.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboundRemainingBalance;

#[async_trait]
impl Getter for OutboundRemainingBalance {
    type Args = EntityId;
    type Raw = OutboundBalanceRow;
    type Payload = String;

    const ENCODING: CacheEncoding = CacheEncoding::Scalar;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        account_id: &EntityId,
    ) -> ChatdeskResult<Option<OutboundBalanceRow>> {
        let balance = store.outbound_balance(*account_id).await?;
        if balance.is_none() {
            tracing::debug!(account_id, "No outbound balance in store");
        }
        Ok(balance)
    }

    async fn get_from_search_index(
        &self,
        index: &dyn SearchIndex,
        account_id: &EntityId,
        balance: Option<&OutboundBalanceRow>,
    ) -> ChatdeskResult<SearchResult> {
        let Some(balance) = balance else {
            return Ok(SearchResult::empty());
        };
        let used = index
            .used_outbound_messages(*account_id, balance.start_at, balance.end_at)
            .await?;
        Ok(SearchResult::empty().with(USED_OUTBOUND_MESSAGES, json!(used)))
    }

    fn prepare_payload(
        &self,
        raw: Option<OutboundBalanceRow>,
        search: SearchResult,
        _account_id: &EntityId,
    ) -> String {
        let max = raw
            .as_ref()
            .and_then(|b| b.config.as_ref())
            .and_then(|c| c.get(MAX_OUTBOUND_MESSAGES))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let used = search
            .get(USED_OUTBOUND_MESSAGES)
            .and_then(Value::as_i64)
            .unwrap_or(0);
        (max - used).to_string()
    }
}

/// Account id behind a public account key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountIdFromKey;

#[async_trait]
impl Getter for AccountIdFromKey {
    type Args = String;
    type Raw = EntityId;
    type Payload = EntityId;

    const ENCODING: CacheEncoding = CacheEncoding::Scalar;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        account_key: &String,
    ) -> ChatdeskResult<Option<EntityId>> {
        store.account_id_by_key(account_key).await
    }

    fn prepare_payload(&self, raw: Option<EntityId>, _search: SearchResult, _key: &String) -> EntityId {
        raw.unwrap_or_default()
    }
}

// ============================================================================
// MANAGER
// ============================================================================

#[derive(Debug, Clone)]
pub struct AccountManager {
    orchestrator: SyncOrchestrator,
}

impl AccountManager {
    pub fn new(orchestrator: SyncOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub async fn get_account_details(
        &self,
        account_id: EntityId,
    ) -> ChatdeskResult<Option<AccountPayload>> {
        let key = KeyTemplate::AccountData.key(account_id);
        self.orchestrator
            .read_through(&key, &AccountDetails, &account_id, SyncOptions::default())
            .await
    }

    /// Accounts keyed by stringified id. Unknown ids are left out.
    pub async fn get_multiple_account_details(
        &self,
        account_ids: &[EntityId],
    ) -> ChatdeskResult<BTreeMap<String, AccountPayload>> {
        self.orchestrator
            .read_through_many(&MultipleAccountDetails, account_ids)
            .await
    }

    pub async fn get_outbound_messages_remaining_balance(
        &self,
        account_id: EntityId,
    ) -> ChatdeskResult<Option<String>> {
        let key = KeyTemplate::OutboundRemainingBalance.key(account_id);
        self.orchestrator
            .read_through(&key, &OutboundRemainingBalance, &account_id, SyncOptions::default())
            .await
    }

    pub async fn get_account_id_from_key(
        &self,
        account_key: &str,
    ) -> ChatdeskResult<Option<EntityId>> {
        let key = KeyTemplate::AccountKeyIdMapping.key(account_key);
        self.orchestrator
            .read_through(&key, &AccountIdFromKey, &account_key.to_string(), SyncOptions::default())
            .await
    }

    /// Live bot ids of an account, read straight from the store. An empty
    /// `bot_type_ids` selects every type.
    pub async fn get_account_bots(
        &self,
        account_id: EntityId,
        bot_type_ids: &[EntityId],
    ) -> ChatdeskResult<Vec<EntityId>> {
        let bots = self
            .orchestrator
            .handles()
            .store()
            .account_bots(&[account_id], bot_type_ids)
            .await?;
        Ok(bots.into_iter().filter(|b| !b.is_deleted).map(|b| b.id).collect())
    }

    /// Live bot ids per account. Every requested account is present, with an
    /// empty list when it has no bots.
    pub async fn get_multiple_account_bots(
        &self,
        account_ids: &[EntityId],
        bot_type_ids: &[EntityId],
    ) -> ChatdeskResult<BTreeMap<String, Vec<String>>> {
        let bots = self
            .orchestrator
            .handles()
            .store()
            .account_bots(account_ids, bot_type_ids)
            .await?;
        let mut mapping: BTreeMap<String, Vec<String>> = account_ids
            .iter()
            .map(|id| (id.to_string(), Vec::new()))
            .collect();
        for bot in bots.into_iter().filter(|b| !b.is_deleted) {
            mapping
                .entry(bot.account_id.to_string())
                .or_default()
                .push(bot.id.to_string());
        }
        Ok(mapping)
    }

    pub async fn get_account_total_visitor_count(&self, account_id: EntityId) -> ChatdeskResult<i64> {
        self.orchestrator
            .handles()
            .store()
            .account_visitor_count(account_id)
            .await
    }
}
