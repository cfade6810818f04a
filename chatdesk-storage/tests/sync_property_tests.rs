//! Property and scenario tests for the read-through sync engine.
//!
//! The engine is driven through small getters defined here against the
//! fixture store, a recording cache spy and the fixture index.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatdesk_core::{
    CacheKey, CacheOperation, ChatdeskResult, EntityId, KeyTemplate, StorageError, SyncConfig,
};
use chatdesk_storage::{
    BatchGetter, CacheEncoding, CacheStore, Getter, RelationalStore, SearchResult, SyncOptions,
    SyncOrchestrator,
};
use chatdesk_test_utils::assertions::{
    assert_cache_error, assert_multi_get_mismatch, assert_operations, assert_storage_error,
};
use chatdesk_test_utils::fixtures::account_row;
use chatdesk_test_utils::{handles, FixtureData, FixtureSearchIndex, FixtureStore, SpyCacheStore};
use futures_util::future::join_all;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::runtime::Runtime;

// ============================================================================
// TEST GETTERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Named {
    id: EntityId,
    name: String,
}

/// Account id and name, nothing else.
struct NamedAccount;

#[async_trait]
impl Getter for NamedAccount {
    type Args = EntityId;
    type Raw = Named;
    type Payload = Named;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        id: &EntityId,
    ) -> ChatdeskResult<Option<Named>> {
        Ok(store
            .accounts(&[*id])
            .await?
            .into_iter()
            .next()
            .map(|a| Named { id: a.id, name: a.name }))
    }

    fn prepare_payload(&self, raw: Option<Named>, _search: SearchResult, id: &EntityId) -> Named {
        raw.unwrap_or(Named {
            id: *id,
            name: String::new(),
        })
    }
}

/// Account name as a plain string.
struct AccountName;

#[async_trait]
impl Getter for AccountName {
    type Args = EntityId;
    type Raw = String;
    type Payload = String;

    const ENCODING: CacheEncoding = CacheEncoding::Scalar;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        id: &EntityId,
    ) -> ChatdeskResult<Option<String>> {
        Ok(store.accounts(&[*id]).await?.into_iter().next().map(|a| a.name))
    }

    fn prepare_payload(&self, raw: Option<String>, _search: SearchResult, _id: &EntityId) -> String {
        raw.unwrap_or_default()
    }
}

/// Visitor count as an integer.
struct VisitorCount;

#[async_trait]
impl Getter for VisitorCount {
    type Args = EntityId;
    type Raw = i64;
    type Payload = i64;

    const ENCODING: CacheEncoding = CacheEncoding::Scalar;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        id: &EntityId,
    ) -> ChatdeskResult<Option<i64>> {
        Ok(Some(store.account_visitor_count(*id).await?))
    }

    fn prepare_payload(&self, raw: Option<i64>, _search: SearchResult, _id: &EntityId) -> i64 {
        raw.unwrap_or_default()
    }
}

/// Account name as a JSON string document.
struct NameDocument;

#[async_trait]
impl Getter for NameDocument {
    type Args = EntityId;
    type Raw = String;
    type Payload = serde_json::Value;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        id: &EntityId,
    ) -> ChatdeskResult<Option<String>> {
        Ok(store.accounts(&[*id]).await?.into_iter().next().map(|a| a.name))
    }

    fn prepare_payload(&self, raw: Option<String>, _search: SearchResult, _id: &EntityId) -> serde_json::Value {
        json!(raw.unwrap_or_default())
    }
}

/// Declared scalar but shaped as a document.
struct MisdeclaredScalar;

#[async_trait]
impl Getter for MisdeclaredScalar {
    type Args = EntityId;
    type Raw = Named;
    type Payload = Named;

    const ENCODING: CacheEncoding = CacheEncoding::Scalar;

    async fn get_from_store(
        &self,
        store: &dyn RelationalStore,
        id: &EntityId,
    ) -> ChatdeskResult<Option<Named>> {
        NamedAccount.get_from_store(store, id).await
    }

    fn prepare_payload(&self, raw: Option<Named>, search: SearchResult, id: &EntityId) -> Named {
        NamedAccount.prepare_payload(raw, search, id)
    }
}

/// Batch of named accounts. The store answer is reversed so results never
/// come back in request order.
struct NamedAccounts;

#[async_trait]
impl BatchGetter for NamedAccounts {
    type Id = EntityId;
    type Payload = Named;

    fn key_for(&self, id: &EntityId) -> CacheKey {
        KeyTemplate::AccountData.key(id)
    }

    async fn get_many_from_store(
        &self,
        store: &dyn RelationalStore,
        ids: &[EntityId],
    ) -> ChatdeskResult<Vec<(EntityId, Named)>> {
        let mut rows: Vec<_> = store
            .accounts(ids)
            .await?
            .into_iter()
            .map(|a| (a.id, Named { id: a.id, name: a.name }))
            .collect();
        rows.reverse();
        Ok(rows)
    }
}

// ============================================================================
// HARNESS
// ============================================================================

struct Harness {
    store: Arc<FixtureStore>,
    cache: Arc<SpyCacheStore>,
    orchestrator: SyncOrchestrator,
}

impl Harness {
    fn new(store: FixtureStore, config: SyncConfig) -> Self {
        let store = Arc::new(store);
        let cache = Arc::new(SpyCacheStore::new());
        let orchestrator = SyncOrchestrator::new(
            handles(store.clone(), cache.clone(), Arc::new(FixtureSearchIndex::new())),
            config,
        );
        Self {
            store,
            cache,
            orchestrator,
        }
    }

    fn with_accounts(ids: &[EntityId]) -> Self {
        Self::new(FixtureStore::new(accounts(ids)), SyncConfig::default())
    }
}

fn accounts(ids: &[EntityId]) -> FixtureData {
    let mut data = FixtureData::default();
    for &id in ids {
        let mut row = account_row(id);
        row.name = format!("Acme {}", id);
        data.accounts.insert(id, row);
    }
    data
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

// ============================================================================
// SINGLE-KEY SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_miss_syncs_exact_value_under_entity_key() {
    let mut data = FixtureData::default();
    let mut row = account_row(42);
    row.name = "Acme".to_string();
    data.accounts.insert(42, row);
    let h = Harness::new(FixtureStore::new(data), SyncConfig::default());

    let key = KeyTemplate::AccountData.key(42);
    let payload = h
        .orchestrator
        .read_through(&key, &NamedAccount, &42, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(
        payload,
        Some(Named {
            id: 42,
            name: "Acme".to_string()
        })
    );
    assert_operations(&h.cache, &[CacheOperation::GetJson, CacheOperation::SetJson]);
    assert_eq!(h.cache.written_keys(), vec!["account:42".to_string()]);
    let stored = h.cache.inner().get_json(&key, ".").await.unwrap();
    assert_eq!(stored, Some(json!({"id": 42, "name": "Acme"})));
}

#[tokio::test]
async fn test_hit_skips_store() {
    let h = Harness::with_accounts(&[42]);
    let key = KeyTemplate::AccountData.key(42);
    h.orchestrator
        .read_through(&key, &NamedAccount, &42, SyncOptions::default())
        .await
        .unwrap();
    h.cache.clear_calls();

    let again = h
        .orchestrator
        .read_through(&key, &NamedAccount, &42, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(again.map(|n| n.name), Some("Acme 42".to_string()));
    assert_eq!(h.store.calls("accounts"), 1);
    assert_operations(&h.cache, &[CacheOperation::GetJson]);
}

#[tokio::test]
async fn test_not_found_writes_nothing() {
    let h = Harness::with_accounts(&[]);
    let key = KeyTemplate::AccountData.key(7);

    let payload = h
        .orchestrator
        .sync(&key, &NamedAccount, &7, SyncOptions::with_ttl(Duration::from_secs(60)))
        .await
        .unwrap();

    assert_eq!(payload, None);
    assert!(h.cache.written_keys().is_empty());
    assert_eq!(h.cache.count(CacheOperation::SetExpiry), 0);
}

#[tokio::test]
async fn test_absent_entity_is_fetched_every_time() {
    let h = Harness::with_accounts(&[]);
    let key = KeyTemplate::AccountData.key(7);
    for _ in 0..3 {
        let payload = h
            .orchestrator
            .read_through(&key, &NamedAccount, &7, SyncOptions::default())
            .await
            .unwrap();
        assert!(payload.is_none());
    }
    assert_eq!(h.store.calls("accounts"), 3);
}

#[tokio::test]
async fn test_read_after_sync_matches_payload() {
    let h = Harness::with_accounts(&[5]);
    let key = KeyTemplate::AccountData.key(5);

    let synced = h
        .orchestrator
        .sync(&key, &NamedAccount, &5, SyncOptions::default())
        .await
        .unwrap();
    let cached = NamedAccount
        .get_from_cache(h.orchestrator.handles().cache(), &key)
        .await
        .unwrap();

    assert!(synced.is_some());
    assert_eq!(synced, cached);
}

#[tokio::test]
async fn test_strings_and_integers_use_scalar_set() {
    let mut data = accounts(&[3]);
    data.visitor_counts.insert(3, 1234);
    let h = Harness::new(FixtureStore::new(data), SyncConfig::default());

    let name_key = KeyTemplate::AccountKeyIdMapping.key(3);
    let name = h
        .orchestrator
        .sync(&name_key, &AccountName, &3, SyncOptions::default())
        .await
        .unwrap();
    let count_key = KeyTemplate::OutboundRemainingBalance.key(3);
    let count = h
        .orchestrator
        .sync(&count_key, &VisitorCount, &3, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(name.as_deref(), Some("Acme 3"));
    assert_eq!(count, Some(1234));
    assert_eq!(h.cache.count(CacheOperation::Set), 2);
    assert_eq!(h.cache.count(CacheOperation::SetJson), 0);

    let cached_name = AccountName
        .get_from_cache(h.orchestrator.handles().cache(), &name_key)
        .await
        .unwrap();
    let cached_count = VisitorCount
        .get_from_cache(h.orchestrator.handles().cache(), &count_key)
        .await
        .unwrap();
    assert_eq!(cached_name, name);
    assert_eq!(cached_count, count);
}

#[tokio::test]
async fn test_json_string_payload_reads_back_after_sync() {
    let h = Harness::with_accounts(&[8]);
    let key = KeyTemplate::BotFlow.key(8);

    let synced = h
        .orchestrator
        .read_through(&key, &NameDocument, &8, SyncOptions::default())
        .await
        .unwrap();
    let cached = h
        .orchestrator
        .read_through(&key, &NameDocument, &8, SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(synced, Some(json!("Acme 8")));
    assert_eq!(cached, synced);
    assert_eq!(h.store.calls("accounts"), 1);
    assert_eq!(h.cache.count(CacheOperation::Set), 0);
    assert_eq!(h.cache.count(CacheOperation::SetJson), 1);
}

#[tokio::test]
async fn test_scalar_getter_rejects_document_payload() {
    let h = Harness::with_accounts(&[4]);
    let key = KeyTemplate::AccountKeyIdMapping.key(4);

    let result = h
        .orchestrator
        .sync(&key, &MisdeclaredScalar, &4, SyncOptions::with_ttl(Duration::from_secs(60)))
        .await;

    assert_cache_error(&result);
    assert!(h.cache.written_keys().is_empty());
}

#[tokio::test]
async fn test_documents_use_json_set() {
    let h = Harness::with_accounts(&[3]);
    h.orchestrator
        .sync(&KeyTemplate::AccountData.key(3), &NamedAccount, &3, SyncOptions::default())
        .await
        .unwrap();
    assert_operations(&h.cache, &[CacheOperation::SetJson]);
}

#[tokio::test]
async fn test_ttl_is_a_second_call_after_the_write() {
    let h = Harness::with_accounts(&[9]);
    h.orchestrator
        .sync(
            &KeyTemplate::AccountData.key(9),
            &NamedAccount,
            &9,
            SyncOptions::with_ttl(Duration::from_secs(604_800)),
        )
        .await
        .unwrap();

    assert_operations(&h.cache, &[CacheOperation::SetJson, CacheOperation::SetExpiry]);
    let calls = h.cache.calls();
    assert_eq!(calls[0].key, calls[1].key);
}

#[tokio::test]
async fn test_store_failure_propagates_without_write() {
    let h = Harness::new(
        FixtureStore::failing(StorageError::QueryFailed {
            query: "accounts".to_string(),
            reason: "connection reset".to_string(),
        }),
        SyncConfig::default(),
    );

    let result = h
        .orchestrator
        .read_through(&KeyTemplate::AccountData.key(1), &NamedAccount, &1, SyncOptions::default())
        .await;

    assert_storage_error(&result);
    assert!(h.cache.written_keys().is_empty());
}

#[tokio::test]
async fn test_cache_write_failure_propagates() {
    let h = Harness::with_accounts(&[1]);
    h.cache.fail_on(CacheOperation::SetJson);

    let result = h
        .orchestrator
        .read_through(&KeyTemplate::AccountData.key(1), &NamedAccount, &1, SyncOptions::default())
        .await;

    assert_cache_error(&result);
}

// ============================================================================
// SINGLE-FLIGHT
// ============================================================================

async fn concurrent_reads(h: &Harness, callers: usize) -> Vec<Option<Named>> {
    let key = KeyTemplate::AccountData.key(11);
    let reads = (0..callers).map(|_| {
        h.orchestrator
            .read_through(&key, &NamedAccount, &11, SyncOptions::default())
    });
    join_all(reads)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect()
}

#[tokio::test]
async fn test_concurrent_misses_share_one_fetch() {
    let h = Harness::new(
        FixtureStore::new(accounts(&[11])).with_delay(Duration::from_millis(50)),
        SyncConfig::default(),
    );

    let results = concurrent_reads(&h, 8).await;

    assert_eq!(h.store.calls("accounts"), 1);
    assert_eq!(h.cache.count(CacheOperation::SetJson), 1);
    assert!(results.iter().all(|r| r.as_ref().map(|n| n.id) == Some(11)));
}

#[tokio::test]
async fn test_disabled_single_flight_fetches_per_caller() {
    let h = Harness::new(
        FixtureStore::new(accounts(&[11])).with_delay(Duration::from_millis(50)),
        SyncConfig {
            single_flight: false,
        },
    );

    let results = concurrent_reads(&h, 4).await;

    assert_eq!(h.store.calls("accounts"), 4);
    assert_eq!(h.cache.count(CacheOperation::SetJson), 4);
    assert_eq!(results.len(), 4);
}

// ============================================================================
// BATCH SCENARIOS
// ============================================================================

#[tokio::test]
async fn test_batch_partitions_hits_and_misses() {
    let h = Harness::with_accounts(&[1, 2, 3]);
    h.cache
        .inner()
        .set_json(&KeyTemplate::AccountData.key(1), ".", &json!({"id": 1, "name": "Cached"}))
        .await
        .unwrap();

    let found = h
        .orchestrator
        .read_through_many(&NamedAccounts, &[1, 2, 3])
        .await
        .unwrap();

    assert_eq!(found.len(), 3);
    assert_eq!(found["1"].name, "Cached");
    assert_eq!(found["2"].name, "Acme 2");
    assert_eq!(found["3"].name, "Acme 3");
    assert_eq!(h.store.calls("accounts"), 1);

    let mut written = h.cache.written_keys();
    written.sort();
    assert_eq!(written, vec!["account:2".to_string(), "account:3".to_string()]);
}

#[tokio::test]
async fn test_batch_full_miss_writes_each_key() {
    let h = Harness::with_accounts(&[1, 2]);

    let found = h
        .orchestrator
        .read_through_many(&NamedAccounts, &[1, 2])
        .await
        .unwrap();

    assert_eq!(found.keys().cloned().collect::<Vec<_>>(), vec!["1", "2"]);
    assert_eq!(h.cache.count(CacheOperation::GetMultiple), 1);
    assert_eq!(h.cache.count(CacheOperation::SetJson), 2);
}

#[tokio::test]
async fn test_batch_keeps_ids_matched_when_store_reorders() {
    let h = Harness::with_accounts(&[4, 5, 6]);

    let found = h
        .orchestrator
        .read_through_many(&NamedAccounts, &[4, 5, 6])
        .await
        .unwrap();

    for id in [4, 5, 6] {
        assert_eq!(found[&id.to_string()].id, id);
        let cached = h
            .cache
            .inner()
            .get_json(&KeyTemplate::AccountData.key(id), ".")
            .await
            .unwrap();
        assert_eq!(cached, Some(json!({"id": id, "name": format!("Acme {}", id)})));
    }
}

#[tokio::test]
async fn test_batch_unknown_ids_are_absent() {
    let h = Harness::with_accounts(&[1]);

    let found = h
        .orchestrator
        .read_through_many(&NamedAccounts, &[1, 77])
        .await
        .unwrap();

    assert!(found.contains_key("1"));
    assert!(!found.contains_key("77"));
    assert_eq!(h.cache.written_keys(), vec!["account:1".to_string()]);
}

#[tokio::test]
async fn test_batch_empty_input_touches_nothing() {
    let h = Harness::with_accounts(&[1]);
    let found = h.orchestrator.read_through_many(&NamedAccounts, &[]).await.unwrap();
    assert!(found.is_empty());
    assert!(h.cache.calls().is_empty());
    assert_eq!(h.store.total_calls(), 0);
}

#[tokio::test]
async fn test_batch_length_mismatch_is_an_error() {
    let h = Harness::with_accounts(&[1, 2]);
    h.cache.shorten_multi_get();

    let result = h.orchestrator.read_through_many(&NamedAccounts, &[1, 2]).await;

    assert_multi_get_mismatch(&result, 2, 1);
    assert_eq!(h.store.total_calls(), 0);
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Shaping the same rows twice yields byte-identical JSON.
    #[test]
    fn prop_payload_is_deterministic(id in 1i64..1_000_000, name in "[A-Za-z ]{0,24}") {
        let raw = Named { id, name };
        let first = NamedAccount.prepare_payload(Some(raw.clone()), SearchResult::empty(), &id);
        let second = NamedAccount.prepare_payload(Some(raw), SearchResult::empty(), &id);
        prop_assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    /// Batch results hold exactly the requested ids the store knows, and
    /// each missing id is written once however often it was requested.
    #[test]
    fn prop_batch_covers_known_ids(
        known in prop::collection::btree_set(1i64..40, 0..8),
        requested in prop::collection::vec(1i64..40, 0..12),
    ) {
        let rt = test_runtime()?;
        let known: Vec<_> = known.into_iter().collect();
        let h = Harness::with_accounts(&known);

        let found = rt
            .block_on(h.orchestrator.read_through_many(&NamedAccounts, &requested))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut expected: Vec<String> = requested
            .iter()
            .filter(|id| known.contains(id))
            .map(|id| id.to_string())
            .collect();
        expected.sort();
        expected.dedup();
        prop_assert_eq!(found.keys().cloned().collect::<Vec<_>>(), expected.clone());
        prop_assert_eq!(h.cache.count(CacheOperation::SetJson), expected.len());
    }
}
