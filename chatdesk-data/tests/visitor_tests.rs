//! Visitor read-through, default names and cache-only lookups.

use std::sync::Arc;
use std::time::Duration;

use chatdesk_core::{CacheOperation, KeyTemplate, SyncConfig, VisitorConfig};
use chatdesk_data::DataAccess;
use chatdesk_test_utils::fixtures::{variable_row, visitor_row};
use chatdesk_test_utils::{
    handles, CacheStore, ConversationHit, FixtureData, FixtureSearchIndex, FixtureStore,
    SpyCacheStore,
};
use serde_json::json;

const ACCOUNT: i64 = 7;

struct Harness {
    store: Arc<FixtureStore>,
    cache: Arc<SpyCacheStore>,
    data: DataAccess,
}

fn harness(search: FixtureSearchIndex) -> Harness {
    let mut fixture = FixtureData::default();
    for (id, key) in [(1, "v-1"), (2, "v-2"), (3, "v-3")] {
        fixture.visitors.insert(key.to_string(), visitor_row(id, key, ACCOUNT));
    }
    fixture.visitor_counts.insert(ACCOUNT, 9999);
    fixture
        .account_variables
        .insert(ACCOUNT, vec![variable_row("age", Some("number")), variable_row("city", None)]);

    let store = Arc::new(FixtureStore::new(fixture));
    let cache = Arc::new(SpyCacheStore::new());
    let data = DataAccess::new(
        handles(store.clone(), cache.clone(), Arc::new(search)),
        SyncConfig::default(),
        VisitorConfig::default(),
    );
    Harness { store, cache, data }
}

fn indexed_search() -> FixtureSearchIndex {
    let mut search = FixtureSearchIndex::new();
    search.visitor_documents.insert(
        "v-1".to_string(),
        json!({
            "account_id": ACCOUNT,
            "variables": [
                {"name": "visitor_age", "value": "31", "value_double": 31.0},
                {"name": "visitor_city", "value": "Lima"},
                {"name": "visitor_id", "value": "1"},
                {"name": "contact_id", "value": "c-1"},
            ]
        }),
    );
    search
}

#[tokio::test]
async fn test_visitor_without_conversations_gets_seeded_default_name() {
    let h = harness(indexed_search());

    let visitor = h
        .data
        .visitor()
        .get_visitor(Some("v-1"), None)
        .await
        .unwrap()
        .expect("visitor exists");

    assert_eq!(visitor.default_name.as_deref(), Some("Visitor B1"));
    assert_eq!(visitor.key.as_deref(), Some("v-1"));
    assert_eq!(visitor.is_new, Some(false));
    assert_eq!(visitor.account_id, Some(ACCOUNT));
    assert_eq!(visitor.external_key.as_deref(), Some("ext-v-1"));
    assert!(visitor.active_conversations.is_empty());

    assert_eq!(visitor.variables.len(), 3);
    assert_eq!(visitor.variables["¿·$user.info.age·?"].value, json!(31.0));
    assert_eq!(visitor.variables["¿·$user.info.city·?"].value, json!("Lima"));
    assert_eq!(visitor.variables["¿·$user.contact_id·?"].value, json!("c-1"));
    assert!(visitor
        .variables
        .values()
        .all(|v| v.variable_type.as_deref() == Some("contact")));

    assert_eq!(h.cache.count(CacheOperation::SetJsonNx), 1);
    assert_eq!(h.cache.count(CacheOperation::Increment), 2);
    assert_eq!(h.store.calls("account_visitor_count"), 1);
}

#[tokio::test]
async fn test_counter_is_seeded_once_per_account() {
    let h = harness(FixtureSearchIndex::new());

    let first = h.data.visitor().get_visitor(Some("v-1"), None).await.unwrap();
    let second = h.data.visitor().get_visitor(Some("v-2"), None).await.unwrap();

    assert_eq!(first.and_then(|v| v.default_name).as_deref(), Some("Visitor B1"));
    assert_eq!(second.and_then(|v| v.default_name).as_deref(), Some("Visitor B2"));
    assert_eq!(h.cache.count(CacheOperation::SetJsonNx), 1);
    assert_eq!(h.store.calls("account_visitor_count"), 1);
}

#[tokio::test]
async fn test_conversation_title_becomes_default_name() {
    let mut search = FixtureSearchIndex::new();
    search.conversations.insert(
        "v-3".to_string(),
        vec![
            ConversationHit {
                conversation_external_key: "conv-a".to_string(),
                bot_id: 5,
                thread_key: Some("t-1".to_string()),
                title: Some("Older".to_string()),
            },
            ConversationHit {
                conversation_external_key: "conv-b".to_string(),
                bot_id: 6,
                thread_key: None,
                title: Some("Order #88".to_string()),
            },
        ],
    );
    let h = harness(search);

    let visitor = h
        .data
        .visitor()
        .get_visitor(Some("v-3"), None)
        .await
        .unwrap()
        .expect("visitor exists");

    assert_eq!(visitor.default_name.as_deref(), Some("Order #88"));
    assert_eq!(visitor.active_conversations["conv-a:5"].as_deref(), Some("t-1"));
    assert_eq!(visitor.active_conversations["conv-b:6"], None);
    assert_eq!(h.cache.count(CacheOperation::Increment), 0);
}

#[tokio::test]
async fn test_visitor_is_cached_with_expiry() {
    let h = harness(indexed_search());
    h.data.visitor().get_visitor(Some("v-1"), None).await.unwrap();

    let key = KeyTemplate::Visitor.key("v-1");
    let expiries: Vec<_> = h
        .cache
        .calls()
        .into_iter()
        .filter(|c| c.operation == CacheOperation::SetExpiry)
        .map(|c| c.key)
        .collect();
    assert_eq!(expiries, vec![key.to_string()]);

    // The cached document carries no per-read annotations.
    let stored = h.cache.inner().get_json(&key, ".").await.unwrap().unwrap();
    assert!(stored.get("key").is_none());
    assert!(stored["variables"]["¿·$user.info.city·?"].get("type").is_none());
}

#[tokio::test]
async fn test_external_key_resolves_through_scalar_mapping() {
    let h = harness(indexed_search());

    let visitor = h
        .data
        .visitor()
        .get_visitor(None, Some("ext-v-1"))
        .await
        .unwrap();

    assert_eq!(visitor.and_then(|v| v.key).as_deref(), Some("v-1"));
    let mapping = KeyTemplate::VisitorExternalKey.key("ext-v-1");
    assert_eq!(h.cache.inner().get(&mapping).await.unwrap().as_deref(), Some("v-1"));
    assert_eq!(
        h.data.visitor().redis_get_visitor_key("ext-v-1").await.unwrap().as_deref(),
        Some("v-1")
    );
}

#[tokio::test]
async fn test_unknown_visitor_is_none_without_writes() {
    let h = harness(FixtureSearchIndex::new());

    let by_key = h.data.visitor().get_visitor(Some("nobody"), None).await.unwrap();
    let by_external = h.data.visitor().get_visitor(None, Some("ext-nobody")).await.unwrap();
    let neither = h.data.visitor().get_visitor(None, None).await.unwrap();

    assert!(by_key.is_none());
    assert!(by_external.is_none());
    assert!(neither.is_none());
    assert!(h.cache.written_keys().is_empty());
}

#[tokio::test]
async fn test_cache_only_reads_never_sync() {
    let h = harness(indexed_search());

    assert!(h.data.visitor().redis_get_visitor("v-1").await.unwrap().is_none());
    assert!(h.data.visitor().redis_get_visitor_key("ext-v-1").await.unwrap().is_none());
    assert_eq!(h.store.total_calls(), 0);

    h.data.visitor().get_visitor(Some("v-1"), None).await.unwrap();
    let cached = h.data.visitor().redis_get_visitor("v-1").await.unwrap().expect("cached");
    assert_eq!(cached.key.as_deref(), Some("v-1"));
    assert_eq!(cached.is_new, Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_cached_visitor_expires() {
    let h = harness(indexed_search());
    h.data.visitor().get_visitor(Some("v-1"), None).await.unwrap();

    tokio::time::advance(VisitorConfig::default().key_ttl + Duration::from_secs(1)).await;

    assert!(h.data.visitor().redis_get_visitor("v-1").await.unwrap().is_none());
}
