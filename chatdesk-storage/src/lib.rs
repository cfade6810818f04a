//! Chatdesk Storage - Backends and Read-Through Sync
//!
//! Connection handles for the relational store, the JSON cache and the
//! search index, plus the engine that keeps cached entity payloads in step
//! with their sources. Entity-specific getters live in `chatdesk-data`.

pub mod cache;
pub mod handles;
pub mod relational;
pub mod search;

pub use cache::{
    read_cached, BatchGetter, CacheEncoding, CacheStats, CacheStore, Getter, InMemoryCacheStore,
    RedisCacheStore, ScalarValue, SingleFlight, SyncOptions, SyncOrchestrator,
};
pub use handles::{ConnectionHandles, ConnectionHandlesBuilder};
pub use relational::{create_pool, PgRelationalStore, RelationalStore};
pub use search::{ConversationHit, ElasticsearchIndex, NoopSearchIndex, SearchIndex, SearchResult};
