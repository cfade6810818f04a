//! Cache layer and the read-through sync engine.
//!
//! # Layout
//!
//! - [`CacheStore`] is the typed command surface of the cache, implemented
//!   for Redis with the RedisJSON module and in memory.
//! - [`Getter`] and [`BatchGetter`] describe how one entity type is loaded
//!   and shaped.
//! - [`SyncOrchestrator`] runs getters: cache lookup, store fetch, index
//!   enrichment, payload shaping and the cache write.
//!
//! Payloads absent from both the store and the index are never written, so
//! a later read sees a plain miss again.

pub mod getter;
pub mod memory;
pub mod redis_backend;
pub mod single_flight;
pub mod store;
pub mod sync;

pub use getter::{read_cached, BatchGetter, CacheEncoding, Getter};
pub use memory::InMemoryCacheStore;
pub use redis_backend::RedisCacheStore;
pub use single_flight::SingleFlight;
pub use store::{CacheStats, CacheStore, ScalarValue};
pub use sync::{SyncOptions, SyncOrchestrator};
