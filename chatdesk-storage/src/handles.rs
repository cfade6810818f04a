//! Shared connection handles.
//!
//! One `ConnectionHandles` value is built at startup and passed by clone;
//! every clone shares the same underlying store, cache and index clients.

use std::sync::Arc;

use chatdesk_core::{ChatdeskConfig, ChatdeskResult, ConfigError};
use tracing::Span;

use crate::cache::{CacheStore, RedisCacheStore};
use crate::relational::{PgRelationalStore, RelationalStore};
use crate::search::{ElasticsearchIndex, NoopSearchIndex, SearchIndex};

/// Relational store, cache and search index clients plus the logging span
/// data access runs under.
#[derive(Clone)]
pub struct ConnectionHandles {
    store: Arc<dyn RelationalStore>,
    cache: Arc<dyn CacheStore>,
    search: Arc<dyn SearchIndex>,
    span: Span,
}

impl ConnectionHandles {
    pub fn builder() -> ConnectionHandlesBuilder {
        ConnectionHandlesBuilder::default()
    }

    /// Connect every backend named by the configuration.
    pub async fn connect(config: &ChatdeskConfig) -> ChatdeskResult<Self> {
        let store = PgRelationalStore::from_config(&config.db)?;
        let cache = RedisCacheStore::connect(&config.cache).await?;
        let search = ElasticsearchIndex::new(config.search.clone())?;
        Ok(Self {
            store: Arc::new(store),
            cache: Arc::new(cache),
            search: Arc::new(search),
            span: tracing::info_span!("chatdesk_data"),
        })
    }

    pub fn store(&self) -> &dyn RelationalStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &dyn CacheStore {
        self.cache.as_ref()
    }

    pub fn search(&self) -> &dyn SearchIndex {
        self.search.as_ref()
    }

    /// Span data access futures are instrumented with. `Span::none()` when
    /// no logging context was supplied.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl std::fmt::Debug for ConnectionHandles {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandles")
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionHandles`].
#[derive(Default)]
pub struct ConnectionHandlesBuilder {
    store: Option<Arc<dyn RelationalStore>>,
    cache: Option<Arc<dyn CacheStore>>,
    search: Option<Arc<dyn SearchIndex>>,
    span: Option<Span>,
}

impl ConnectionHandlesBuilder {
    pub fn store(mut self, store: Arc<dyn RelationalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn search(mut self, search: Arc<dyn SearchIndex>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// The store and cache are required; the index defaults to one that
    /// holds nothing.
    pub fn build(self) -> Result<ConnectionHandles, ConfigError> {
        Ok(ConnectionHandles {
            store: self.store.ok_or_else(|| ConfigError::MissingRequired {
                field: "store".to_string(),
            })?,
            cache: self.cache.ok_or_else(|| ConfigError::MissingRequired {
                field: "cache".to_string(),
            })?,
            search: self.search.unwrap_or_else(|| Arc::new(NoopSearchIndex)),
            span: self.span.unwrap_or_else(Span::none),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCacheStore;

    #[test]
    fn test_builder_requires_store() {
        let err = ConnectionHandles::builder()
            .cache(Arc::new(InMemoryCacheStore::new()))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingRequired {
                field: "store".to_string()
            }
        );
    }
}
