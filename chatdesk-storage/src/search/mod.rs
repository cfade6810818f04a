//! Search index access.
//!
//! The index is a read-only supplementary source. Entities without an index
//! dependency receive [`SearchResult::empty`].

mod elasticsearch;

pub use elasticsearch::ElasticsearchIndex;

use async_trait::async_trait;
use chatdesk_core::{ChatdeskResult, EntityId};
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Supplementary JSON fetched from the search index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResult(Map<String, Value>);

impl SearchResult {
    /// The empty sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn with(mut self, field: impl Into<String>, value: Value) -> Self {
        self.0.insert(field.into(), value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }
}

/// A conversation of a visitor as stored in the index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ConversationHit {
    pub conversation_external_key: String,
    pub bot_id: EntityId,
    pub thread_key: Option<String>,
    #[serde(rename = "conversation_title")]
    pub title: Option<String>,
}

impl ConversationHit {
    /// Read a hit from an indexed conversation document.
    ///
    /// `bot_id` may be indexed as a number or a numeric string. Documents
    /// without a conversation key or a usable bot id yield `None`.
    pub fn from_source(source: &Value) -> Option<Self> {
        let conversation_external_key = source.get("conversation_external_key")?.as_str()?.to_string();
        let bot_id = match source.get("bot_id")? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let text = |field: &str| source.get(field).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            conversation_external_key,
            bot_id,
            thread_key: text("thread_key"),
            title: text("conversation_title"),
        })
    }
}

/// Queries served by the search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Outbound messages sent by an account between two dates, inclusive.
    async fn used_outbound_messages(
        &self,
        account_id: EntityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ChatdeskResult<i64>;

    /// Variable document of a visitor, `None` when the visitor is not indexed.
    async fn visitor_variables(&self, visitor_key: &str) -> ChatdeskResult<Option<Value>>;

    /// Active conversations of a visitor, oldest first.
    async fn visitor_conversations(&self, visitor_key: &str)
        -> ChatdeskResult<Vec<ConversationHit>>;
}

/// Index that holds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSearchIndex;

#[async_trait]
impl SearchIndex for NoopSearchIndex {
    async fn used_outbound_messages(
        &self,
        _account_id: EntityId,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> ChatdeskResult<i64> {
        Ok(0)
    }

    async fn visitor_variables(&self, _visitor_key: &str) -> ChatdeskResult<Option<Value>> {
        Ok(None)
    }

    async fn visitor_conversations(
        &self,
        _visitor_key: &str,
    ) -> ChatdeskResult<Vec<ConversationHit>> {
        Ok(Vec::new())
    }
}
