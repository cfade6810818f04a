//! Elasticsearch implementation of the search index over its REST API.

use async_trait::async_trait;
use chatdesk_core::{ChatdeskResult, EntityId, SearchConfig, SearchError};
use chrono::NaiveDate;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ConversationHit, SearchIndex};

const DATE_FORMAT: &str = "%Y-%m-%d";
const MAX_CONVERSATIONS: usize = 100;

#[derive(Deserialize)]
struct CountResponse {
    count: i64,
}

#[derive(Deserialize)]
struct DocResponse {
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source")]
    source: Option<Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_source", default)]
    source: Value,
}

/// Conversations of a search response. Hits that do not decode are logged
/// and left out so one bad document does not fail the whole lookup.
fn conversation_hits(index: &str, response: SearchResponse) -> Vec<ConversationHit> {
    response
        .hits
        .hits
        .into_iter()
        .filter_map(|hit| {
            let parsed = ConversationHit::from_source(&hit.source);
            if parsed.is_none() {
                tracing::warn!(index, source = %hit.source, "Skipping malformed conversation hit");
            }
            parsed
        })
        .collect()
}

/// Body of the count query for outbound messages in a date range.
fn outbound_count_query(account_id: EntityId, start: NaiveDate, end: NaiveDate) -> Value {
    json!({
        "query": {
            "bool": {
                "filter": [
                    {"term": {"account_id": account_id}},
                    {"range": {"created_at": {
                        "gte": start.format(DATE_FORMAT).to_string(),
                        "lte": end.format(DATE_FORMAT).to_string(),
                        "format": "yyyy-MM-dd"
                    }}}
                ]
            }
        }
    })
}

fn active_conversations_query(visitor_key: &str) -> Value {
    json!({
        "query": {
            "bool": {
                "filter": [
                    {"term": {"visitor_key": visitor_key}},
                    {"term": {"is_active": true}}
                ]
            }
        },
        "sort": [{"created_at": "asc"}],
        "size": MAX_CONVERSATIONS
    })
}

/// Search index client for an Elasticsearch cluster.
#[derive(Clone)]
pub struct ElasticsearchIndex {
    client: Client,
    config: SearchConfig,
}

impl ElasticsearchIndex {
    pub fn new(config: SearchConfig) -> ChatdeskResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SearchError::Transport {
                index: config.url.clone(),
                reason: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, config })
    }

    fn url(&self, index: &str, suffix: &str) -> String {
        format!("{}/{}/{}", self.config.url.trim_end_matches('/'), index, suffix)
    }

    /// Document URL with `id` percent-encoded as a single path segment.
    fn doc_url(&self, index: &str, id: &str) -> ChatdeskResult<Url> {
        let invalid = |reason: String| SearchError::Transport {
            index: index.to_string(),
            reason,
        };
        let mut url = Url::parse(&self.url(index, "_doc"))
            .map_err(|e| invalid(format!("Invalid search URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| invalid("Search URL cannot hold a path".to_string()))?
            .push(id);
        Ok(url)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        index: &str,
        suffix: &str,
        body: &Value,
    ) -> ChatdeskResult<T> {
        let response = self
            .client
            .post(self.url(index, suffix))
            .json(body)
            .send()
            .await
            .map_err(|e| SearchError::Transport {
                index: index.to_string(),
                reason: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::RequestFailed {
                index: index.to_string(),
                status: status.as_u16(),
                reason: error_text,
            }
            .into());
        }

        response.json().await.map_err(|e| {
            SearchError::InvalidResponse {
                index: index.to_string(),
                reason: format!("Failed to parse response: {}", e),
            }
            .into()
        })
    }
}

#[async_trait]
impl SearchIndex for ElasticsearchIndex {
    async fn used_outbound_messages(
        &self,
        account_id: EntityId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ChatdeskResult<i64> {
        let index = &self.config.outbound_messages_index;
        let response: CountResponse = self
            .post_json(index, "_count", &outbound_count_query(account_id, start, end))
            .await?;
        Ok(response.count)
    }

    async fn visitor_variables(&self, visitor_key: &str) -> ChatdeskResult<Option<Value>> {
        let index = &self.config.visitor_variables_index;
        let response = self
            .client
            .get(self.doc_url(index, visitor_key)?)
            .send()
            .await
            .map_err(|e| SearchError::Transport {
                index: index.clone(),
                reason: format!("HTTP request failed: {}", e),
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SearchError::RequestFailed {
                index: index.clone(),
                status: status.as_u16(),
                reason: error_text,
            }
            .into());
        }

        let doc: DocResponse = response.json().await.map_err(|e| SearchError::InvalidResponse {
            index: index.clone(),
            reason: format!("Failed to parse document: {}", e),
        })?;
        Ok(doc.found.then_some(doc.source).flatten())
    }

    async fn visitor_conversations(
        &self,
        visitor_key: &str,
    ) -> ChatdeskResult<Vec<ConversationHit>> {
        let index = &self.config.conversations_index;
        let response: SearchResponse = self
            .post_json(index, "_search", &active_conversations_query(visitor_key))
            .await?;
        Ok(conversation_hits(index, response))
    }
}

impl std::fmt::Debug for ElasticsearchIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchIndex")
            .field("url", &self.config.url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_query_formats_dates() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let query = outbound_count_query(7, start, end);
        let range = &query["query"]["bool"]["filter"][1]["range"]["created_at"];
        assert_eq!(range["gte"], "2024-01-01");
        assert_eq!(range["lte"], "2024-01-31");
        assert_eq!(query["query"]["bool"]["filter"][0]["term"]["account_id"], 7);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let index = ElasticsearchIndex::new(SearchConfig {
            url: "http://es:9200/".to_string(),
            ..SearchConfig::default()
        })
        .unwrap();
        assert_eq!(index.url("visitors", "_doc/abc"), "http://es:9200/visitors/_doc/abc");
    }

    #[test]
    fn test_doc_url_encodes_key() {
        let index = ElasticsearchIndex::new(SearchConfig {
            url: "http://es:9200".to_string(),
            ..SearchConfig::default()
        })
        .unwrap();
        assert_eq!(
            index.doc_url("visitors", "v-1").unwrap().as_str(),
            "http://es:9200/visitors/_doc/v-1"
        );
        assert_eq!(
            index.doc_url("visitors", "a/b?c#d").unwrap().as_str(),
            "http://es:9200/visitors/_doc/a%2Fb%3Fc%23d"
        );
    }

    #[test]
    fn test_search_response_decodes_conversations() {
        let body = json!({
            "hits": {"hits": [
                {"_source": {
                    "conversation_external_key": "c-1",
                    "bot_id": 5,
                    "thread_key": "t-1",
                    "conversation_title": "Pricing question"
                }},
                {"_source": {"conversation_external_key": "c-2", "bot_id": 6}}
            ]}
        });
        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        let hits = conversation_hits("conversations", parsed);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title.as_deref(), Some("Pricing question"));
        assert_eq!(hits[1].thread_key, None);
    }

    #[test]
    fn test_hit_without_bot_id_is_skipped() {
        let body = json!({
            "hits": {"hits": [
                {"_source": {"conversation_external_key": "c1", "thread_key": "t"}},
                {"_source": {"conversation_external_key": "c2", "bot_id": "9", "thread_key": "t2"}},
                {}
            ]}
        });
        let parsed: SearchResponse = serde_json::from_value(body).unwrap();
        let hits = conversation_hits("conversations", parsed);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].conversation_external_key, "c2");
        assert_eq!(hits[0].bot_id, 9);
    }
}
