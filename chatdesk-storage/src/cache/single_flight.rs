//! Per-key coalescing of concurrent syncs.
//!
//! The first caller for a key runs the fetch; callers arriving while it is in
//! flight wait on the same cell and receive a clone of its result. The entry
//! is dropped once the flight settles, so a later miss starts a fresh fetch.

use std::future::Future;
use std::sync::Arc;

use chatdesk_core::ChatdeskResult;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;

type FlightResult = ChatdeskResult<Option<Value>>;

#[derive(Debug, Default)]
pub struct SingleFlight {
    flights: DashMap<String, Arc<OnceCell<FlightResult>>>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fetch` for `key` unless a flight for it is already running, in
    /// which case wait for that one.
    pub async fn run<F, Fut>(&self, key: &str, fetch: F) -> FlightResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FlightResult>,
    {
        // The map guard must not live across the await below.
        let cell = Arc::clone(
            self.flights
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        let result = cell.get_or_init(fetch).await.clone();
        self.flights
            .remove_if(key, |_, current| Arc::ptr_eq(current, &cell));
        result
    }

    /// Number of keys with a flight in progress.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_core::{CacheError, CacheOperation};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let flights = Arc::new(SingleFlight::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flights
                    .run("bot:1", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(Some(json!({"id": 1})))
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), Some(json!({"id": 1})));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_settled_flight_is_not_reused() {
        let flights = SingleFlight::new();
        let first = flights.run("k", || async { Ok(Some(json!(1))) }).await;
        let second = flights.run("k", || async { Ok(Some(json!(2))) }).await;
        assert_eq!(first.unwrap(), Some(json!(1)));
        assert_eq!(second.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_errors_are_shared_not_cached() {
        let flights = SingleFlight::new();
        let err: ChatdeskResult<Option<Value>> = Err(CacheError::OperationFailed {
            operation: CacheOperation::SetJson,
            key: "k".to_string(),
            reason: "down".to_string(),
        }
        .into());
        assert!(flights.run("k", || async { err }).await.is_err());
        assert_eq!(
            flights.run("k", || async { Ok(None) }).await.unwrap(),
            None
        );
    }
}
