//! Fetch-once cache for a remote collection.
//!
//! The first `request()` starts a single fetch through the transport. Callers
//! arriving while it is in flight join that same fetch; callers arriving
//! after it succeeded are served the cached snapshot. A failed fetch hands the
//! error to everyone who joined it and leaves the cache empty, so the next
//! request fetches again.

use crate::core::record::{decode_all, Snapshot};
use crate::error::{Error, Result};
use crate::stream::{Replay, Subscription};
use crate::transport::Transport;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Snapshot<T>>>>;

enum Slot<T> {
    Empty,
    InFlight { generation: u64, fetch: SharedFetch<T> },
    Ready(Snapshot<T>),
}

struct State<T> {
    slot: Slot<T>,
    generation: u64,
}

/// Caches one remote collection for the process lifetime
pub struct FetchOnce<T> {
    transport: Arc<dyn Transport>,
    resource: String,
    state: Mutex<State<T>>,
    result: Replay<Snapshot<T>>,
}

impl<T> FetchOnce<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    /// Create an empty cache for `resource`
    pub fn new(transport: Arc<dyn Transport>, resource: impl Into<String>) -> Self {
        Self {
            transport,
            resource: resource.into(),
            state: Mutex::new(State {
                slot: Slot::Empty,
                generation: 0,
            }),
            result: Replay::new(),
        }
    }

    /// Name of the cached resource
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Get the collection, fetching it only if nothing is cached or in flight
    pub async fn request(&self) -> Result<Snapshot<T>> {
        let (generation, fetch) = {
            let mut state = self.lock();
            match &state.slot {
                Slot::Ready(value) => return Ok(value.clone()),
                Slot::InFlight { generation, fetch } => {
                    debug!(resource = %self.resource, "joining in-flight fetch");
                    (*generation, fetch.clone())
                }
                Slot::Empty => {
                    state.generation += 1;
                    let generation = state.generation;
                    let fetch = self.start_fetch();
                    state.slot = Slot::InFlight {
                        generation,
                        fetch: fetch.clone(),
                    };
                    (generation, fetch)
                }
            }
        };

        let outcome = fetch.await;

        let mut state = self.lock();
        let current = matches!(
            &state.slot,
            Slot::InFlight { generation: g, .. } if *g == generation
        );
        if current {
            match &outcome {
                Ok(value) => {
                    info!(resource = %self.resource, records = value.len(), "collection cached");
                    state.slot = Slot::Ready(value.clone());
                    self.result.publish(value.clone());
                }
                Err(e) => {
                    warn!(resource = %self.resource, error = %e, "fetch failed, cache left empty");
                    state.slot = Slot::Empty;
                }
            }
        }
        outcome
    }

    /// Replace the cached value, e.g. after a local edit.
    ///
    /// A fetch still in flight no longer updates the cache once replaced.
    pub fn replace(&self, value: Vec<T>) -> Snapshot<T> {
        let value = Arc::new(value);
        let mut state = self.lock();
        state.slot = Slot::Ready(value.clone());
        self.result.publish(value.clone());
        value
    }

    /// Derive a new cached value from the current one under the cache lock.
    ///
    /// Returns `None`, changing nothing, when no value is cached yet.
    pub fn update(&self, f: impl FnOnce(&[T]) -> Vec<T>) -> Option<Snapshot<T>> {
        let mut state = self.lock();
        let Slot::Ready(current) = &state.slot else {
            return None;
        };
        let value = Arc::new(f(current.as_slice()));
        state.slot = Slot::Ready(value.clone());
        self.result.publish(value.clone());
        Some(value)
    }

    /// Cached value, if a fetch has completed
    pub fn cached(&self) -> Option<Snapshot<T>> {
        match &self.lock().slot {
            Slot::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Subscribe to the cached collection; replays the latest value
    pub fn subscribe(&self) -> Subscription<Snapshot<T>> {
        self.result.subscribe()
    }

    fn start_fetch(&self) -> SharedFetch<T> {
        let transport = self.transport.clone();
        let resource = self.resource.clone();
        debug!(%resource, "fetching collection");
        async move {
            let raw = transport.fetch_collection(&resource).await?;
            let records = decode_all::<T>(raw)?;
            Ok::<_, Error>(Arc::new(records))
        }
        .boxed()
        .shared()
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::Invoice;
    use crate::transport::{InMemoryTransport, MockTransport};
    use futures::future::join_all;
    use serde_json::json;
    use std::time::Duration;

    fn invoices_backend() -> Arc<InMemoryTransport> {
        Arc::new(
            InMemoryTransport::new()
                .with_collection(
                    "invoices",
                    vec![
                        json!({"id": 1, "customer_id": 9}),
                        json!({"id": 2, "customer_id": 10}),
                    ],
                )
                .with_delay("invoices", Duration::from_millis(20)),
        )
    }

    #[tokio::test]
    async fn test_concurrent_requests_fetch_once() {
        let backend = invoices_backend();
        let cache: FetchOnce<Invoice> = FetchOnce::new(backend.clone(), "invoices");

        let results = join_all((0..8).map(|_| cache.request())).await;

        assert_eq!(backend.calls("GET invoices"), 1);
        for result in results {
            assert_eq!(result.unwrap().len(), 2);
        }
    }

    #[tokio::test]
    async fn test_sequential_requests_served_from_cache() {
        let backend = invoices_backend();
        let cache: FetchOnce<Invoice> = FetchOnce::new(backend.clone(), "invoices");

        let first = cache.request().await.unwrap();
        let second = cache.request().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(backend.calls("GET invoices"), 1);
    }

    #[tokio::test]
    async fn test_late_subscriber_receives_cached_collection() {
        let cache: FetchOnce<Invoice> = FetchOnce::new(invoices_backend(), "invoices");
        cache.request().await.unwrap();

        let mut sub = cache.subscribe();
        let replayed = sub.next().await.unwrap();
        assert_eq!(replayed[0].id.get(), 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_cache_empty_and_retries() {
        let mut mock = MockTransport::new();
        let mut attempts = 0;
        mock.expect_fetch_collection()
            .times(2)
            .returning(move |_| {
                attempts += 1;
                if attempts == 1 {
                    Err(Error::Transport("connection reset".to_string()))
                } else {
                    Ok(vec![json!({"id": 1, "customer_id": 9})])
                }
            });
        let cache: FetchOnce<Invoice> = FetchOnce::new(Arc::new(mock), "invoices");

        let err = cache.request().await.unwrap_err();
        assert_eq!(err, Error::Transport("connection reset".to_string()));
        assert!(cache.cached().is_none());

        let value = cache.request().await.unwrap();
        assert_eq!(value.len(), 1);
        assert!(cache.cached().is_some());
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiting_demander() {
        let backend = Arc::new(
            InMemoryTransport::new().with_delay("invoices", Duration::from_millis(20)),
        );
        let cache: FetchOnce<Invoice> = FetchOnce::new(backend.clone(), "invoices");

        let results = join_all((0..3).map(|_| cache.request())).await;

        assert_eq!(backend.calls("GET invoices"), 1);
        assert!(results.iter().all(|r| matches!(r, Err(Error::NotFound(_)))));
    }

    #[tokio::test]
    async fn test_update_requires_cached_value() {
        let cache: FetchOnce<Invoice> = FetchOnce::new(invoices_backend(), "invoices");
        assert!(cache.update(|current| current.to_vec()).is_none());

        cache.request().await.unwrap();
        let mut sub = cache.subscribe();
        let updated = cache
            .update(|current| current.iter().filter(|i| i.id.get() != 1).cloned().collect())
            .unwrap();

        assert_eq!(updated.len(), 1);
        assert!(Arc::ptr_eq(&sub.next().await.unwrap(), &updated));
    }

    #[tokio::test]
    async fn test_replace_wins_over_in_flight_fetch() {
        let backend = invoices_backend();
        let cache: Arc<FetchOnce<Invoice>> = Arc::new(FetchOnce::new(backend, "invoices"));

        let pending = tokio::spawn({
            let cache = cache.clone();
            async move { cache.request().await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.replace(vec![Invoice::new(7, 9)]);

        assert_eq!(pending.await.unwrap().unwrap().len(), 2);
        assert_eq!(cache.cached().unwrap()[0].id.get(), 7);
    }
}
