//! Key-switched loader for a per-parent nested collection.
//!
//! Keys are compared with the previous key only: repeating it is coalesced
//! and issues no fetch. A different key abandons whatever fetch is in flight,
//! so the published value always belongs to the latest requested key.
//! Successful results are kept per key, so returning to an earlier key is
//! served without fetching.

use crate::core::record::{decode_all, RecordId, Snapshot};
use crate::error::{Error, Result};
use crate::stream::{Replay, Subscription};
use crate::transport::Transport;
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Value observed by sub-resource subscribers
pub type Loaded<T> = Result<Snapshot<T>>;

struct KeyState {
    last_key: Option<RecordId>,
    keys: Option<mpsc::UnboundedSender<RecordId>>,
}

struct LoaderInner<T> {
    transport: Arc<dyn Transport>,
    parent: String,
    child: String,
    output: Replay<Loaded<T>>,
    state: Mutex<KeyState>,
}

/// Loads `{parent}/{id}/{child}` for the most recently requested id
pub struct SubResourceLoader<T> {
    inner: Arc<LoaderInner<T>>,
}

impl<T> SubResourceLoader<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        transport: Arc<dyn Transport>,
        parent: impl Into<String>,
        child: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(LoaderInner {
                transport,
                parent: parent.into(),
                child: child.into(),
                output: Replay::new(),
                state: Mutex::new(KeyState {
                    last_key: None,
                    keys: None,
                }),
            }),
        }
    }

    /// Request the nested collection of `key` and subscribe to the output.
    ///
    /// The background driver is spawned on the current Tokio runtime on first
    /// use.
    pub fn request(&self, key: RecordId) -> Result<Subscription<Loaded<T>>> {
        let mut state = self.inner.lock();
        if state.last_key == Some(key) {
            debug!(%key, "same key requested again, coalesced");
            return Ok(self.inner.output.subscribe());
        }

        let keys = match &state.keys {
            Some(keys) if !keys.is_closed() => keys.clone(),
            _ => {
                let handle = Handle::try_current().map_err(|e| Error::Runtime(e.to_string()))?;
                let (tx, rx) = mpsc::unbounded_channel();
                handle.spawn(drive(self.inner.clone(), rx));
                state.keys = Some(tx.clone());
                tx
            }
        };

        state.last_key = Some(key);
        self.inner.output.clear();
        let subscription = self.inner.output.subscribe();
        keys.send(key)
            .map_err(|_| Error::Closed("sub-resource driver stopped".to_string()))?;
        Ok(subscription)
    }

    /// Subscribe without requesting; replays the latest delivered result
    pub fn subscribe(&self) -> Subscription<Loaded<T>> {
        self.inner.output.subscribe()
    }

    /// The key whose result is, or will be, published
    pub fn current_key(&self) -> Option<RecordId> {
        self.inner.lock().last_key
    }
}

impl<T> LoaderInner<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn lock(&self) -> MutexGuard<'_, KeyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fetch(&self, key: RecordId) -> BoxFuture<'static, Loaded<T>> {
        let transport = self.transport.clone();
        let parent = self.parent.clone();
        let child = self.child.clone();
        async move {
            let raw = transport.fetch_sub_resource(&parent, key, &child).await?;
            Ok(Arc::new(decode_all::<T>(raw)?))
        }
        .boxed()
    }

    /// Publish `value` only if `key` is still the latest requested key.
    ///
    /// Runs under the key lock so it cannot interleave with `request`, which
    /// switches the key and clears the output under the same lock. A failed
    /// key is forgotten so requesting it again retries.
    fn publish_current(&self, key: RecordId, value: Loaded<T>) -> bool {
        let mut state = self.lock();
        if state.last_key != Some(key) {
            return false;
        }
        if value.is_err() {
            state.last_key = None;
        }
        self.output.publish(value);
        true
    }
}

async fn drive<T>(inner: Arc<LoaderInner<T>>, mut keys: mpsc::UnboundedReceiver<RecordId>)
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let mut loaded: HashMap<RecordId, Snapshot<T>> = HashMap::new();
    let mut in_flight: Option<(RecordId, BoxFuture<'static, Loaded<T>>)> = None;

    loop {
        tokio::select! {
            // A queued key supersedes a fetch that finished in the meantime.
            biased;
            key = keys.recv() => {
                let Some(key) = key else { break };
                if let Some((stale, _)) = in_flight.take() {
                    debug!(%stale, %key, "superseded fetch abandoned");
                }
                if let Some(hit) = loaded.get(&key) {
                    debug!(%key, "serving cached sub-resource");
                    inner.publish_current(key, Ok(hit.clone()));
                    continue;
                }
                debug!(%key, parent = %inner.parent, child = %inner.child, "fetching sub-resource");
                in_flight = Some((key, inner.fetch(key)));
            }
            outcome = async {
                match in_flight.as_mut() {
                    Some((_, fetch)) => fetch.await,
                    None => futures::future::pending().await,
                }
            }, if in_flight.is_some() => {
                let Some((key, _)) = in_flight.take() else { continue };
                match outcome {
                    Ok(records) => {
                        loaded.insert(key, records.clone());
                        if !inner.publish_current(key, Ok(records)) {
                            debug!(%key, "result for superseded key discarded");
                        }
                    }
                    Err(e) => {
                        warn!(%key, error = %e, "sub-resource fetch failed");
                        inner.publish_current(key, Err(e));
                    }
                }
            }
        }
    }
}
