//! Process-local transport backed by in-memory collections.
//!
//! Collections are keyed by request path (`invoices`, `invoices/1/items`).
//! Latency can be injected per path and every call is counted, which makes it
//! the backend for tests and the CLI demo mode.

use crate::core::record::RecordId;
use crate::error::{Error, Result};
use crate::transport::{sub_resource_path, Transport};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct MemoryState {
    collections: HashMap<String, Vec<Value>>,
    delays: HashMap<String, Duration>,
    calls: HashMap<String, usize>,
}

/// In-memory implementation of the transport port
#[derive(Default)]
pub struct InMemoryTransport {
    state: Mutex<MemoryState>,
}

impl InMemoryTransport {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a collection at `path`
    pub fn with_collection(self, path: impl Into<String>, records: Vec<Value>) -> Self {
        self.lock().collections.insert(path.into(), records);
        self
    }

    /// Delay every call touching `path`
    pub fn with_delay(self, path: impl Into<String>, delay: Duration) -> Self {
        self.lock().delays.insert(path.into(), delay);
        self
    }

    /// Number of calls made as `"{METHOD} {path}"`, e.g. `"GET invoices"`
    pub fn calls(&self, key: &str) -> usize {
        self.lock().calls.get(key).copied().unwrap_or(0)
    }

    /// Current contents of a collection
    pub fn collection(&self, path: &str) -> Vec<Value> {
        self.lock().collections.get(path).cloned().unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count the call and return the latency to simulate for it
    fn record_call(&self, method: &str, path: &str) -> Option<Duration> {
        let mut state = self.lock();
        *state.calls.entry(format!("{method} {path}")).or_insert(0) += 1;
        state.delays.get(path).copied()
    }

    async fn enter(&self, method: &str, path: &str) {
        if let Some(delay) = self.record_call(method, path) {
            tokio::time::sleep(delay).await;
        }
    }

    fn read(&self, path: &str) -> Result<Vec<Value>> {
        self.lock()
            .collections
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
}

fn record_id(value: &Value) -> Option<u64> {
    value.get("id").and_then(Value::as_u64)
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn fetch_collection(&self, resource: &str) -> Result<Vec<Value>> {
        self.enter("GET", resource).await;
        self.read(resource)
    }

    async fn fetch_sub_resource(
        &self,
        parent: &str,
        parent_id: RecordId,
        child: &str,
    ) -> Result<Vec<Value>> {
        let path = sub_resource_path(parent, parent_id, child);
        self.enter("GET", &path).await;
        // A parent with no nested records has an empty collection.
        Ok(self.read(&path).unwrap_or_default())
    }

    async fn create_record(&self, resource: &str, payload: Value) -> Result<Value> {
        self.enter("POST", resource).await;
        let Value::Object(mut fields) = payload else {
            return Err(Error::Transport(format!(
                "POST {resource}: payload must be a JSON object"
            )));
        };

        let mut state = self.lock();
        let records = state.collections.entry(resource.to_string()).or_default();
        let next_id = records.iter().filter_map(record_id).max().unwrap_or(0) + 1;
        fields.insert("id".to_string(), Value::from(next_id));
        let created = Value::Object(fields);
        records.push(created.clone());
        Ok(created)
    }

    async fn delete_record(&self, resource: &str, id: RecordId) -> Result<Value> {
        let path = format!("{resource}/{id}");
        self.enter("DELETE", &path).await;

        let mut state = self.lock();
        let records = state
            .collections
            .get_mut(resource)
            .ok_or_else(|| Error::NotFound(resource.to_string()))?;
        let position = records
            .iter()
            .position(|r| record_id(r) == Some(id.get()))
            .ok_or_else(|| Error::NotFound(path.clone()))?;
        Ok(records.remove(position))
    }
}
