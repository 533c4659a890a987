//! Transport port: one-shot remote calls returning raw JSON records

pub mod http;
pub mod memory;

pub use http::*;
pub use memory::*;

use crate::core::record::RecordId;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Trait for transport implementations.
///
/// Each call is a single request that either resolves with raw records or
/// fails with a transport error. Decoding into typed records happens in the
/// caching stages, not here.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch every record of a collection (`GET {resource}`)
    async fn fetch_collection(&self, resource: &str) -> Result<Vec<Value>>;

    /// Fetch the nested collection of one parent (`GET {parent}/{id}/{child}`)
    async fn fetch_sub_resource(
        &self,
        parent: &str,
        parent_id: RecordId,
        child: &str,
    ) -> Result<Vec<Value>>;

    /// Create a record and return it as stored remotely (`POST {resource}`)
    async fn create_record(&self, resource: &str, payload: Value) -> Result<Value>;

    /// Delete a record and return the removed record (`DELETE {resource}/{id}`)
    async fn delete_record(&self, resource: &str, id: RecordId) -> Result<Value>;
}

/// Path of a nested collection, shared by every adapter
pub fn sub_resource_path(parent: &str, parent_id: RecordId, child: &str) -> String {
    format!("{parent}/{parent_id}/{child}")
}
