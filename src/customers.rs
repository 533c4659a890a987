//! Related-collection port and the customer provider behind it

use crate::core::record::{Customer, Snapshot};
use crate::error::{Error, Result};
use crate::storage::FetchOnce;
use crate::stream::Subscription;
use crate::transport::Transport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Source of the customer collection joined into the view.
///
/// The returned subscription replays the current collection and then yields
/// every replacement.
#[async_trait]
pub trait CustomerSource: Send + Sync {
    async fn customers(&self) -> Result<Subscription<Snapshot<Customer>>>;
}

/// Loads customers once and re-broadcasts local edits
pub struct CustomersService {
    cache: FetchOnce<Customer>,
}

impl CustomersService {
    pub fn new(transport: Arc<dyn Transport>, resource: impl Into<String>) -> Self {
        Self {
            cache: FetchOnce::new(transport, resource),
        }
    }

    /// Current customer collection, loading it on first use
    pub async fn list(&self) -> Result<Snapshot<Customer>> {
        self.cache.request().await
    }

    /// Insert or replace one customer and broadcast the new collection
    pub async fn upsert(&self, customer: Customer) -> Result<Snapshot<Customer>> {
        self.cache.request().await?;
        let updated = self
            .cache
            .update(|current| {
                let mut next = current.to_vec();
                match next.iter_mut().find(|c| c.id == customer.id) {
                    Some(existing) => *existing = customer,
                    None => next.push(customer),
                }
                next
            })
            .ok_or_else(|| Error::NotFound(self.cache.resource().to_string()))?;
        debug!(customers = updated.len(), "customer collection updated");
        Ok(updated)
    }
}

#[async_trait]
impl CustomerSource for CustomersService {
    async fn customers(&self) -> Result<Subscription<Snapshot<Customer>>> {
        let subscription = self.cache.subscribe();
        self.cache.request().await?;
        Ok(subscription)
    }
}
