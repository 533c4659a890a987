//! Invoice store: the surface presentation code talks to

use crate::config::StoreConfig;
use crate::core::command::CommandBus;
use crate::core::record::{decode, Invoice, InvoiceItem, NewInvoice, RecordId, Snapshot};
use crate::customers::{CustomerSource, CustomersService};
use crate::error::{Error, Result};
use crate::storage::{FetchOnce, Loaded, MaterializedView, SubResourceLoader, ViewState};
use crate::stream::Subscription;
use crate::transport::Transport;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Client-side invoice state, constructed once per application context
pub struct InvoiceStore {
    /// Transport for remote calls
    transport: Arc<dyn Transport>,
    /// Resource names and join policy
    config: StoreConfig,
    /// Base collection cache shared with the view
    invoices: Arc<FetchOnce<Invoice>>,
    /// Current enriched collection
    view: MaterializedView,
    /// Items of the most recently selected invoice
    items: SubResourceLoader<InvoiceItem>,
    /// Serializes submissions so commands reach the bus in issue order
    submissions: Mutex<()>,
}

impl InvoiceStore {
    /// Create a store over an explicit customer source
    pub fn new(
        transport: Arc<dyn Transport>,
        customers: Arc<dyn CustomerSource>,
        config: StoreConfig,
    ) -> Self {
        let invoices = Arc::new(FetchOnce::new(
            transport.clone(),
            config.invoices_resource.clone(),
        ));
        let view = MaterializedView::new(invoices.clone(), customers, config.join_policy);
        let items = SubResourceLoader::new(
            transport.clone(),
            config.invoices_resource.clone(),
            config.items_resource.clone(),
        );
        Self {
            transport,
            config,
            invoices,
            view,
            items,
            submissions: Mutex::new(()),
        }
    }

    /// Create a store whose customers are loaded from the same transport.
    ///
    /// The customer service is returned so callers can edit customers.
    pub fn with_transport(
        transport: Arc<dyn Transport>,
        config: StoreConfig,
    ) -> (Self, Arc<CustomersService>) {
        let customers = Arc::new(CustomersService::new(
            transport.clone(),
            config.customers_resource.clone(),
        ));
        let store = Self::new(transport, customers.clone(), config);
        (store, customers)
    }

    /// Subscribe to the current enriched invoices, starting the view if needed
    pub fn request_collection(&self) -> Result<Subscription<ViewState>> {
        self.view.request()
    }

    /// The raw base collection, fetched at most once
    pub async fn invoices(&self) -> Result<Snapshot<Invoice>> {
        self.invoices.request().await
    }

    /// Select an invoice and subscribe to its items
    pub fn request_items(&self, invoice_id: RecordId) -> Result<Subscription<Loaded<InvoiceItem>>> {
        self.items.request(invoice_id)
    }

    /// Raw access to the command bus, for commands with no remote effect
    pub fn commands(&self) -> &CommandBus {
        self.view.commands()
    }

    /// Create an invoice remotely and fold the stored record into the view.
    ///
    /// On failure nothing is folded and the error is returned.
    pub async fn submit_add(&self, payload: NewInvoice) -> Result<Invoice> {
        let _turn = self.submissions.lock().await;
        let body = serde_json::to_value(&payload)?;
        let created = self
            .transport
            .create_record(&self.config.invoices_resource, body)
            .await?;
        let invoice: Invoice = decode(created)?;
        info!(id = %invoice.id, "invoice created");
        self.view.commands().add(invoice.clone())?;
        Ok(invoice)
    }

    /// Delete an invoice remotely and fold the removal into the view.
    ///
    /// A remote `NotFound` is treated as already deleted.
    pub async fn submit_delete(&self, id: RecordId) -> Result<()> {
        let _turn = self.submissions.lock().await;
        let removed = match self
            .transport
            .delete_record(&self.config.invoices_resource, id)
            .await
        {
            Ok(removed) => echoed_id(&removed).unwrap_or(id),
            Err(Error::NotFound(what)) => {
                debug!(%id, %what, "invoice already gone remotely");
                id
            }
            Err(e) => return Err(e),
        };
        info!(id = %removed, "invoice deleted");
        self.view.commands().delete(removed)
    }
}

fn echoed_id(removed: &Value) -> Option<RecordId> {
    removed.get("id").and_then(Value::as_u64).map(RecordId)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JoinPolicy;
    use crate::transport::{InMemoryTransport, MockTransport};
    use serde_json::json;
    use std::time::Duration;

    fn backend() -> Arc<InMemoryTransport> {
        Arc::new(
            InMemoryTransport::new()
                .with_collection(
                    "invoices",
                    vec![
                        json!({"id": 1, "customer_id": 9, "total": 10}),
                        json!({"id": 2, "customer_id": 10, "total": 20}),
                    ],
                )
                .with_collection("customers", vec![json!({"id": 9}), json!({"id": 10})])
                .with_collection("invoices/1/items", vec![json!({"invoice_id": 1, "qty": 3})])
                .with_delay("invoices", Duration::from_millis(10)),
        )
    }

    fn store(backend: Arc<InMemoryTransport>) -> InvoiceStore {
        InvoiceStore::with_transport(backend, StoreConfig::default()).0
    }

    fn ids(state: &ViewState) -> Vec<u64> {
        state.as_ref().unwrap().iter().map(|r| r.id().get()).collect()
    }

    #[tokio::test]
    async fn test_concurrent_collection_requests_fetch_once() {
        let backend = backend();
        let store = store(backend.clone());

        let (a, b) = tokio::join!(store.invoices(), async {
            let mut sub = store.request_collection().unwrap();
            sub.next().await.unwrap()
        });

        assert_eq!(a.unwrap().len(), 2);
        assert_eq!(ids(&b), vec![1, 2]);
        assert_eq!(backend.calls("GET invoices"), 1);
    }

    #[tokio::test]
    async fn test_delete_then_add_through_transport() {
        let backend = backend();
        let store = store(backend.clone());
        let mut sub = store.request_collection().unwrap();
        sub.next().await.unwrap().unwrap();

        store.submit_delete(RecordId(1)).await.unwrap();
        let created = store
            .submit_add(NewInvoice::new(9).with_field("total", json!(30)))
            .await
            .unwrap();
        assert_eq!(created.id, RecordId(3));

        let state = sub
            .wait_for(|s| s.as_ref().map(|r| r.iter().any(|i| i.id() == created.id)).unwrap_or(false))
            .await
            .unwrap();
        assert_eq!(ids(&state), vec![2, 3]);
        assert_eq!(
            state.as_ref().unwrap()[1].customer.as_ref().map(|c| c.id),
            Some(RecordId(9))
        );
        assert_eq!(backend.collection("invoices").len(), 2);
    }

    #[tokio::test]
    async fn test_delete_of_missing_invoice_is_noop() {
        let store = store(backend());
        let mut sub = store.request_collection().unwrap();
        sub.next().await.unwrap().unwrap();

        store.submit_delete(RecordId(99)).await.unwrap();
        store.submit_add(NewInvoice::new(10)).await.unwrap();

        let state = sub.wait_for(|s| ids(s).len() == 3).await.unwrap();
        assert_eq!(ids(&state), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_view_and_bus_usable() {
        let mut mock = MockTransport::new();
        mock.expect_fetch_collection().returning(|resource| match resource {
            "invoices" => Ok(vec![json!({"id": 1, "customer_id": 9})]),
            _ => Ok(vec![json!({"id": 9})]),
        });
        mock.expect_create_record()
            .times(1)
            .returning(|_, _| Err(Error::Transport("503 unavailable".to_string())));
        mock.expect_delete_record()
            .times(1)
            .returning(|_, id| Ok(json!({"id": id.get(), "customer_id": 9})));

        let config = StoreConfig {
            join_policy: JoinPolicy::Snapshot,
            ..StoreConfig::default()
        };
        let (store, _) = InvoiceStore::with_transport(Arc::new(mock), config);
        let mut sub = store.request_collection().unwrap();
        sub.next().await.unwrap().unwrap();

        let err = store.submit_add(NewInvoice::new(9)).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(ids(&store.view.latest().unwrap()), vec![1]);

        store.submit_delete(RecordId(1)).await.unwrap();
        let state = sub.wait_for(|s| ids(s).is_empty()).await.unwrap();
        assert!(state.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_not_found_still_removes_locally() {
        let backend = backend();
        let store = store(backend.clone());
        let mut sub = store.request_collection().unwrap();
        sub.next().await.unwrap().unwrap();

        // Removed remotely behind the store's back.
        backend.delete_record("invoices", RecordId(2)).await.unwrap();
        store.submit_delete(RecordId(2)).await.unwrap();

        let state = sub.wait_for(|s| ids(s) == vec![1]).await.unwrap();
        assert_eq!(ids(&state), vec![1]);
    }

    #[tokio::test]
    async fn test_request_items_for_selected_invoice() {
        let backend = backend();
        let store = store(backend.clone());

        let items = store.request_items(RecordId(1)).unwrap().next().await.unwrap().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].fields.get("qty"), Some(&json!(3)));

        let empty = store.request_items(RecordId(2)).unwrap().next().await.unwrap().unwrap();
        assert!(empty.is_empty());
        assert_eq!(backend.calls("GET invoices/1/items"), 1);
    }
}
