//! Invoice-View: reactive client-side view of a remote invoices collection
//!
//! The crate keeps an in-memory materialized view of the remote `invoices`
//! collection, enriched with the matching `customers` record, and keeps it
//! consistent as add and delete commands are issued.
//!
//! # Core Concepts
//!
//! - **Fetch-once cache**: the base collection is fetched at most once and
//!   shared by every demander
//! - **Join**: invoices are left-joined with customers on `customer_id`
//! - **Commands**: adds and deletes are folded into the current collection in
//!   arrival order
//! - **Replay streams**: every observer receives the latest value on
//!   subscription and every later value
//! - **Sub-resources**: invoice items are loaded per selected invoice, and a
//!   new selection abandons the previous load
//!
//! # Example
//!
//! ```no_run
//! use invoice_view::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> invoice_view::error::Result<()> {
//! let transport = Arc::new(HttpTransport::new(&HttpConfig::default())?);
//! let (store, _customers) = InvoiceStore::with_transport(transport, StoreConfig::default());
//!
//! let mut invoices = store.request_collection()?;
//! if let Some(current) = invoices.next().await {
//!     println!("{} invoices", current?.len());
//! }
//!
//! store.submit_delete(RecordId(1)).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod customers;
pub mod error;
pub mod storage;
pub mod stream;
pub mod transport;

/// Main store type
pub mod store;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::{HttpConfig, JoinPolicy, StoreConfig};
    pub use crate::core::*;
    pub use crate::customers::{CustomerSource, CustomersService};
    pub use crate::error::{Error, Result};
    pub use crate::storage::*;
    pub use crate::store::InvoiceStore;
    pub use crate::stream::*;
    pub use crate::transport::*;
}
