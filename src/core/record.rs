//! Record types for the invoice view
//!
//! Records carry their identifying keys as typed fields and keep every other
//! domain field opaque in a JSON map, so the view never has to know the
//! remote schema beyond `id` and the foreign keys it joins on.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Immutable, shared collection value handed to observers.
///
/// Every emission is a fresh `Arc`; nothing reachable from a published
/// snapshot is ever mutated afterwards.
pub type Snapshot<T> = Arc<Vec<T>>;

/// Opaque domain fields of a record
pub type Fields = Map<String, Value>;

/// Remote record identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Get the raw numeric id
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base record ("invoice")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice id
    pub id: RecordId,
    /// Foreign key into the customer collection
    pub customer_id: RecordId,
    /// Remaining domain fields
    #[serde(flatten)]
    pub fields: Fields,
}

impl Invoice {
    /// Create an invoice with no domain fields
    pub fn new(id: impl Into<RecordId>, customer_id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            customer_id: customer_id.into(),
            fields: Fields::new(),
        }
    }

    /// Set a domain field
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Payload for creating an invoice; the server assigns the id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewInvoice {
    /// Foreign key into the customer collection
    pub customer_id: RecordId,
    /// Remaining domain fields
    #[serde(flatten)]
    pub fields: Fields,
}

impl NewInvoice {
    pub fn new(customer_id: impl Into<RecordId>) -> Self {
        Self {
            customer_id: customer_id.into(),
            fields: Fields::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Related record ("customer")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
}

impl Customer {
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Fields::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// Invoice joined with the customer its `customer_id` resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedInvoice {
    #[serde(flatten)]
    pub invoice: Invoice,
    /// `None` when no customer matched at enrichment time
    pub customer: Option<Customer>,
}

impl EnrichedInvoice {
    /// Get the invoice id
    pub fn id(&self) -> RecordId {
        self.invoice.id
    }
}

/// Nested record ("invoice item"), fetched per parent invoice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub invoice_id: RecordId,
    #[serde(flatten)]
    pub fields: Fields,
}

/// Decode a raw transport collection into typed records
pub fn decode_all<T: DeserializeOwned>(raw: Vec<Value>) -> Result<Vec<T>> {
    raw.into_iter()
        .map(|value| serde_json::from_value(value).map_err(Into::into))
        .collect()
}

/// Decode a single raw transport record
pub fn decode<T: DeserializeOwned>(raw: Value) -> Result<T> {
    Ok(serde_json::from_value(raw)?)
}
