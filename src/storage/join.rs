//! Left join of invoices against customers on `customer_id == id`

use crate::core::record::{Customer, EnrichedInvoice, Invoice, RecordId};
use std::collections::HashMap;

/// Customer lookup built from one observed customer collection
pub struct CustomerIndex<'a> {
    by_id: HashMap<RecordId, &'a Customer>,
}

impl<'a> CustomerIndex<'a> {
    pub fn new(customers: &'a [Customer]) -> Self {
        let mut by_id = HashMap::with_capacity(customers.len());
        for customer in customers {
            // First occurrence wins, matching a linear find.
            by_id.entry(customer.id).or_insert(customer);
        }
        Self { by_id }
    }

    pub fn get(&self, id: RecordId) -> Option<&'a Customer> {
        self.by_id.get(&id).copied()
    }

    /// Attach the matching customer, or none, to one invoice
    pub fn enrich(&self, invoice: Invoice) -> EnrichedInvoice {
        let customer = self.get(invoice.customer_id).cloned();
        EnrichedInvoice { invoice, customer }
    }
}

/// Enrich a whole collection. Unmatched invoices get `customer: None`.
pub fn enrich(invoices: &[Invoice], customers: &[Customer]) -> Vec<EnrichedInvoice> {
    let index = CustomerIndex::new(customers);
    invoices
        .iter()
        .cloned()
        .map(|invoice| index.enrich(invoice))
        .collect()
}

/// Re-resolve the customer of already enriched records
pub fn reenrich(records: &[EnrichedInvoice], customers: &[Customer]) -> Vec<EnrichedInvoice> {
    let index = CustomerIndex::new(customers);
    records
        .iter()
        .map(|record| index.enrich(record.invoice.clone()))
        .collect()
}
