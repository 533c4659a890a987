//! Stateful fold of commands into the materialized collection.
//!
//! The folder owns the current collection and the latest customer
//! collection. Every step builds a new `Snapshot`; previously returned
//! snapshots are never touched.

use crate::config::JoinPolicy;
use crate::core::command::Command;
use crate::core::record::{Customer, EnrichedInvoice, Snapshot};
use crate::storage::join::{reenrich, CustomerIndex};
use std::sync::Arc;
use tracing::debug;

pub struct ViewFolder {
    records: Snapshot<EnrichedInvoice>,
    customers: Snapshot<Customer>,
    policy: JoinPolicy,
}

impl ViewFolder {
    /// Start folding from the joined base collection
    pub fn seed(
        records: Vec<EnrichedInvoice>,
        customers: Snapshot<Customer>,
        policy: JoinPolicy,
    ) -> Self {
        Self {
            records: Arc::new(records),
            customers,
            policy,
        }
    }

    /// Current collection
    pub fn current(&self) -> Snapshot<EnrichedInvoice> {
        self.records.clone()
    }

    /// Apply one command to the current collection.
    ///
    /// Returns the new collection, or `None` when the command left it
    /// unchanged.
    pub fn apply(&mut self, command: Command) -> Option<Snapshot<EnrichedInvoice>> {
        let next = match command {
            Command::Add(invoice) => {
                let id = invoice.id;
                let enriched = CustomerIndex::new(&self.customers).enrich(invoice);
                debug!(%id, matched = enriched.customer.is_some(), "folding add");
                self.records
                    .iter()
                    .filter(|record| record.id() != id)
                    .cloned()
                    .chain(std::iter::once(enriched))
                    .collect()
            }
            Command::Delete(id) => {
                if !self.records.iter().any(|record| record.id() == id) {
                    debug!(%id, "delete target absent, view unchanged");
                    return None;
                }
                debug!(%id, "folding delete");
                self.records
                    .iter()
                    .filter(|record| record.id() != id)
                    .cloned()
                    .collect()
            }
        };
        self.records = Arc::new(next);
        Some(self.current())
    }

    /// Record a new customer collection for future `Add`s.
    ///
    /// Under `JoinPolicy::Live` existing records are re-enriched and the new
    /// collection is returned.
    pub fn update_customers(
        &mut self,
        customers: Snapshot<Customer>,
    ) -> Option<Snapshot<EnrichedInvoice>> {
        self.customers = customers;
        match self.policy {
            JoinPolicy::Snapshot => None,
            JoinPolicy::Live => {
                let next = reenrich(&self.records, &self.customers);
                if next == *self.records {
                    return None;
                }
                self.records = Arc::new(next);
                Some(self.current())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{Invoice, RecordId};
    use crate::storage::join::enrich;
    use proptest::prelude::*;
    use serde_json::json;

    fn folder(policy: JoinPolicy) -> ViewFolder {
        let customers = Arc::new(vec![Customer::new(9), Customer::new(10)]);
        let records = enrich(&[Invoice::new(1, 9), Invoice::new(2, 10)], &customers);
        ViewFolder::seed(records, customers, policy)
    }

    fn ids(records: &[EnrichedInvoice]) -> Vec<u64> {
        records.iter().map(|r| r.id().get()).collect()
    }

    #[test]
    fn test_delete_then_add() {
        let mut folder = folder(JoinPolicy::Live);
        folder.apply(Command::Delete(RecordId(1)));
        let result = folder.apply(Command::Add(Invoice::new(3, 9))).unwrap();
        assert_eq!(ids(&result), vec![2, 3]);
    }

    #[test]
    fn test_add_then_delete() {
        let mut folder = folder(JoinPolicy::Live);
        let after_add = folder.apply(Command::Add(Invoice::new(3, 9))).unwrap();
        assert_eq!(ids(&after_add), vec![1, 2, 3]);

        let after_delete = folder.apply(Command::Delete(RecordId(1))).unwrap();
        assert_eq!(ids(&after_delete), vec![2, 3]);
        // The earlier snapshot is untouched.
        assert_eq!(ids(&after_add), vec![1, 2, 3]);
    }

    #[test]
    fn test_back_to_back_mutations_compose() {
        let mut folder = folder(JoinPolicy::Live);
        folder.apply(Command::Add(Invoice::new(3, 9)));
        folder.apply(Command::Add(Invoice::new(4, 10)));
        folder.apply(Command::Delete(RecordId(1)));
        folder.apply(Command::Delete(RecordId(2)));
        assert_eq!(ids(&folder.current()), vec![3, 4]);
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let mut folder = folder(JoinPolicy::Live);
        let before = folder.current();
        assert!(folder.apply(Command::Delete(RecordId(42))).is_none());
        assert!(Arc::ptr_eq(&before, &folder.current()));
    }

    #[test]
    fn test_add_resolves_customer() {
        let mut folder = folder(JoinPolicy::Live);
        let result = folder.apply(Command::Add(Invoice::new(3, 10))).unwrap();
        assert_eq!(result[2].customer, Some(Customer::new(10)));

        let result = folder.apply(Command::Add(Invoice::new(4, 77))).unwrap();
        assert_eq!(result[3].customer, None);
    }

    #[test]
    fn test_add_existing_id_replaces_entry() {
        let mut folder = folder(JoinPolicy::Live);
        let updated = Invoice::new(1, 10).with_field("total", json!(5));
        let result = folder.apply(Command::Add(updated.clone())).unwrap();

        assert_eq!(ids(&result), vec![2, 1]);
        assert_eq!(result[1].invoice, updated);
    }

    #[test]
    fn test_live_policy_reenriches_existing() {
        let mut folder = folder(JoinPolicy::Live);
        let renamed = Customer::new(9).with_field("name", json!("Ada"));

        let result = folder
            .update_customers(Arc::new(vec![renamed.clone(), Customer::new(10)]))
            .unwrap();
        assert_eq!(result[0].customer, Some(renamed));
    }

    #[test]
    fn test_snapshot_policy_keeps_existing_but_adds_use_latest() {
        let mut folder = folder(JoinPolicy::Snapshot);
        let renamed = Customer::new(9).with_field("name", json!("Ada"));

        assert!(folder
            .update_customers(Arc::new(vec![renamed.clone()]))
            .is_none());
        assert_eq!(folder.current()[0].customer, Some(Customer::new(9)));

        let result = folder.apply(Command::Add(Invoice::new(3, 9))).unwrap();
        assert_eq!(result[2].customer, Some(renamed));
    }

    fn command() -> impl Strategy<Value = Command> {
        prop_oneof![
            (1u64..8, 9u64..12).prop_map(|(id, customer)| Command::Add(Invoice::new(id, customer))),
            (1u64..8).prop_map(|id| Command::Delete(RecordId(id))),
        ]
    }

    proptest! {
        #[test]
        fn prop_at_most_one_record_per_id(commands in proptest::collection::vec(command(), 0..40)) {
            let mut folder = folder(JoinPolicy::Live);
            for command in commands {
                let target = command.target();
                let is_add = matches!(command, Command::Add(_));
                folder.apply(command);

                let current = folder.current();
                let mut seen = ids(&current);
                seen.sort_unstable();
                seen.dedup();
                prop_assert_eq!(seen.len(), current.len());
                prop_assert_eq!(current.iter().any(|r| r.id() == target), is_add);
            }
        }
    }
}
