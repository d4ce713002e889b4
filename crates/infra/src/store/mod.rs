//! Transactional store boundary.
//!
//! Every fulfillment operation runs inside one `FulfillmentStore::transaction`
//! call: all of its ledger and document writes commit together or not at all.

pub mod in_memory;
pub mod r#trait;

pub use in_memory::{InMemoryStore, StoreState};
pub use r#trait::{
    Catalog, FulfillmentStore, InventoryLedger, LotChange, ManufacturingRepository,
    OrderRepository, PurchasingRepository, StoreError, Transaction,
};
