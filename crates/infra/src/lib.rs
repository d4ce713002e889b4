//! Infrastructure layer: the transactional fulfillment store and configuration.

pub mod config;
pub mod store;

pub use config::{AppConfig, ConfigError, FulfillmentConfig};
pub use store::{
    Catalog, FulfillmentStore, InMemoryStore, InventoryLedger, LotChange, ManufacturingRepository,
    OrderRepository, PurchasingRepository, StoreError, StoreState, Transaction,
};
