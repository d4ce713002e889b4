//! Inventory ledger domain module.
//!
//! Stock lots of finished goods and raw materials, with the reserve / release /
//! consume primitives the allocator and the order lifecycle build on. Pure
//! domain logic (no IO, no storage).

pub mod lot;

pub use lot::{
    AllocationRecord, LedgerAction, LotStatus, StockItem, StockLot, available_quantity,
    sort_fifo,
};
