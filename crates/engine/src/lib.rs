//! Allocation & shortage-cascade engine.
//!
//! ```text
//! submit_order
//!   ↓
//! FIFO allocator (per line) → inventory ledger reservations
//!   ↓ residual shortage, grouped by product
//! derive manufacturing → BOM resolver (per product)
//!   ↓
//! aggregate material shortages across the run
//!   ↓
//! group by preferred vendor → purchase orders
//! ```
//!
//! Every service operation runs in one store transaction. Audit records are
//! buffered while it runs and published only after it commits.

pub mod allocator;
pub mod audit;
pub mod bom;
pub mod cascade;
mod dispatch;
pub mod error;
pub mod service;

pub use allocator::{AllocationOutcome, AllocationPlan, PlannedReservation, allocate, plan_allocation};
pub use audit::AuditBuffer;
pub use bom::expand;
pub use cascade::{
    CascadeOutcome, MaterialShortage, PlannedManufacturing, ShortageEntry, UnresolvedReason,
    UnresolvedShortage, VendorBatch, aggregate_materials, derive_manufacturing, group_by_vendor,
    resolve,
};
pub use error::{FulfillmentError, FulfillmentResult};
pub use service::{FulfillmentService, LineRequest, ProductShortage, SubmitOutcome};
