//! `fulfil-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every fulfillment
//! module (no infrastructure concerns): typed identifiers, the domain error
//! taxonomy, and the aggregate/entity traits.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{
    ManufacturingOrderId, MaterialId, OrderId, PartyId, ProductId, PurchaseOrderId, StockLotId,
};
pub use value_object::ValueObject;
