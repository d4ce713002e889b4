//! Value object trait: equality by value, not identity.
//!
//! Allocation records and material requirements are value objects: they have no
//! identity of their own and are only ever stored inside the entity that owns
//! them (an order line, a manufacturing order snapshot).

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**. To "modify" one,
/// build a new one.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
