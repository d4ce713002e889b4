//! Entity trait: identity + continuity across state changes.
//!
//! Reference data (lots, catalog items, parties) are entities; they are stored
//! by identity but do not go through command/event handling.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
