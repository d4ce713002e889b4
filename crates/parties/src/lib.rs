//! Parties domain module (retailers and vendors).
//!
//! Reference data consulted by the fulfillment engine: who places orders and who
//! supplies raw materials.

pub mod party;

pub use party::{Party, PartyKind, PartyStatus};
