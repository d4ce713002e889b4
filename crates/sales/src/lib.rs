//! Retailer orders and their fulfillment state machine.
//!
//! Deterministic domain logic only. Allocation results arrive through the
//! `SubmitOrder` command; the ledger side effects are driven by the engine.

pub mod order;

pub use order::{
    AddLine, ApproveOrder, BeginFulfillment, CancelOrder, CreateOrder, FulfillmentStarted,
    LineAdded, LineAllocation, Order, OrderApproved, OrderCancelled, OrderCommand, OrderCreated,
    OrderEvent, OrderLine, OrderShipped, OrderStatus, OrderSubmitted, ShipOrder, SubmitOrder,
    TrackingInfo,
};
