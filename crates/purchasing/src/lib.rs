//! Raw-material purchase orders, one per vendor per cascade run.
//!
//! Pure domain logic; the engine decides what to buy.

pub mod order;

pub use order::{
    CancelPurchaseOrder, MarkReceived, PurchaseOrder, PurchaseOrderCancelled,
    PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderLine, PurchaseOrderRaised,
    PurchaseOrderReceived, PurchaseOrderSent, PurchaseOrderStatus, RaisePurchaseOrder,
    SendPurchaseOrder,
};
