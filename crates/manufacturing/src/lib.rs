//! Manufacturing orders raised to cover finished-goods shortages.

pub mod order;
pub mod requirement;

pub use order::{
    CancelManufacturingOrder, CompleteProduction, ManufacturingOrder, ManufacturingOrderCancelled,
    ManufacturingOrderCommand, ManufacturingOrderEvent, ManufacturingOrderPlanned,
    ManufacturingOrderReleased, ManufacturingOrderStatus, PlanManufacturingOrder,
    ProductionCompleted, ProductionStarted, ReleaseManufacturingOrder, StartProduction,
};
pub use requirement::MaterialRequirement;
