use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fulfil_core::{
    Aggregate, AggregateRoot, DomainError, ManufacturingOrderId, OrderId, ProductId,
};
use fulfil_events::Event;

use crate::requirement::MaterialRequirement;

/// Manufacturing order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManufacturingOrderStatus {
    Planned,
    Released,
    InProgress,
    Completed,
    Cancelled,
}

/// Aggregate root: ManufacturingOrder.
///
/// Quantity, sources and requirement snapshot are fixed at planning; only the
/// status moves afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingOrder {
    id: ManufacturingOrderId,
    product_id: Option<ProductId>,
    quantity: i64,
    source_order_ids: BTreeSet<OrderId>,
    requirements: Vec<MaterialRequirement>,
    status: ManufacturingOrderStatus,
    planned_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl ManufacturingOrder {
    pub fn empty(id: ManufacturingOrderId) -> Self {
        Self {
            id,
            product_id: None,
            quantity: 0,
            source_order_ids: BTreeSet::new(),
            requirements: Vec::new(),
            status: ManufacturingOrderStatus::Planned,
            planned_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ManufacturingOrderId {
        self.id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn source_order_ids(&self) -> &BTreeSet<OrderId> {
        &self.source_order_ids
    }

    pub fn requirements(&self) -> &[MaterialRequirement] {
        &self.requirements
    }

    pub fn status(&self) -> ManufacturingOrderStatus {
        self.status
    }

    pub fn planned_at(&self) -> Option<DateTime<Utc>> {
        self.planned_at
    }
}

impl AggregateRoot for ManufacturingOrder {
    type Id = ManufacturingOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanManufacturingOrder {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub source_order_ids: BTreeSet<OrderId>,
    pub requirements: Vec<MaterialRequirement>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManufacturingOrder {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartProduction {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteProduction {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelManufacturingOrder {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManufacturingOrderCommand {
    Plan(PlanManufacturingOrder),
    Release(ReleaseManufacturingOrder),
    Start(StartProduction),
    Complete(CompleteProduction),
    Cancel(CancelManufacturingOrder),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingOrderPlanned {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub source_order_ids: BTreeSet<OrderId>,
    pub requirements: Vec<MaterialRequirement>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingOrderReleased {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionStarted {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionCompleted {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManufacturingOrderCancelled {
    pub manufacturing_order_id: ManufacturingOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManufacturingOrderEvent {
    Planned(ManufacturingOrderPlanned),
    Released(ManufacturingOrderReleased),
    Started(ProductionStarted),
    Completed(ProductionCompleted),
    Cancelled(ManufacturingOrderCancelled),
}

impl Event for ManufacturingOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ManufacturingOrderEvent::Planned(_) => "manufacturing.order.planned",
            ManufacturingOrderEvent::Released(_) => "manufacturing.order.released",
            ManufacturingOrderEvent::Started(_) => "manufacturing.order.started",
            ManufacturingOrderEvent::Completed(_) => "manufacturing.order.completed",
            ManufacturingOrderEvent::Cancelled(_) => "manufacturing.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ManufacturingOrderEvent::Planned(e) => e.occurred_at,
            ManufacturingOrderEvent::Released(e) => e.occurred_at,
            ManufacturingOrderEvent::Started(e) => e.occurred_at,
            ManufacturingOrderEvent::Completed(e) => e.occurred_at,
            ManufacturingOrderEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ManufacturingOrder {
    type Command = ManufacturingOrderCommand;
    type Event = ManufacturingOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ManufacturingOrderEvent::Planned(e) => {
                self.id = e.manufacturing_order_id;
                self.product_id = Some(e.product_id);
                self.quantity = e.quantity;
                self.source_order_ids = e.source_order_ids.clone();
                self.requirements = e.requirements.clone();
                self.status = ManufacturingOrderStatus::Planned;
                self.planned_at = Some(e.occurred_at);
                self.created = true;
            }
            ManufacturingOrderEvent::Released(_) => {
                self.status = ManufacturingOrderStatus::Released;
            }
            ManufacturingOrderEvent::Started(_) => {
                self.status = ManufacturingOrderStatus::InProgress;
            }
            ManufacturingOrderEvent::Completed(_) => {
                self.status = ManufacturingOrderStatus::Completed;
            }
            ManufacturingOrderEvent::Cancelled(_) => {
                self.status = ManufacturingOrderStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ManufacturingOrderCommand::Plan(cmd) => self.handle_plan(cmd),
            ManufacturingOrderCommand::Release(cmd) => {
                self.transition(cmd.manufacturing_order_id, "release")?;
                Ok(vec![ManufacturingOrderEvent::Released(ManufacturingOrderReleased {
                    manufacturing_order_id: cmd.manufacturing_order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ManufacturingOrderCommand::Start(cmd) => {
                self.transition(cmd.manufacturing_order_id, "start")?;
                Ok(vec![ManufacturingOrderEvent::Started(ProductionStarted {
                    manufacturing_order_id: cmd.manufacturing_order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ManufacturingOrderCommand::Complete(cmd) => {
                self.transition(cmd.manufacturing_order_id, "complete")?;
                let product_id = self
                    .product_id
                    .ok_or_else(|| DomainError::invariant("planned order without product"))?;
                Ok(vec![ManufacturingOrderEvent::Completed(ProductionCompleted {
                    manufacturing_order_id: cmd.manufacturing_order_id,
                    product_id,
                    quantity: self.quantity,
                    occurred_at: cmd.occurred_at,
                })])
            }
            ManufacturingOrderCommand::Cancel(cmd) => {
                self.transition(cmd.manufacturing_order_id, "cancel")?;
                Ok(vec![ManufacturingOrderEvent::Cancelled(ManufacturingOrderCancelled {
                    manufacturing_order_id: cmd.manufacturing_order_id,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}

impl ManufacturingOrder {
    fn handle_plan(
        &self,
        cmd: &PlanManufacturingOrder,
    ) -> Result<Vec<ManufacturingOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("manufacturing order already exists"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation(
                "manufacturing quantity must be positive",
            ));
        }
        if cmd.source_order_ids.is_empty() {
            return Err(DomainError::validation(
                "manufacturing order needs at least one source order",
            ));
        }

        Ok(vec![ManufacturingOrderEvent::Planned(ManufacturingOrderPlanned {
            manufacturing_order_id: cmd.manufacturing_order_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            source_order_ids: cmd.source_order_ids.clone(),
            requirements: cmd.requirements.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Validate a status move named by `action`.
    fn transition(&self, id: ManufacturingOrderId, action: &'static str) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("manufacturing order", self.id));
        }
        if self.id != id {
            return Err(DomainError::invariant("manufacturing_order_id mismatch"));
        }

        use ManufacturingOrderStatus::*;
        let allowed = match action {
            "release" => self.status == Planned,
            "start" => self.status == Released,
            "complete" => self.status == InProgress,
            "cancel" => matches!(self.status, Planned | Released),
            _ => false,
        };
        if !allowed {
            return Err(DomainError::invalid_state(
                "manufacturing order",
                self.status,
                action,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfil_core::MaterialId;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn planned(quantity: i64) -> ManufacturingOrder {
        let id = ManufacturingOrderId::new();
        let mut mo = ManufacturingOrder::empty(id);
        let events = mo
            .handle(&ManufacturingOrderCommand::Plan(PlanManufacturingOrder {
                manufacturing_order_id: id,
                product_id: ProductId::new(),
                quantity,
                source_order_ids: BTreeSet::from([OrderId::new()]),
                requirements: vec![
                    MaterialRequirement::net(MaterialId::new(), 2 * quantity, 30, None).unwrap(),
                ],
                occurred_at: test_time(),
            }))
            .unwrap();
        for event in &events {
            mo.apply(event);
        }
        mo
    }

    fn step(mo: &mut ManufacturingOrder, command: ManufacturingOrderCommand) -> Result<(), DomainError> {
        let events = mo.handle(&command)?;
        for event in &events {
            mo.apply(event);
        }
        Ok(())
    }

    #[test]
    fn plan_snapshots_requirements_and_sources() {
        let mo = planned(40);
        assert_eq!(mo.status(), ManufacturingOrderStatus::Planned);
        assert_eq!(mo.quantity(), 40);
        assert_eq!(mo.source_order_ids().len(), 1);
        assert_eq!(mo.requirements()[0].quantity_required, 80);
        assert_eq!(mo.requirements()[0].quantity_short, 50);
        assert_eq!(mo.version(), 1);
    }

    #[test]
    fn plan_rejects_non_positive_quantity() {
        let id = ManufacturingOrderId::new();
        let err = ManufacturingOrder::empty(id)
            .handle(&ManufacturingOrderCommand::Plan(PlanManufacturingOrder {
                manufacturing_order_id: id,
                product_id: ProductId::new(),
                quantity: 0,
                source_order_ids: BTreeSet::from([OrderId::new()]),
                requirements: Vec::new(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn lifecycle_moves_forward_to_completed() {
        let mut mo = planned(5);
        let id = mo.id_typed();
        step(&mut mo, ManufacturingOrderCommand::Release(ReleaseManufacturingOrder {
            manufacturing_order_id: id,
            occurred_at: test_time(),
        }))
        .unwrap();
        step(&mut mo, ManufacturingOrderCommand::Start(StartProduction {
            manufacturing_order_id: id,
            occurred_at: test_time(),
        }))
        .unwrap();
        step(&mut mo, ManufacturingOrderCommand::Complete(CompleteProduction {
            manufacturing_order_id: id,
            occurred_at: test_time(),
        }))
        .unwrap();
        assert_eq!(mo.status(), ManufacturingOrderStatus::Completed);
    }

    #[test]
    fn cancel_after_start_is_invalid_state() {
        let mut mo = planned(5);
        let id = mo.id_typed();
        step(&mut mo, ManufacturingOrderCommand::Release(ReleaseManufacturingOrder {
            manufacturing_order_id: id,
            occurred_at: test_time(),
        }))
        .unwrap();
        step(&mut mo, ManufacturingOrderCommand::Start(StartProduction {
            manufacturing_order_id: id,
            occurred_at: test_time(),
        }))
        .unwrap();

        let err = step(&mut mo, ManufacturingOrderCommand::Cancel(CancelManufacturingOrder {
            manufacturing_order_id: id,
            occurred_at: test_time(),
        }))
        .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { action: "cancel", .. }));
        assert_eq!(mo.status(), ManufacturingOrderStatus::InProgress);
    }
}
