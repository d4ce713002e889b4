use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fulfil_core::{
    Aggregate, AggregateRoot, DomainError, ManufacturingOrderId, MaterialId, PartyId,
    PurchaseOrderId,
};
use fulfil_events::Event;

/// Purchase order status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseOrderStatus {
    Draft,
    Sent,
    Received,
    Cancelled,
}

/// One material bought from the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderLine {
    pub line_no: u32,
    pub material_id: MaterialId,
    pub quantity: i64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    id: PurchaseOrderId,
    vendor_id: Option<PartyId>,
    status: PurchaseOrderStatus,
    lines: Vec<PurchaseOrderLine>,
    source_manufacturing_order_ids: BTreeSet<ManufacturingOrderId>,
    version: u64,
    created: bool,
}

impl PurchaseOrder {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: PurchaseOrderId) -> Self {
        Self {
            id,
            vendor_id: None,
            status: PurchaseOrderStatus::Draft,
            lines: Vec::new(),
            source_manufacturing_order_ids: BTreeSet::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PurchaseOrderId {
        self.id
    }

    pub fn vendor_id(&self) -> Option<PartyId> {
        self.vendor_id
    }

    pub fn status(&self) -> PurchaseOrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[PurchaseOrderLine] {
        &self.lines
    }

    pub fn source_manufacturing_order_ids(&self) -> &BTreeSet<ManufacturingOrderId> {
        &self.source_manufacturing_order_ids
    }

    pub fn quantity_for(&self, material_id: MaterialId) -> i64 {
        self.lines
            .iter()
            .filter(|l| l.material_id == material_id)
            .map(|l| l.quantity)
            .sum()
    }
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RaisePurchaseOrder. Lines are `(material, quantity)` in output order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaisePurchaseOrder {
    pub purchase_order_id: PurchaseOrderId,
    pub vendor_id: PartyId,
    pub lines: Vec<(MaterialId, i64)>,
    pub source_manufacturing_order_ids: BTreeSet<ManufacturingOrderId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SendPurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendPurchaseOrder {
    pub purchase_order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReceived {
    pub purchase_order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelPurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPurchaseOrder {
    pub purchase_order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    Raise(RaisePurchaseOrder),
    Send(SendPurchaseOrder),
    MarkReceived(MarkReceived),
    Cancel(CancelPurchaseOrder),
}

/// Event: PurchaseOrderRaised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderRaised {
    pub purchase_order_id: PurchaseOrderId,
    pub vendor_id: PartyId,
    pub lines: Vec<PurchaseOrderLine>,
    pub source_manufacturing_order_ids: BTreeSet<ManufacturingOrderId>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderSent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderSent {
    pub purchase_order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderReceived. Carries the lines so receipts can be booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderReceived {
    pub purchase_order_id: PurchaseOrderId,
    pub lines: Vec<PurchaseOrderLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PurchaseOrderCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrderCancelled {
    pub purchase_order_id: PurchaseOrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    Raised(PurchaseOrderRaised),
    Sent(PurchaseOrderSent),
    Received(PurchaseOrderReceived),
    Cancelled(PurchaseOrderCancelled),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::Raised(_) => "purchasing.order.raised",
            PurchaseOrderEvent::Sent(_) => "purchasing.order.sent",
            PurchaseOrderEvent::Received(_) => "purchasing.order.received",
            PurchaseOrderEvent::Cancelled(_) => "purchasing.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::Raised(e) => e.occurred_at,
            PurchaseOrderEvent::Sent(e) => e.occurred_at,
            PurchaseOrderEvent::Received(e) => e.occurred_at,
            PurchaseOrderEvent::Cancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::Raised(e) => {
                self.id = e.purchase_order_id;
                self.vendor_id = Some(e.vendor_id);
                self.lines = e.lines.clone();
                self.source_manufacturing_order_ids = e.source_manufacturing_order_ids.clone();
                self.status = PurchaseOrderStatus::Draft;
                self.created = true;
            }
            PurchaseOrderEvent::Sent(_) => {
                self.status = PurchaseOrderStatus::Sent;
            }
            PurchaseOrderEvent::Received(_) => {
                self.status = PurchaseOrderStatus::Received;
            }
            PurchaseOrderEvent::Cancelled(_) => {
                self.status = PurchaseOrderStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::Raise(cmd) => self.handle_raise(cmd),
            PurchaseOrderCommand::Send(cmd) => self.handle_send(cmd),
            PurchaseOrderCommand::MarkReceived(cmd) => self.handle_receive(cmd),
            PurchaseOrderCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl PurchaseOrder {
    fn ensure_created(&self, id: PurchaseOrderId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("purchase order", self.id));
        }
        if self.id != id {
            return Err(DomainError::invariant("purchase_order_id mismatch"));
        }
        Ok(())
    }

    fn handle_raise(&self, cmd: &RaisePurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("purchase order already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation(
                "cannot raise purchase order without lines",
            ));
        }

        let mut seen = HashSet::new();
        let mut lines = Vec::with_capacity(cmd.lines.len());
        for (idx, (material_id, quantity)) in cmd.lines.iter().enumerate() {
            if *quantity <= 0 {
                return Err(DomainError::validation("quantity must be positive"));
            }
            if !seen.insert(*material_id) {
                return Err(DomainError::validation(format!(
                    "material {material_id} appears on more than one line"
                )));
            }
            lines.push(PurchaseOrderLine {
                line_no: (idx as u32) + 1,
                material_id: *material_id,
                quantity: *quantity,
            });
        }

        Ok(vec![PurchaseOrderEvent::Raised(PurchaseOrderRaised {
            purchase_order_id: cmd.purchase_order_id,
            vendor_id: cmd.vendor_id,
            lines,
            source_manufacturing_order_ids: cmd.source_manufacturing_order_ids.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_send(&self, cmd: &SendPurchaseOrder) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created(cmd.purchase_order_id)?;

        if self.status != PurchaseOrderStatus::Draft {
            return Err(DomainError::invalid_state("purchase order", self.status, "send"));
        }

        Ok(vec![PurchaseOrderEvent::Sent(PurchaseOrderSent {
            purchase_order_id: cmd.purchase_order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_receive(&self, cmd: &MarkReceived) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created(cmd.purchase_order_id)?;

        if self.status != PurchaseOrderStatus::Sent {
            return Err(DomainError::invalid_state(
                "purchase order",
                self.status,
                "receive",
            ));
        }

        Ok(vec![PurchaseOrderEvent::Received(PurchaseOrderReceived {
            purchase_order_id: cmd.purchase_order_id,
            lines: self.lines.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(
        &self,
        cmd: &CancelPurchaseOrder,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        self.ensure_created(cmd.purchase_order_id)?;

        if !matches!(
            self.status,
            PurchaseOrderStatus::Draft | PurchaseOrderStatus::Sent
        ) {
            return Err(DomainError::invalid_state(
                "purchase order",
                self.status,
                "cancel",
            ));
        }

        Ok(vec![PurchaseOrderEvent::Cancelled(PurchaseOrderCancelled {
            purchase_order_id: cmd.purchase_order_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn raise(lines: Vec<(MaterialId, i64)>) -> Result<PurchaseOrder, DomainError> {
        let id = PurchaseOrderId::new();
        let mut po = PurchaseOrder::empty(id);
        let events = po.handle(&PurchaseOrderCommand::Raise(RaisePurchaseOrder {
            purchase_order_id: id,
            vendor_id: PartyId::new(),
            lines,
            source_manufacturing_order_ids: BTreeSet::from([ManufacturingOrderId::new()]),
            occurred_at: test_time(),
        }))?;
        for event in &events {
            po.apply(event);
        }
        Ok(po)
    }

    #[test]
    fn raise_numbers_lines_in_order() {
        let steel = MaterialId::new();
        let paint = MaterialId::new();
        let po = raise(vec![(steel, 50), (paint, 10)]).unwrap();

        assert_eq!(po.status(), PurchaseOrderStatus::Draft);
        assert_eq!(po.lines().len(), 2);
        assert_eq!(po.lines()[0].line_no, 1);
        assert_eq!(po.lines()[1].material_id, paint);
        assert_eq!(po.quantity_for(steel), 50);
    }

    #[test]
    fn raise_rejects_duplicate_materials() {
        let steel = MaterialId::new();
        let err = raise(vec![(steel, 5), (steel, 5)]).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn raise_rejects_empty_orders() {
        assert!(matches!(raise(Vec::new()).unwrap_err(), DomainError::Validation(_)));
    }

    #[test]
    fn receive_requires_sent() {
        let po = raise(vec![(MaterialId::new(), 5)]).unwrap();
        let err = po
            .handle(&PurchaseOrderCommand::MarkReceived(MarkReceived {
                purchase_order_id: po.id_typed(),
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { action: "receive", .. }));
    }

    #[test]
    fn received_orders_cannot_be_cancelled() {
        let mut po = raise(vec![(MaterialId::new(), 5)]).unwrap();
        let id = po.id_typed();
        for command in [
            PurchaseOrderCommand::Send(SendPurchaseOrder {
                purchase_order_id: id,
                occurred_at: test_time(),
            }),
            PurchaseOrderCommand::MarkReceived(MarkReceived {
                purchase_order_id: id,
                occurred_at: test_time(),
            }),
        ] {
            let events = po.handle(&command).unwrap();
            for event in &events {
                po.apply(event);
            }
        }
        assert_eq!(po.status(), PurchaseOrderStatus::Received);

        let err = po
            .handle(&PurchaseOrderCommand::Cancel(CancelPurchaseOrder {
                purchase_order_id: id,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidState { .. }));
    }

    proptest! {
        /// Property: a raised order has exactly one line per distinct material.
        #[test]
        fn one_line_per_material(quantities in prop::collection::vec(1i64..1_000, 1..12)) {
            let lines: Vec<_> = quantities.iter().map(|q| (MaterialId::new(), *q)).collect();
            let po = raise(lines.clone()).unwrap();
            prop_assert_eq!(po.lines().len(), lines.len());
            for (material_id, quantity) in lines {
                prop_assert_eq!(po.quantity_for(material_id), quantity);
            }
        }
    }
}
