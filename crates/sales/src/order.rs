use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fulfil_core::{Aggregate, AggregateRoot, DomainError, OrderId, PartyId, ProductId};
use fulfil_events::Event;
use fulfil_inventory::AllocationRecord;

/// Order status lifecycle.
///
/// Forward-only: Draft → Submitted → Approved → (InFulfillment) → Shipped.
/// `Cancelled` is reachable from every state except `Shipped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Draft,
    Submitted,
    Approved,
    InFulfillment,
    Shipped,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Cancelled)
    }
}

/// Carrier reference recorded at shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingInfo {
    pub carrier: String,
    pub tracking_number: String,
}

/// Order line with its allocation outcome.
///
/// Once submitted, `quantity_allocated + quantity_short == quantity_ordered`
/// and the allocation records sum to `quantity_allocated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity_ordered: i64,
    pub quantity_allocated: i64,
    pub quantity_short: i64,
    pub allocations: Vec<AllocationRecord>,
}

impl OrderLine {
    pub fn reserved_quantity(&self) -> i64 {
        self.allocations.iter().fold(0i64, |acc, a| acc.saturating_add(a.quantity))
    }
}

/// Allocator result for one line, carried by `SubmitOrder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAllocation {
    pub line_no: u32,
    pub quantity_allocated: i64,
    pub quantity_short: i64,
    pub records: Vec<AllocationRecord>,
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    retailer_id: Option<PartyId>,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    tracking: Option<TrackingInfo>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            retailer_id: None,
            status: OrderStatus::Draft,
            lines: Vec::new(),
            tracking: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn retailer_id(&self) -> Option<PartyId> {
        self.retailer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn tracking(&self) -> Option<&TrackingInfo> {
        self.tracking.as_ref()
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    /// Every allocation record across all lines.
    pub fn allocation_records(&self) -> impl Iterator<Item = &AllocationRecord> {
        self.lines.iter().flat_map(|l| l.allocations.iter())
    }

    pub fn total_reserved(&self) -> i64 {
        self.lines
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.reserved_quantity()))
    }

    pub fn total_short(&self) -> i64 {
        self.lines
            .iter()
            .fold(0i64, |acc, l| acc.saturating_add(l.quantity_short))
    }

    /// Precheck for `SubmitOrder`, before the allocator touches the ledger.
    pub fn can_submit(&self) -> Result<(), DomainError> {
        self.ensure_created()?;
        if self.status != OrderStatus::Draft {
            return Err(DomainError::invalid_state("order", self.status, "submit"));
        }
        if self.lines.is_empty() {
            return Err(DomainError::validation("cannot submit order without lines"));
        }
        Ok(())
    }

    /// Precheck for `ShipOrder`.
    pub fn can_ship(&self) -> Result<(), DomainError> {
        self.ensure_created()?;
        match self.status {
            OrderStatus::Approved | OrderStatus::InFulfillment => Ok(()),
            other => Err(DomainError::invalid_state("order", other, "ship")),
        }
    }

    /// Precheck for `CancelOrder`.
    pub fn can_cancel(&self) -> Result<(), DomainError> {
        self.ensure_created()?;
        if self.status.is_terminal() {
            return Err(DomainError::invalid_state("order", self.status, "cancel"));
        }
        Ok(())
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrder {
    pub order_id: OrderId,
    pub retailer_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddLine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SubmitOrder. Carries the allocator outcome for every line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitOrder {
    pub order_id: OrderId,
    pub allocations: Vec<LineAllocation>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: BeginFulfillment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeginFulfillment {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ShipOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipOrder {
    pub order_id: OrderId,
    pub tracking: Option<TrackingInfo>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    CreateOrder(CreateOrder),
    AddLine(AddLine),
    SubmitOrder(SubmitOrder),
    ApproveOrder(ApproveOrder),
    BeginFulfillment(BeginFulfillment),
    ShipOrder(ShipOrder),
    CancelOrder(CancelOrder),
}

/// Event: OrderCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub order_id: OrderId,
    pub retailer_id: PartyId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LineAdded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineAdded {
    pub order_id: OrderId,
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSubmitted {
    pub order_id: OrderId,
    pub lines: Vec<LineAllocation>,
    pub fully_allocated: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderApproved {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FulfillmentStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentStarted {
    pub order_id: OrderId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderShipped. `consumed` lists every record taken off the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderShipped {
    pub order_id: OrderId,
    pub tracking: Option<TrackingInfo>,
    pub consumed: Vec<AllocationRecord>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled. `released` lists every reservation given back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub order_id: OrderId,
    pub previous_status: OrderStatus,
    pub released: Vec<AllocationRecord>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderCreated(OrderCreated),
    LineAdded(LineAdded),
    OrderSubmitted(OrderSubmitted),
    OrderApproved(OrderApproved),
    FulfillmentStarted(FulfillmentStarted),
    OrderShipped(OrderShipped),
    OrderCancelled(OrderCancelled),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderCreated(_) => "sales.order.created",
            OrderEvent::LineAdded(_) => "sales.order.line_added",
            OrderEvent::OrderSubmitted(_) => "sales.order.submitted",
            OrderEvent::OrderApproved(_) => "sales.order.approved",
            OrderEvent::FulfillmentStarted(_) => "sales.order.fulfillment_started",
            OrderEvent::OrderShipped(_) => "sales.order.shipped",
            OrderEvent::OrderCancelled(_) => "sales.order.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderCreated(e) => e.occurred_at,
            OrderEvent::LineAdded(e) => e.occurred_at,
            OrderEvent::OrderSubmitted(e) => e.occurred_at,
            OrderEvent::OrderApproved(e) => e.occurred_at,
            OrderEvent::FulfillmentStarted(e) => e.occurred_at,
            OrderEvent::OrderShipped(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderCreated(e) => {
                self.id = e.order_id;
                self.retailer_id = Some(e.retailer_id);
                self.status = OrderStatus::Draft;
                self.lines.clear();
                self.tracking = None;
                self.created = true;
            }
            OrderEvent::LineAdded(e) => {
                self.lines.push(OrderLine {
                    line_no: e.line_no,
                    product_id: e.product_id,
                    quantity_ordered: e.quantity,
                    quantity_allocated: 0,
                    quantity_short: 0,
                    allocations: Vec::new(),
                });
            }
            OrderEvent::OrderSubmitted(e) => {
                for result in &e.lines {
                    if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == result.line_no) {
                        line.quantity_allocated = result.quantity_allocated;
                        line.quantity_short = result.quantity_short;
                        line.allocations = result.records.clone();
                    }
                }
                self.status = OrderStatus::Submitted;
            }
            OrderEvent::OrderApproved(_) => {
                self.status = OrderStatus::Approved;
            }
            OrderEvent::FulfillmentStarted(_) => {
                self.status = OrderStatus::InFulfillment;
            }
            OrderEvent::OrderShipped(e) => {
                self.tracking = e.tracking.clone();
                self.status = OrderStatus::Shipped;
            }
            OrderEvent::OrderCancelled(_) => {
                for line in &mut self.lines {
                    line.quantity_allocated = 0;
                    line.quantity_short = 0;
                    line.allocations.clear();
                }
                self.status = OrderStatus::Cancelled;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::CreateOrder(cmd) => self.handle_create(cmd),
            OrderCommand::AddLine(cmd) => self.handle_add_line(cmd),
            OrderCommand::SubmitOrder(cmd) => self.handle_submit(cmd),
            OrderCommand::ApproveOrder(cmd) => self.handle_approve(cmd),
            OrderCommand::BeginFulfillment(cmd) => self.handle_begin_fulfillment(cmd),
            OrderCommand::ShipOrder(cmd) => self.handle_ship(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Order {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found("order", self.id));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreateOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }

        Ok(vec![OrderEvent::OrderCreated(OrderCreated {
            order_id: cmd.order_id,
            retailer_id: cmd.retailer_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_line(&self, cmd: &AddLine) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::Draft {
            return Err(DomainError::invalid_state("order", self.status, "add lines to"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let next_line_no = (self.lines.len() as u32) + 1;

        Ok(vec![OrderEvent::LineAdded(LineAdded {
            order_id: cmd.order_id,
            line_no: next_line_no,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_submit(&self, cmd: &SubmitOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.can_submit()?;
        self.ensure_order_id(cmd.order_id)?;

        if cmd.allocations.len() != self.lines.len() {
            return Err(DomainError::invariant(format!(
                "submit carries {} line results for {} lines",
                cmd.allocations.len(),
                self.lines.len()
            )));
        }

        for line in &self.lines {
            let mut results = cmd.allocations.iter().filter(|a| a.line_no == line.line_no);
            let (Some(result), None) = (results.next(), results.next()) else {
                return Err(DomainError::invariant(format!(
                    "line {} needs exactly one allocation result",
                    line.line_no
                )));
            };
            check_line_result(line, result)?;
        }

        let fully_allocated = cmd.allocations.iter().all(|a| a.quantity_short == 0);

        Ok(vec![OrderEvent::OrderSubmitted(OrderSubmitted {
            order_id: cmd.order_id,
            lines: cmd.allocations.clone(),
            fully_allocated,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::Submitted {
            return Err(DomainError::invalid_state("order", self.status, "approve"));
        }

        Ok(vec![OrderEvent::OrderApproved(OrderApproved {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_begin_fulfillment(
        &self,
        cmd: &BeginFulfillment,
    ) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_order_id(cmd.order_id)?;

        if self.status != OrderStatus::Approved {
            return Err(DomainError::invalid_state(
                "order",
                self.status,
                "begin fulfillment of",
            ));
        }

        Ok(vec![OrderEvent::FulfillmentStarted(FulfillmentStarted {
            order_id: cmd.order_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_ship(&self, cmd: &ShipOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.can_ship()?;
        self.ensure_order_id(cmd.order_id)?;

        if let Some(tracking) = &cmd.tracking {
            if tracking.carrier.trim().is_empty() || tracking.tracking_number.trim().is_empty() {
                return Err(DomainError::validation(
                    "tracking info needs a carrier and a tracking number",
                ));
            }
        }

        Ok(vec![OrderEvent::OrderShipped(OrderShipped {
            order_id: cmd.order_id,
            tracking: cmd.tracking.clone(),
            consumed: self.allocation_records().copied().collect(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.can_cancel()?;
        self.ensure_order_id(cmd.order_id)?;

        // Draft orders never reserved anything.
        let released = if self.status == OrderStatus::Draft {
            Vec::new()
        } else {
            self.allocation_records().copied().collect()
        };

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            order_id: cmd.order_id,
            previous_status: self.status,
            released,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn check_line_result(line: &OrderLine, result: &LineAllocation) -> Result<(), DomainError> {
    if result.quantity_allocated < 0 || result.quantity_short < 0 {
        return Err(DomainError::invariant(format!(
            "line {} has negative allocation figures",
            line.line_no
        )));
    }
    if result.quantity_allocated.checked_add(result.quantity_short) != Some(line.quantity_ordered) {
        return Err(DomainError::invariant(format!(
            "line {}: allocated {} + short {} != ordered {}",
            line.line_no, result.quantity_allocated, result.quantity_short, line.quantity_ordered
        )));
    }
    let recorded = result
        .records
        .iter()
        .try_fold(0i64, |acc, r| acc.checked_add(r.quantity));
    if recorded != Some(result.quantity_allocated) || result.records.iter().any(|r| r.quantity <= 0) {
        return Err(DomainError::invariant(format!(
            "line {}: allocation records do not add up to {}",
            line.line_no, result.quantity_allocated
        )));
    }
    Ok(())
}
