//! Fulfillment service: the operations exposed to callers.
//!
//! Each public operation runs in exactly one store transaction. Audit records
//! are buffered during the transaction and published after it commits.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use fulfil_core::{
    AggregateRoot, DomainError, ExpectedVersion, ManufacturingOrderId, OrderId, PartyId,
    ProductId, PurchaseOrderId, StockLotId,
};
use fulfil_events::AuditSink;
use fulfil_infra::{
    Catalog, FulfillmentConfig, FulfillmentStore, InventoryLedger, LotChange,
    ManufacturingRepository, OrderRepository, PurchasingRepository, Transaction,
};
use fulfil_inventory::{LedgerAction, StockItem, StockLot, available_quantity};
use fulfil_manufacturing::{
    CancelManufacturingOrder, CompleteProduction, ManufacturingOrder, ManufacturingOrderCommand,
    ManufacturingOrderEvent, ReleaseManufacturingOrder, StartProduction,
};
use fulfil_parties::PartyKind;
use fulfil_purchasing::{
    CancelPurchaseOrder, MarkReceived, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent,
    SendPurchaseOrder,
};
use fulfil_sales::{
    AddLine, ApproveOrder, BeginFulfillment, CancelOrder, CreateOrder, LineAllocation, Order,
    OrderCommand, OrderEvent, ShipOrder, SubmitOrder, TrackingInfo,
};

use crate::allocator::allocate;
use crate::audit::AuditBuffer;
use crate::cascade::{ShortageEntry, UnresolvedShortage, resolve};
use crate::dispatch::execute;
use crate::error::{FulfillmentError, FulfillmentResult};

/// One requested order line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

/// Residual shortage of one product after allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductShortage {
    pub product_id: ProductId,
    pub short_quantity: i64,
}

/// Result of `submit_order`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmitOutcome {
    /// True when every line was fully allocated.
    pub allocated: bool,
    pub shortages: Vec<ProductShortage>,
    pub manufacturing_order_ids: Vec<ManufacturingOrderId>,
    pub purchase_order_ids: Vec<PurchaseOrderId>,
    pub unresolved_materials: Vec<UnresolvedShortage>,
    pub unplanned_products: Vec<ProductId>,
}

/// Order lifecycle, allocation and shortage cascade over a transactional store.
#[derive(Debug)]
pub struct FulfillmentService<S, A> {
    store: S,
    audit: A,
    config: FulfillmentConfig,
}

impl<S, A> FulfillmentService<S, A> {
    pub fn new(store: S, audit: A, config: FulfillmentConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn audit_sink(&self) -> &A {
        &self.audit
    }

    pub fn config(&self) -> &FulfillmentConfig {
        &self.config
    }
}

impl<S, A> FulfillmentService<S, A>
where
    S: FulfillmentStore,
    A: AuditSink,
{
    /// Run `op` in one transaction and publish its audit records on commit.
    fn run<R>(
        &self,
        caused_by: Option<Uuid>,
        op: impl FnOnce(&mut S::Tx, &mut AuditBuffer) -> FulfillmentResult<R>,
    ) -> FulfillmentResult<R> {
        let mut audit = match caused_by {
            Some(root) => AuditBuffer::caused_by(root),
            None => AuditBuffer::new(),
        };
        let result = self.store.transaction(|tx| op(tx, &mut audit))?;
        audit.publish(&self.audit);
        Ok(result)
    }

    /// Create a Draft order for an active retailer.
    #[instrument(skip(self, lines), fields(lines = lines.len()))]
    pub fn place_order(&self, retailer_id: PartyId, lines: &[LineRequest]) -> FulfillmentResult<OrderId> {
        if lines.is_empty() {
            return Err(FulfillmentError::Validation("order needs at least one line".to_string()));
        }

        let order_id = OrderId::new();
        self.run(Some(order_id.into()), |tx, audit| {
            let retailer = tx.party(retailer_id)?;
            if retailer.kind() != PartyKind::Retailer {
                return Err(FulfillmentError::Validation(format!(
                    "party {retailer_id} is not a retailer"
                )));
            }
            if !retailer.can_transact() {
                return Err(DomainError::invalid_state("retailer", retailer.status(), "place orders for").into());
            }
            for line in lines {
                let product = tx.product(line.product_id)?;
                if !product.can_be_sold() {
                    return Err(DomainError::invalid_state("product", product.status(), "order").into());
                }
            }

            let now = Utc::now();
            let mut order = Order::empty(order_id);
            execute(
                &mut order,
                "sales.order",
                OrderCommand::CreateOrder(CreateOrder {
                    order_id,
                    retailer_id,
                    occurred_at: now,
                }),
                audit,
            )?;
            for line in lines {
                execute(
                    &mut order,
                    "sales.order",
                    OrderCommand::AddLine(AddLine {
                        order_id,
                        product_id: line.product_id,
                        quantity: line.quantity,
                        occurred_at: now,
                    }),
                    audit,
                )?;
            }
            tx.save_order(order, ExpectedVersion::Exact(0))?;
            Ok(())
        })?;

        info!(order_id = %order_id, retailer_id = %retailer_id, "order placed");
        Ok(order_id)
    }

    /// Draft → Submitted: allocate every line FIFO and cascade the shortages.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn submit_order(&self, order_id: OrderId) -> FulfillmentResult<SubmitOutcome> {
        let outcome = self.run(Some(order_id.into()), |tx, audit| {
            let mut order = tx.order(order_id)?;
            order.can_submit()?;
            let loaded = order.version();
            let now = Utc::now();

            let mut allocations = Vec::with_capacity(order.lines().len());
            let mut shortages: Vec<ProductShortage> = Vec::new();
            for line in order.lines() {
                let result = allocate(tx, line.product_id, line.quantity_ordered)?;
                for change in &result.changes {
                    audit.lot_change(LedgerAction::Reserved, change, now);
                }
                if result.quantity_short > 0 {
                    match shortages.iter_mut().find(|s| s.product_id == line.product_id) {
                        Some(existing) => {
                            existing.short_quantity = existing
                                .short_quantity
                                .checked_add(result.quantity_short)
                                .ok_or_else(|| {
                                    FulfillmentError::Validation(format!(
                                        "shortage of product {} exceeds the supported range",
                                        line.product_id
                                    ))
                                })?;
                        }
                        None => shortages.push(ProductShortage {
                            product_id: line.product_id,
                            short_quantity: result.quantity_short,
                        }),
                    }
                }
                allocations.push(LineAllocation {
                    line_no: line.line_no,
                    quantity_allocated: result.quantity_allocated,
                    quantity_short: result.quantity_short,
                    records: result.records,
                });
            }

            execute(
                &mut order,
                "sales.order",
                OrderCommand::SubmitOrder(SubmitOrder {
                    order_id,
                    allocations,
                    occurred_at: now,
                }),
                audit,
            )?;
            tx.save_order(order, ExpectedVersion::Exact(loaded))?;

            let mut outcome = SubmitOutcome {
                allocated: shortages.is_empty(),
                ..SubmitOutcome::default()
            };
            if self.config.cascade_on_submit && !shortages.is_empty() {
                let entries: Vec<ShortageEntry> = shortages
                    .iter()
                    .map(|s| ShortageEntry {
                        product_id: s.product_id,
                        short_quantity: s.short_quantity,
                        source_order_ids: BTreeSet::from([order_id]),
                    })
                    .collect();
                let cascade = resolve(tx, &entries, self.config.fail_on_missing_bom, now, audit)?;
                outcome.manufacturing_order_ids = cascade.manufacturing_order_ids;
                outcome.purchase_order_ids = cascade.purchase_order_ids;
                outcome.unresolved_materials = cascade.unresolved_materials;
                outcome.unplanned_products = cascade.unplanned_products;
            }
            outcome.shortages = shortages;
            Ok(outcome)
        })?;

        info!(
            order_id = %order_id,
            allocated = outcome.allocated,
            short_products = outcome.shortages.len(),
            manufacturing_orders = outcome.manufacturing_order_ids.len(),
            purchase_orders = outcome.purchase_order_ids.len(),
            "order submitted"
        );
        Ok(outcome)
    }

    /// Submitted → Approved. No inventory effects.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn approve_order(&self, order_id: OrderId) -> FulfillmentResult<()> {
        self.update_order(order_id, |order_id, now| {
            OrderCommand::ApproveOrder(ApproveOrder {
                order_id,
                occurred_at: now,
            })
        })?;
        info!(order_id = %order_id, "order approved");
        Ok(())
    }

    /// Approved → InFulfillment. No inventory effects.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn begin_fulfillment(&self, order_id: OrderId) -> FulfillmentResult<()> {
        self.update_order(order_id, |order_id, now| {
            OrderCommand::BeginFulfillment(BeginFulfillment {
                order_id,
                occurred_at: now,
            })
        })?;
        info!(order_id = %order_id, "fulfillment started");
        Ok(())
    }

    fn update_order(
        &self,
        order_id: OrderId,
        command: impl FnOnce(OrderId, chrono::DateTime<Utc>) -> OrderCommand,
    ) -> FulfillmentResult<()> {
        self.run(Some(order_id.into()), |tx, audit| {
            let mut order = tx.order(order_id)?;
            let loaded = order.version();
            execute(&mut order, "sales.order", command(order_id, Utc::now()), audit)?;
            tx.save_order(order, ExpectedVersion::Exact(loaded))?;
            Ok(())
        })
    }

    /// Approved | InFulfillment → Shipped: consume every reservation.
    #[instrument(skip(self, tracking), fields(order_id = %order_id))]
    pub fn ship_order(&self, order_id: OrderId, tracking: Option<TrackingInfo>) -> FulfillmentResult<()> {
        let consumed = self.run(Some(order_id.into()), |tx, audit| {
            let mut order = tx.order(order_id)?;
            let loaded = order.version();
            let now = Utc::now();

            let events = execute(
                &mut order,
                "sales.order",
                OrderCommand::ShipOrder(ShipOrder {
                    order_id,
                    tracking,
                    occurred_at: now,
                }),
                audit,
            )?;
            let mut consumed: i64 = 0;
            for event in &events {
                if let OrderEvent::OrderShipped(shipped) = event {
                    for record in &shipped.consumed {
                        let change = tx.consume(record.lot_id, record.quantity)?;
                        audit.lot_change(LedgerAction::Consumed, &change, now);
                        consumed = consumed.saturating_add(record.quantity);
                    }
                }
            }
            tx.save_order(order, ExpectedVersion::Exact(loaded))?;
            Ok(consumed)
        })?;

        info!(order_id = %order_id, consumed, "order shipped");
        Ok(())
    }

    /// Any non-terminal state → Cancelled: release every reservation.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub fn cancel_order(&self, order_id: OrderId) -> FulfillmentResult<()> {
        let released = self.run(Some(order_id.into()), |tx, audit| {
            let mut order = tx.order(order_id)?;
            let loaded = order.version();
            let now = Utc::now();

            let events = execute(
                &mut order,
                "sales.order",
                OrderCommand::CancelOrder(CancelOrder {
                    order_id,
                    occurred_at: now,
                }),
                audit,
            )?;
            let mut released: i64 = 0;
            for event in &events {
                if let OrderEvent::OrderCancelled(cancelled) = event {
                    for record in &cancelled.released {
                        let change = tx.release(record.lot_id, record.quantity)?;
                        audit.lot_change(LedgerAction::Released, &change, now);
                        released = released.saturating_add(record.quantity);
                    }
                }
            }
            tx.save_order(order, ExpectedVersion::Exact(loaded))?;
            Ok(released)
        })?;

        info!(order_id = %order_id, released, "order cancelled");
        Ok(())
    }

    /// Book a received or produced lot.
    #[instrument(skip(self))]
    pub fn receive_stock(
        &self,
        item: StockItem,
        fifo_date: NaiveDate,
        quantity: i64,
    ) -> FulfillmentResult<StockLotId> {
        let lot_id = self.run(None, |tx, audit| book_lot(tx, audit, item, fifo_date, quantity))?;
        info!(lot_id = %lot_id, quantity, "stock received");
        Ok(lot_id)
    }

    /// Put a lot on quality hold; it stops counting as available.
    #[instrument(skip(self))]
    pub fn quarantine_lot(&self, lot_id: StockLotId) -> FulfillmentResult<()> {
        self.update_lot(lot_id, LedgerAction::Quarantined, StockLot::quarantine)
    }

    #[instrument(skip(self))]
    pub fn lift_quarantine(&self, lot_id: StockLotId) -> FulfillmentResult<()> {
        self.update_lot(lot_id, LedgerAction::QuarantineLifted, StockLot::lift_quarantine)
    }

    fn update_lot(
        &self,
        lot_id: StockLotId,
        action: LedgerAction,
        change: impl FnOnce(&mut StockLot) -> Result<(), DomainError>,
    ) -> FulfillmentResult<()> {
        self.run(None, |tx, audit| {
            let before = tx.lot(lot_id)?;
            let mut after = before.clone();
            change(&mut after)?;
            tx.update_lot(after.clone(), ExpectedVersion::Exact(before.version()))?;
            audit.lot_change(action, &LotChange { before, after }, Utc::now());
            Ok(())
        })?;
        info!(lot_id = %lot_id, action = action.as_str(), "lot status changed");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn release_manufacturing_order(&self, id: ManufacturingOrderId) -> FulfillmentResult<()> {
        self.update_manufacturing_order(id, |id, now| {
            ManufacturingOrderCommand::Release(ReleaseManufacturingOrder {
                manufacturing_order_id: id,
                occurred_at: now,
            })
        })
        .map(|_| ())
    }

    #[instrument(skip(self))]
    pub fn start_manufacturing_order(&self, id: ManufacturingOrderId) -> FulfillmentResult<()> {
        self.update_manufacturing_order(id, |id, now| {
            ManufacturingOrderCommand::Start(StartProduction {
                manufacturing_order_id: id,
                occurred_at: now,
            })
        })
        .map(|_| ())
    }

    /// InProgress → Completed; books the produced quantity as a new
    /// finished-goods lot dated `produced_on`.
    #[instrument(skip(self))]
    pub fn complete_manufacturing_order(
        &self,
        id: ManufacturingOrderId,
        produced_on: NaiveDate,
    ) -> FulfillmentResult<StockLotId> {
        let lot_id = self.run(None, |tx, audit| {
            let mut mo = tx.manufacturing_order(id)?;
            let loaded = mo.version();
            let events = execute(
                &mut mo,
                "manufacturing.order",
                ManufacturingOrderCommand::Complete(CompleteProduction {
                    manufacturing_order_id: id,
                    occurred_at: Utc::now(),
                }),
                audit,
            )?;
            tx.save_manufacturing_order(mo, ExpectedVersion::Exact(loaded))?;

            let Some(ManufacturingOrderEvent::Completed(done)) = events.into_iter().next() else {
                return Err(FulfillmentError::Invariant(
                    "completion produced no completion event".to_string(),
                ));
            };
            book_lot(tx, audit, StockItem::Product(done.product_id), produced_on, done.quantity)
        })?;

        info!(manufacturing_order_id = %id, lot_id = %lot_id, "manufacturing order completed");
        Ok(lot_id)
    }

    #[instrument(skip(self))]
    pub fn cancel_manufacturing_order(&self, id: ManufacturingOrderId) -> FulfillmentResult<()> {
        self.update_manufacturing_order(id, |id, now| {
            ManufacturingOrderCommand::Cancel(CancelManufacturingOrder {
                manufacturing_order_id: id,
                occurred_at: now,
            })
        })
        .map(|_| ())
    }

    fn update_manufacturing_order(
        &self,
        id: ManufacturingOrderId,
        command: impl FnOnce(ManufacturingOrderId, chrono::DateTime<Utc>) -> ManufacturingOrderCommand,
    ) -> FulfillmentResult<ManufacturingOrder> {
        let mo = self.run(None, |tx, audit| {
            let mut mo = tx.manufacturing_order(id)?;
            let loaded = mo.version();
            execute(&mut mo, "manufacturing.order", command(id, Utc::now()), audit)?;
            tx.save_manufacturing_order(mo.clone(), ExpectedVersion::Exact(loaded))?;
            Ok(mo)
        })?;
        info!(manufacturing_order_id = %id, status = ?mo.status(), "manufacturing order updated");
        Ok(mo)
    }

    #[instrument(skip(self))]
    pub fn send_purchase_order(&self, id: PurchaseOrderId) -> FulfillmentResult<()> {
        self.update_purchase_order(id, |id, now| {
            PurchaseOrderCommand::Send(SendPurchaseOrder {
                purchase_order_id: id,
                occurred_at: now,
            })
        })
        .map(|_| ())
    }

    /// Sent → Received; books one material lot per line dated `received_on`.
    #[instrument(skip(self))]
    pub fn receive_purchase_order(
        &self,
        id: PurchaseOrderId,
        received_on: NaiveDate,
    ) -> FulfillmentResult<Vec<StockLotId>> {
        let lot_ids = self.run(None, |tx, audit| {
            let mut po = tx.purchase_order(id)?;
            let loaded = po.version();
            let events = execute(
                &mut po,
                "purchasing.order",
                PurchaseOrderCommand::MarkReceived(MarkReceived {
                    purchase_order_id: id,
                    occurred_at: Utc::now(),
                }),
                audit,
            )?;
            tx.save_purchase_order(po, ExpectedVersion::Exact(loaded))?;

            let mut lot_ids = Vec::new();
            for event in events {
                if let PurchaseOrderEvent::Received(received) = event {
                    for line in received.lines {
                        lot_ids.push(book_lot(
                            tx,
                            audit,
                            StockItem::Material(line.material_id),
                            received_on,
                            line.quantity,
                        )?);
                    }
                }
            }
            Ok(lot_ids)
        })?;

        info!(purchase_order_id = %id, lots = lot_ids.len(), "purchase order received");
        Ok(lot_ids)
    }

    #[instrument(skip(self))]
    pub fn cancel_purchase_order(&self, id: PurchaseOrderId) -> FulfillmentResult<()> {
        self.update_purchase_order(id, |id, now| {
            PurchaseOrderCommand::Cancel(CancelPurchaseOrder {
                purchase_order_id: id,
                occurred_at: now,
            })
        })
        .map(|_| ())
    }

    fn update_purchase_order(
        &self,
        id: PurchaseOrderId,
        command: impl FnOnce(PurchaseOrderId, chrono::DateTime<Utc>) -> PurchaseOrderCommand,
    ) -> FulfillmentResult<PurchaseOrder> {
        let po = self.run(None, |tx, audit| {
            let mut po = tx.purchase_order(id)?;
            let loaded = po.version();
            execute(&mut po, "purchasing.order", command(id, Utc::now()), audit)?;
            tx.save_purchase_order(po.clone(), ExpectedVersion::Exact(loaded))?;
            Ok(po)
        })?;
        info!(purchase_order_id = %id, status = ?po.status(), "purchase order updated");
        Ok(po)
    }

    pub fn order(&self, order_id: OrderId) -> FulfillmentResult<Order> {
        self.store.read(|tx| Ok(tx.order(order_id)?))
    }

    pub fn manufacturing_order(&self, id: ManufacturingOrderId) -> FulfillmentResult<ManufacturingOrder> {
        self.store.read(|tx| Ok(tx.manufacturing_order(id)?))
    }

    /// Manufacturing orders raised on behalf of `order_id`.
    pub fn manufacturing_orders_for(&self, order_id: OrderId) -> FulfillmentResult<Vec<ManufacturingOrder>> {
        self.store.read(|tx| Ok(tx.manufacturing_orders_for(order_id)?))
    }

    pub fn purchase_order(&self, id: PurchaseOrderId) -> FulfillmentResult<PurchaseOrder> {
        self.store.read(|tx| Ok(tx.purchase_order(id)?))
    }

    pub fn lot(&self, lot_id: StockLotId) -> FulfillmentResult<StockLot> {
        self.store.read(|tx| Ok(tx.lot(lot_id)?))
    }

    /// Unreserved quantity across the item's available lots.
    pub fn available(&self, item: StockItem) -> FulfillmentResult<i64> {
        self.store
            .read(|tx| Ok(available_quantity(&tx.available_lots(item)?)))
    }
}

fn book_lot<T>(
    tx: &mut T,
    audit: &mut AuditBuffer,
    item: StockItem,
    fifo_date: NaiveDate,
    quantity: i64,
) -> FulfillmentResult<StockLotId>
where
    T: Transaction + ?Sized,
{
    match item {
        StockItem::Product(product_id) => {
            tx.product(product_id)?;
        }
        StockItem::Material(material_id) => {
            tx.material(material_id)?;
        }
    }

    let lot = StockLot::receive(StockLotId::new(), item, fifo_date, quantity)?;
    let lot_id = lot.id_typed();
    audit.lot_received(&lot, Utc::now());
    tx.receive_lot(lot)?;
    Ok(lot_id)
}
