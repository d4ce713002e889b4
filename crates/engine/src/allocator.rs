//! FIFO allocator.
//!
//! Allocation is split in two stages: `plan_allocation` walks lots oldest
//! first and decides what to take from each, without touching the ledger;
//! `allocate` then reserves every planned slice with a compare-and-swap on the
//! lot version seen while planning.

use tracing::debug;

use fulfil_core::{ExpectedVersion, ProductId, StockLotId};
use fulfil_infra::{InventoryLedger, LotChange};
use fulfil_inventory::{AllocationRecord, StockItem, StockLot};

use crate::error::{FulfillmentError, FulfillmentResult};

/// One slice of demand taken from one lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedReservation {
    pub lot_id: StockLotId,
    pub quantity: i64,
    /// Lot version observed while planning.
    pub lot_version: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllocationPlan {
    pub reservations: Vec<PlannedReservation>,
    pub quantity_short: i64,
}

impl AllocationPlan {
    pub fn quantity_allocated(&self) -> i64 {
        self.reservations.iter().map(|r| r.quantity).sum()
    }
}

/// Result of allocating one product quantity.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AllocationOutcome {
    pub quantity_allocated: i64,
    pub quantity_short: i64,
    pub records: Vec<AllocationRecord>,
    /// Ledger changes, in reservation order.
    pub changes: Vec<LotChange>,
}

/// Decide which lots cover `demand`, oldest first.
///
/// Lots that are not allocatable (held, depleted, fully reserved) are skipped.
/// Equal FIFO dates are ordered by lot id.
pub fn plan_allocation(lots: &[StockLot], demand: i64) -> AllocationPlan {
    let mut candidates: Vec<&StockLot> = lots.iter().filter(|l| l.is_allocatable()).collect();
    candidates.sort_by_key(|l| l.fifo_key());

    let mut remaining = demand.max(0);
    let mut reservations = Vec::new();
    for lot in candidates {
        if remaining == 0 {
            break;
        }
        let take = lot.available().min(remaining);
        reservations.push(PlannedReservation {
            lot_id: lot.id_typed(),
            quantity: take,
            lot_version: lot.version(),
        });
        remaining -= take;
    }

    AllocationPlan {
        reservations,
        quantity_short: remaining,
    }
}

/// Reserve up to `quantity` of `product_id` against the ledger, oldest lots first.
///
/// A zero request returns immediately. A lot that changed since it was read
/// surfaces as `Conflict`; re-invoking recomputes from current ledger state.
pub fn allocate<L>(
    ledger: &mut L,
    product_id: ProductId,
    quantity: i64,
) -> FulfillmentResult<AllocationOutcome>
where
    L: InventoryLedger + ?Sized,
{
    if quantity < 0 {
        return Err(FulfillmentError::Validation(format!(
            "cannot allocate negative quantity {quantity}"
        )));
    }
    if quantity == 0 {
        return Ok(AllocationOutcome::default());
    }

    let lots = ledger.available_lots(StockItem::Product(product_id))?;
    let plan = plan_allocation(&lots, quantity);

    let mut outcome = AllocationOutcome {
        quantity_allocated: 0,
        quantity_short: plan.quantity_short,
        records: Vec::with_capacity(plan.reservations.len()),
        changes: Vec::with_capacity(plan.reservations.len()),
    };
    for slice in &plan.reservations {
        let change = ledger.reserve(
            slice.lot_id,
            slice.quantity,
            ExpectedVersion::Exact(slice.lot_version),
        )?;
        outcome.records.push(AllocationRecord {
            lot_id: slice.lot_id,
            quantity: slice.quantity,
        });
        outcome.changes.push(change);
        outcome.quantity_allocated += slice.quantity;
    }

    debug!(
        product_id = %product_id,
        requested = quantity,
        allocated = outcome.quantity_allocated,
        short = outcome.quantity_short,
        lots = outcome.records.len(),
        "allocated product demand"
    );
    Ok(outcome)
}
