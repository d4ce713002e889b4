use thiserror::Error;

use fulfil_core::{
    DomainError, ExpectedVersion, ManufacturingOrderId, MaterialId, OrderId, PartyId, ProductId,
    PurchaseOrderId, StockLotId,
};
use fulfil_inventory::{StockItem, StockLot};
use fulfil_manufacturing::ManufacturingOrder;
use fulfil_parties::Party;
use fulfil_products::{BomLine, Material, Product};
use fulfil_purchasing::PurchaseOrder;
use fulfil_sales::Order;

/// Store operation error.
///
/// These are infrastructure errors (missing rows, stale versions, lock
/// failures). Domain rule violations raised while mutating a record are
/// carried through unchanged in `Domain`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic concurrency check failed (version mismatch).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store lock poisoned")]
    Poisoned,
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn check_version(
        entity: &'static str,
        id: impl core::fmt::Display,
        expected: ExpectedVersion,
        actual: u64,
    ) -> Result<(), StoreError> {
        if expected.matches(actual) {
            return Ok(());
        }
        Err(StoreError::Conflict(format!(
            "{entity} {id}: expected {expected:?}, found version {actual}"
        )))
    }
}

/// A lot before and after one ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotChange {
    pub before: StockLot,
    pub after: StockLot,
}

/// Per-lot quantities for finished goods and raw materials.
///
/// Mutations are relative (`reserve`, `release`, `consume`) and validated
/// against the lot's current quantities.
pub trait InventoryLedger {
    fn lot(&self, lot_id: StockLotId) -> Result<StockLot, StoreError>;

    /// All lots of `item`, oldest first, regardless of status.
    fn lots_for(&self, item: StockItem) -> Result<Vec<StockLot>, StoreError>;

    /// Allocatable lots of `item` (Available, with unreserved stock), oldest
    /// first with ties broken by lot id.
    fn available_lots(&self, item: StockItem) -> Result<Vec<StockLot>, StoreError> {
        Ok(self
            .lots_for(item)?
            .into_iter()
            .filter(StockLot::is_allocatable)
            .collect())
    }

    fn receive_lot(&mut self, lot: StockLot) -> Result<(), StoreError>;

    /// Reserve against a lot if it is still at `expected` version.
    fn reserve(
        &mut self,
        lot_id: StockLotId,
        quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<LotChange, StoreError>;

    fn release(&mut self, lot_id: StockLotId, quantity: i64) -> Result<LotChange, StoreError>;

    fn consume(&mut self, lot_id: StockLotId, quantity: i64) -> Result<LotChange, StoreError>;

    /// Replace a lot after an administrative change (quarantine and similar).
    fn update_lot(&mut self, lot: StockLot, expected: ExpectedVersion) -> Result<(), StoreError>;
}

/// Reference data: products, materials, parties and bills of materials.
pub trait Catalog {
    fn product(&self, product_id: ProductId) -> Result<Product, StoreError>;

    fn material(&self, material_id: MaterialId) -> Result<Material, StoreError>;

    fn party(&self, party_id: PartyId) -> Result<Party, StoreError>;

    /// Active BOM lines of a product ordered by sequence. Empty when none.
    fn bom_lines(&self, product_id: ProductId) -> Result<Vec<BomLine>, StoreError>;

    fn put_product(&mut self, product: Product) -> Result<(), StoreError>;

    fn put_material(&mut self, material: Material) -> Result<(), StoreError>;

    fn put_party(&mut self, party: Party) -> Result<(), StoreError>;

    fn put_bom_line(&mut self, line: BomLine) -> Result<(), StoreError>;
}

/// Orders keyed by id. `save_order` compares the stored version against
/// `expected`; an absent order counts as version 0.
pub trait OrderRepository {
    fn order(&self, order_id: OrderId) -> Result<Order, StoreError>;

    fn save_order(&mut self, order: Order, expected: ExpectedVersion) -> Result<(), StoreError>;
}

pub trait ManufacturingRepository {
    fn manufacturing_order(
        &self,
        id: ManufacturingOrderId,
    ) -> Result<ManufacturingOrder, StoreError>;

    /// Manufacturing orders raised for `order_id`, in creation order.
    fn manufacturing_orders_for(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ManufacturingOrder>, StoreError>;

    fn save_manufacturing_order(
        &mut self,
        manufacturing_order: ManufacturingOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;
}

pub trait PurchasingRepository {
    fn purchase_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, StoreError>;

    fn save_purchase_order(
        &mut self,
        purchase_order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;
}

/// Everything one fulfillment operation may read or write.
pub trait Transaction:
    InventoryLedger + Catalog + OrderRepository + ManufacturingRepository + PurchasingRepository
{
}

impl<T> Transaction for T where
    T: InventoryLedger + Catalog + OrderRepository + ManufacturingRepository + PurchasingRepository
{
}

/// Serializable, all-or-nothing access to fulfillment state.
pub trait FulfillmentStore: Send + Sync {
    type Tx: Transaction;

    /// Run `f` against a working copy; its writes become visible only if it
    /// returns `Ok`. Transactions are serialized.
    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<R, E>,
        E: From<StoreError>;

    /// Read-only view of committed state.
    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&Self::Tx) -> Result<R, E>,
        E: From<StoreError>;
}
