use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use fulfil_core::{
    AggregateRoot, Entity, ExpectedVersion, ManufacturingOrderId, MaterialId, OrderId, PartyId,
    ProductId, PurchaseOrderId, StockLotId,
};
use fulfil_inventory::{StockItem, StockLot, sort_fifo};
use fulfil_manufacturing::ManufacturingOrder;
use fulfil_parties::Party;
use fulfil_products::{BomLine, Material, Product, active_lines};
use fulfil_purchasing::PurchaseOrder;
use fulfil_sales::Order;

use super::r#trait::{
    Catalog, FulfillmentStore, InventoryLedger, LotChange, ManufacturingRepository,
    OrderRepository, PurchasingRepository, StoreError,
};

/// Complete fulfillment state. Transactions operate on a clone of it.
#[derive(Debug, Clone, Default)]
pub struct StoreState {
    lots: BTreeMap<StockLotId, StockLot>,
    products: HashMap<ProductId, Product>,
    materials: HashMap<MaterialId, Material>,
    parties: HashMap<PartyId, Party>,
    bom_lines: Vec<BomLine>,
    orders: HashMap<OrderId, Order>,
    manufacturing_orders: BTreeMap<ManufacturingOrderId, ManufacturingOrder>,
    purchase_orders: BTreeMap<PurchaseOrderId, PurchaseOrder>,
}

fn put<E: Entity>(map: &mut HashMap<E::Id, E>, entity: E) {
    map.insert(entity.id().clone(), entity);
}

impl StoreState {
    fn lot_mut(&mut self, lot_id: StockLotId) -> Result<&mut StockLot, StoreError> {
        self.lots
            .get_mut(&lot_id)
            .ok_or_else(|| StoreError::not_found("stock lot", lot_id))
    }

    fn mutate_lot(
        &mut self,
        lot_id: StockLotId,
        expected: ExpectedVersion,
        mutation: impl FnOnce(&mut StockLot) -> Result<(), fulfil_core::DomainError>,
    ) -> Result<LotChange, StoreError> {
        let lot = self.lot_mut(lot_id)?;
        StoreError::check_version("stock lot", lot_id, expected, lot.version())?;

        let before = lot.clone();
        mutation(lot)?;
        Ok(LotChange {
            before,
            after: lot.clone(),
        })
    }
}

impl InventoryLedger for StoreState {
    fn lot(&self, lot_id: StockLotId) -> Result<StockLot, StoreError> {
        self.lots
            .get(&lot_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("stock lot", lot_id))
    }

    fn lots_for(&self, item: StockItem) -> Result<Vec<StockLot>, StoreError> {
        let mut lots: Vec<StockLot> = self
            .lots
            .values()
            .filter(|l| l.item() == item)
            .cloned()
            .collect();
        sort_fifo(&mut lots);
        Ok(lots)
    }

    fn receive_lot(&mut self, lot: StockLot) -> Result<(), StoreError> {
        let lot_id = lot.id_typed();
        if self.lots.contains_key(&lot_id) {
            return Err(StoreError::Conflict(format!("stock lot {lot_id} already exists")));
        }
        self.lots.insert(lot_id, lot);
        Ok(())
    }

    fn reserve(
        &mut self,
        lot_id: StockLotId,
        quantity: i64,
        expected: ExpectedVersion,
    ) -> Result<LotChange, StoreError> {
        self.mutate_lot(lot_id, expected, |lot| lot.reserve(quantity))
    }

    fn release(&mut self, lot_id: StockLotId, quantity: i64) -> Result<LotChange, StoreError> {
        self.mutate_lot(lot_id, ExpectedVersion::Any, |lot| lot.release(quantity))
    }

    fn consume(&mut self, lot_id: StockLotId, quantity: i64) -> Result<LotChange, StoreError> {
        self.mutate_lot(lot_id, ExpectedVersion::Any, |lot| lot.consume(quantity))
    }

    fn update_lot(&mut self, lot: StockLot, expected: ExpectedVersion) -> Result<(), StoreError> {
        let lot_id = lot.id_typed();
        let current = self.lot_mut(lot_id)?;
        StoreError::check_version("stock lot", lot_id, expected, current.version())?;
        *current = lot;
        Ok(())
    }
}

impl Catalog for StoreState {
    fn product(&self, product_id: ProductId) -> Result<Product, StoreError> {
        self.products
            .get(&product_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("product", product_id))
    }

    fn material(&self, material_id: MaterialId) -> Result<Material, StoreError> {
        self.materials
            .get(&material_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("material", material_id))
    }

    fn party(&self, party_id: PartyId) -> Result<Party, StoreError> {
        self.parties
            .get(&party_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("party", party_id))
    }

    fn bom_lines(&self, product_id: ProductId) -> Result<Vec<BomLine>, StoreError> {
        Ok(active_lines(&self.bom_lines, product_id)
            .into_iter()
            .cloned()
            .collect())
    }

    fn put_product(&mut self, product: Product) -> Result<(), StoreError> {
        put(&mut self.products, product);
        Ok(())
    }

    fn put_material(&mut self, material: Material) -> Result<(), StoreError> {
        put(&mut self.materials, material);
        Ok(())
    }

    fn put_party(&mut self, party: Party) -> Result<(), StoreError> {
        put(&mut self.parties, party);
        Ok(())
    }

    fn put_bom_line(&mut self, line: BomLine) -> Result<(), StoreError> {
        let existing = self.bom_lines.iter_mut().find(|l| {
            l.product_id() == line.product_id()
                && l.material_id() == line.material_id()
                && l.sequence() == line.sequence()
        });
        match existing {
            Some(slot) => *slot = line,
            None => self.bom_lines.push(line),
        }
        Ok(())
    }
}

impl OrderRepository for StoreState {
    fn order(&self, order_id: OrderId) -> Result<Order, StoreError> {
        self.orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }

    fn save_order(&mut self, order: Order, expected: ExpectedVersion) -> Result<(), StoreError> {
        let order_id = order.id_typed();
        let current = self.orders.get(&order_id).map(|o| o.version()).unwrap_or(0);
        StoreError::check_version("order", order_id, expected, current)?;
        self.orders.insert(order_id, order);
        Ok(())
    }
}

impl ManufacturingRepository for StoreState {
    fn manufacturing_order(
        &self,
        id: ManufacturingOrderId,
    ) -> Result<ManufacturingOrder, StoreError> {
        self.manufacturing_orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("manufacturing order", id))
    }

    fn manufacturing_orders_for(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ManufacturingOrder>, StoreError> {
        let mut found: Vec<ManufacturingOrder> = self
            .manufacturing_orders
            .values()
            .filter(|mo| mo.source_order_ids().contains(&order_id))
            .cloned()
            .collect();
        found.sort_by_key(|mo| (mo.planned_at(), mo.id_typed()));
        Ok(found)
    }

    fn save_manufacturing_order(
        &mut self,
        manufacturing_order: ManufacturingOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let id = manufacturing_order.id_typed();
        let current = self
            .manufacturing_orders
            .get(&id)
            .map(|mo| mo.version())
            .unwrap_or(0);
        StoreError::check_version("manufacturing order", id, expected, current)?;
        self.manufacturing_orders.insert(id, manufacturing_order);
        Ok(())
    }
}

impl PurchasingRepository for StoreState {
    fn purchase_order(&self, id: PurchaseOrderId) -> Result<PurchaseOrder, StoreError> {
        self.purchase_orders
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("purchase order", id))
    }

    fn save_purchase_order(
        &mut self,
        purchase_order: PurchaseOrder,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let id = purchase_order.id_typed();
        let current = self.purchase_orders.get(&id).map(|po| po.version()).unwrap_or(0);
        StoreError::check_version("purchase order", id, expected, current)?;
        self.purchase_orders.insert(id, purchase_order);
        Ok(())
    }
}

/// In-memory fulfillment store.
///
/// Intended for tests/dev. A transaction holds the write lock for its whole
/// duration and mutates a clone of the state, swapping it in on success.
///
/// The clone covers the whole state (lots, catalog, orders, manufacturing and
/// purchase orders), so every transaction costs O(store size).
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FulfillmentStore for InMemoryStore {
    type Tx = StoreState;

    fn transaction<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&mut Self::Tx) -> Result<R, E>,
        E: From<StoreError>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;

        let mut working = state.clone();
        let result = f(&mut working)?;
        *state = working;
        Ok(result)
    }

    fn read<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&Self::Tx) -> Result<R, E>,
        E: From<StoreError>,
    {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        f(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use fulfil_core::{Aggregate, DomainError};
    use fulfil_sales::{CreateOrder, OrderCommand};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn seeded_lot(store: &InMemoryStore, item: StockItem, on: NaiveDate, quantity: i64) -> StockLotId {
        let lot = StockLot::receive(StockLotId::new(), item, on, quantity).unwrap();
        let lot_id = lot.id_typed();
        store
            .transaction(|tx| tx.receive_lot(lot))
            .unwrap();
        lot_id
    }

    #[test]
    fn available_lots_are_oldest_first_and_skip_fully_reserved() {
        let store = InMemoryStore::new();
        let item = StockItem::Product(ProductId::new());
        let lot_b = seeded_lot(&store, item, date(2024, 2, 1), 80);
        let lot_a = seeded_lot(&store, item, date(2024, 1, 1), 60);
        let lot_c = seeded_lot(&store, item, date(2023, 12, 1), 10);

        store
            .transaction(|tx| tx.reserve(lot_c, 10, ExpectedVersion::Any).map(|_| ()))
            .unwrap();

        let ids: Vec<_> = store
            .read(|tx| tx.available_lots(item))
            .unwrap()
            .iter()
            .map(StockLot::id_typed)
            .collect();
        assert_eq!(ids, vec![lot_a, lot_b]);
    }

    #[test]
    fn stale_lot_version_is_a_conflict() {
        let store = InMemoryStore::new();
        let lot_id = seeded_lot(&store, StockItem::Material(MaterialId::new()), date(2024, 1, 1), 30);

        let err = store
            .transaction(|tx| tx.reserve(lot_id, 5, ExpectedVersion::Exact(7)))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn failed_transaction_leaves_state_untouched() {
        let store = InMemoryStore::new();
        let lot_id = seeded_lot(&store, StockItem::Product(ProductId::new()), date(2024, 1, 1), 60);

        let result: Result<(), StoreError> = store.transaction(|tx| {
            tx.reserve(lot_id, 40, ExpectedVersion::Exact(1))?;
            // Over-reservation aborts the whole transaction.
            tx.reserve(lot_id, 40, ExpectedVersion::Any)?;
            Ok(())
        });
        assert!(matches!(
            result.unwrap_err(),
            StoreError::Domain(DomainError::InvariantViolation(_))
        ));

        let lot = store.read(|tx| tx.lot(lot_id)).unwrap();
        assert_eq!(lot.quantity_reserved(), 0);
        assert_eq!(lot.version(), 1);
    }

    #[test]
    fn save_order_checks_expected_version() {
        let store = InMemoryStore::new();
        let order_id = OrderId::new();
        let mut order = Order::empty(order_id);
        let events = order
            .handle(&OrderCommand::CreateOrder(CreateOrder {
                order_id,
                retailer_id: PartyId::new(),
                occurred_at: Utc::now(),
            }))
            .unwrap();
        order.apply(&events[0]);

        store
            .transaction(|tx| tx.save_order(order.clone(), ExpectedVersion::Exact(0)))
            .unwrap();
        let err = store
            .transaction(|tx| tx.save_order(order.clone(), ExpectedVersion::Exact(0)))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let loaded = store.read(|tx| tx.order(order_id)).unwrap();
        assert_eq!(loaded, order);
    }

    #[test]
    fn missing_records_are_not_found() {
        let store = InMemoryStore::new();
        let err = store.read(|tx| tx.product(ProductId::new())).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "product", .. }));
    }
}
