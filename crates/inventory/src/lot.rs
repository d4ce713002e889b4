use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use fulfil_core::{DomainError, DomainResult, Entity, MaterialId, ProductId, StockLotId, ValueObject};

/// What a lot physically holds: a finished product or a raw material.
///
/// Both kinds share the same ledger and the same availability rules.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum StockItem {
    Product(ProductId),
    Material(MaterialId),
}

/// Stock lot status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotStatus {
    Available,
    /// Held back (quality hold); not allocatable, not counted as available.
    Quarantined,
    /// On-hand reached zero through consumption.
    Depleted,
}

/// Ledger mutation kinds, used as audit actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerAction {
    Received,
    Reserved,
    Released,
    Consumed,
    Quarantined,
    QuarantineLifted,
}

impl LedgerAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerAction::Received => "inventory.lot.received",
            LedgerAction::Reserved => "inventory.lot.reserved",
            LedgerAction::Released => "inventory.lot.released",
            LedgerAction::Consumed => "inventory.lot.consumed",
            LedgerAction::Quarantined => "inventory.lot.quarantined",
            LedgerAction::QuarantineLifted => "inventory.lot.quarantine_lifted",
        }
    }
}

/// One reservation held by an order line against one lot.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRecord {
    pub lot_id: StockLotId,
    pub quantity: i64,
}

impl ValueObject for AllocationRecord {}

/// A physical lot of on-hand inventory.
///
/// Invariant: `0 <= quantity_reserved <= quantity_on_hand`. Every mutation is a
/// relative change validated against the current values and bumps `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLot {
    id: StockLotId,
    item: StockItem,
    /// FIFO ordering key: production or receipt date.
    fifo_date: NaiveDate,
    quantity_on_hand: i64,
    quantity_reserved: i64,
    status: LotStatus,
    version: u64,
}

impl StockLot {
    /// Register a newly produced or received lot.
    pub fn receive(
        id: StockLotId,
        item: StockItem,
        fifo_date: NaiveDate,
        quantity: i64,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::validation("lot quantity must be positive"));
        }

        Ok(Self {
            id,
            item,
            fifo_date,
            quantity_on_hand: quantity,
            quantity_reserved: 0,
            status: LotStatus::Available,
            version: 1,
        })
    }

    pub fn id_typed(&self) -> StockLotId {
        self.id
    }

    pub fn item(&self) -> StockItem {
        self.item
    }

    pub fn fifo_date(&self) -> NaiveDate {
        self.fifo_date
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn quantity_reserved(&self) -> i64 {
        self.quantity_reserved
    }

    pub fn status(&self) -> LotStatus {
        self.status
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Unreserved on-hand quantity.
    pub fn available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    /// Whether the allocator may reserve against this lot.
    pub fn is_allocatable(&self) -> bool {
        self.status == LotStatus::Available && self.available() > 0
    }

    /// FIFO sort key. Ties on date are broken by lot id.
    pub fn fifo_key(&self) -> (NaiveDate, StockLotId) {
        (self.fifo_date, self.id)
    }

    /// Hold `quantity` for an order line.
    pub fn reserve(&mut self, quantity: i64) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if self.status != LotStatus::Available {
            return Err(DomainError::invalid_state("stock lot", self.status, "reserve"));
        }
        if quantity > self.available() {
            return Err(DomainError::invariant(format!(
                "reservation of {quantity} exceeds available {} on lot {}",
                self.available(),
                self.id
            )));
        }

        self.quantity_reserved += quantity;
        self.version += 1;
        Ok(())
    }

    /// Give back a reservation (order cancelled).
    pub fn release(&mut self, quantity: i64) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if quantity > self.quantity_reserved {
            return Err(DomainError::invariant(format!(
                "release of {quantity} exceeds reserved {} on lot {}",
                self.quantity_reserved, self.id
            )));
        }

        self.quantity_reserved -= quantity;
        self.version += 1;
        Ok(())
    }

    /// Ship reserved stock: decrements both on-hand and reserved.
    pub fn consume(&mut self, quantity: i64) -> DomainResult<()> {
        ensure_positive(quantity)?;
        if quantity > self.quantity_reserved {
            return Err(DomainError::invariant(format!(
                "consumption of {quantity} exceeds reserved {} on lot {}",
                self.quantity_reserved, self.id
            )));
        }

        self.quantity_on_hand -= quantity;
        self.quantity_reserved -= quantity;
        if self.quantity_on_hand == 0 {
            self.status = LotStatus::Depleted;
        }
        self.version += 1;
        Ok(())
    }

    /// Put the lot on quality hold. Existing reservations stay in place.
    pub fn quarantine(&mut self) -> DomainResult<()> {
        if self.status != LotStatus::Available {
            return Err(DomainError::invalid_state("stock lot", self.status, "quarantine"));
        }
        self.status = LotStatus::Quarantined;
        self.version += 1;
        Ok(())
    }

    /// Lift a quality hold.
    pub fn lift_quarantine(&mut self) -> DomainResult<()> {
        if self.status != LotStatus::Quarantined {
            return Err(DomainError::invalid_state("stock lot", self.status, "lift quarantine on"));
        }
        self.status = LotStatus::Available;
        self.version += 1;
        Ok(())
    }
}

impl Entity for StockLot {
    type Id = StockLotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn ensure_positive(quantity: i64) -> DomainResult<()> {
    if quantity <= 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

/// Sort lots oldest first (date, then lot id).
pub fn sort_fifo(lots: &mut [StockLot]) {
    lots.sort_by_key(StockLot::fifo_key);
}

/// Sum of unreserved on-hand across the allocatable lots, saturating at
/// `i64::MAX`.
pub fn available_quantity<'a>(lots: impl IntoIterator<Item = &'a StockLot>) -> i64 {
    lots.into_iter()
        .filter(|l| l.is_allocatable())
        .fold(0i64, |acc, l| acc.saturating_add(l.available()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn widget_lot(quantity: i64) -> StockLot {
        StockLot::receive(
            StockLotId::new(),
            StockItem::Product(ProductId::new()),
            date(2024, 1, 1),
            quantity,
        )
        .unwrap()
    }

    #[test]
    fn receive_rejects_non_positive_quantity() {
        let err = StockLot::receive(
            StockLotId::new(),
            StockItem::Material(MaterialId::new()),
            date(2024, 1, 1),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn available_quantity_saturates_instead_of_overflowing() {
        let lots = [widget_lot(i64::MAX), widget_lot(10)];
        assert_eq!(available_quantity(&lots), i64::MAX);
    }

    #[test]
    fn reserve_then_release_restores_availability() {
        let mut lot = widget_lot(60);
        lot.reserve(40).unwrap();
        assert_eq!(lot.quantity_reserved(), 40);
        assert_eq!(lot.available(), 20);

        lot.release(40).unwrap();
        assert_eq!(lot.quantity_reserved(), 0);
        assert_eq!(lot.available(), 60);
        assert_eq!(lot.version(), 3);
    }

    #[test]
    fn reserve_beyond_available_is_rejected() {
        let mut lot = widget_lot(10);
        lot.reserve(8).unwrap();
        let err = lot.reserve(3).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
        assert_eq!(lot.quantity_reserved(), 8);
    }

    #[test]
    fn consume_decrements_on_hand_and_reserved() {
        let mut lot = widget_lot(60);
        lot.reserve(60).unwrap();
        lot.consume(25).unwrap();
        assert_eq!(lot.quantity_on_hand(), 35);
        assert_eq!(lot.quantity_reserved(), 35);
        assert_eq!(lot.status(), LotStatus::Available);

        lot.consume(35).unwrap();
        assert_eq!(lot.quantity_on_hand(), 0);
        assert_eq!(lot.status(), LotStatus::Depleted);
        assert!(!lot.is_allocatable());
    }

    #[test]
    fn consume_requires_a_reservation() {
        let mut lot = widget_lot(60);
        let err = lot.consume(1).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn quarantined_lot_is_not_allocatable_but_can_release() {
        let mut lot = widget_lot(10);
        lot.reserve(4).unwrap();
        lot.quarantine().unwrap();

        assert!(!lot.is_allocatable());
        assert!(matches!(
            lot.reserve(1).unwrap_err(),
            DomainError::InvalidState { .. }
        ));
        lot.release(4).unwrap();
        lot.lift_quarantine().unwrap();
        assert!(lot.is_allocatable());
    }

    #[test]
    fn fifo_sort_breaks_date_ties_by_lot_id() {
        let item = StockItem::Product(ProductId::new());
        let id = |n: u128| StockLotId::from_uuid(uuid::Uuid::from_u128(n));
        let mut lots = vec![
            StockLot::receive(id(3), item, date(2024, 2, 1), 5).unwrap(),
            StockLot::receive(id(2), item, date(2024, 1, 1), 5).unwrap(),
            StockLot::receive(id(1), item, date(2024, 1, 1), 5).unwrap(),
        ];

        sort_fifo(&mut lots);
        let order: Vec<_> = lots.iter().map(|l| l.id_typed()).collect();
        assert_eq!(order, vec![id(1), id(2), id(3)]);
    }

    #[test]
    fn available_quantity_ignores_quarantined_lots() {
        let mut held = widget_lot(50);
        held.quarantine().unwrap();
        let mut open = widget_lot(30);
        open.reserve(10).unwrap();

        assert_eq!(available_quantity([&held, &open]), 20);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(i64),
        Release(i64),
        Consume(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1i64..50).prop_map(Op::Reserve),
            (1i64..50).prop_map(Op::Release),
            (1i64..50).prop_map(Op::Consume),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: no sequence of ledger primitives can break
        /// `0 <= reserved <= on_hand`; rejected operations leave the lot untouched.
        #[test]
        fn reserved_stays_within_on_hand(
            on_hand in 1i64..200,
            ops in prop::collection::vec(op(), 0..40)
        ) {
            let mut lot = widget_lot(on_hand);
            for op in ops {
                let before = lot.clone();
                let result = match op {
                    Op::Reserve(q) => lot.reserve(q),
                    Op::Release(q) => lot.release(q),
                    Op::Consume(q) => lot.consume(q),
                };
                if result.is_err() {
                    prop_assert_eq!(&lot, &before);
                }
                prop_assert!(lot.quantity_reserved() >= 0);
                prop_assert!(lot.quantity_reserved() <= lot.quantity_on_hand());
            }
        }
    }
}
