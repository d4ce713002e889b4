//! Per-operation audit buffering.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use fulfil_events::{AuditRecord, AuditRecordError, AuditSink, Event};
use fulfil_infra::LotChange;
use fulfil_inventory::{LedgerAction, StockLot};

/// Audit records collected while a transaction runs.
///
/// The buffer is built inside the transaction closure and handed to
/// [`AuditBuffer::publish`] only once the transaction has committed, so a
/// rolled-back operation never reaches the sink.
///
/// Auditing is best-effort: it never fails the operation it describes. A
/// record whose snapshot cannot be serialized is dropped, logged and counted
/// in [`AuditBuffer::dropped`]; a sink failure after commit is logged.
#[derive(Debug, Default)]
pub struct AuditBuffer {
    caused_by: Option<Uuid>,
    records: Vec<AuditRecord>,
    dropped: usize,
}

impl AuditBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer whose records all point back to `root` (usually an order).
    pub fn caused_by(root: impl Into<Uuid>) -> Self {
        Self {
            caused_by: Some(root.into()),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Records discarded because they could not be serialized.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// One ledger mutation with lot snapshots before and after.
    pub fn lot_change(&mut self, action: LedgerAction, change: &LotChange, at: DateTime<Utc>) {
        let lot = &change.after;
        let detail = serde_json::json!({
            "item": lot.item(),
            "quantity_on_hand": {
                "before": change.before.quantity_on_hand(),
                "after": lot.quantity_on_hand(),
            },
            "quantity_reserved": {
                "before": change.before.quantity_reserved(),
                "after": lot.quantity_reserved(),
            },
        });
        let record = AuditRecord::new("inventory.lot", lot.id_typed().into(), action.as_str(), at)
            .with_detail(detail)
            .with_before(&change.before)
            .and_then(|r| r.with_after(lot));
        self.push(record);
    }

    /// A newly booked lot.
    pub fn lot_received(&mut self, lot: &StockLot, at: DateTime<Utc>) {
        let detail = serde_json::json!({
            "item": lot.item(),
            "fifo_date": lot.fifo_date(),
            "quantity_on_hand": lot.quantity_on_hand(),
        });
        let record = AuditRecord::new(
            "inventory.lot",
            lot.id_typed().into(),
            LedgerAction::Received.as_str(),
            at,
        )
        .with_detail(detail)
        .with_after(lot);
        self.push(record);
    }

    /// A domain event applied to an aggregate, with optional state snapshots.
    pub fn event<E, T>(
        &mut self,
        entity_type: &'static str,
        entity_id: impl Into<Uuid>,
        event: &E,
        before: Option<&T>,
        after: &T,
    ) where
        E: Event + Serialize,
        T: Serialize,
    {
        let record = AuditRecord::from_event(entity_type, entity_id.into(), event).and_then(|r| {
            let r = match before {
                Some(before) => r.with_before(before)?,
                None => r,
            };
            r.with_after(after)
        });
        self.push(record);
    }

    fn push(&mut self, record: Result<AuditRecord, AuditRecordError>) {
        match record {
            Ok(record) => {
                let record = match self.caused_by {
                    Some(root) => record.caused_by(root),
                    None => record,
                };
                self.records.push(record);
            }
            Err(err) => {
                self.dropped += 1;
                warn!(error = %err, dropped = self.dropped, "dropping audit record that failed to serialize");
            }
        }
    }

    /// Hand every buffered record to the sink. Failures are logged; the
    /// operation they describe has already committed.
    pub fn publish<A: AuditSink + ?Sized>(self, sink: &A) {
        for record in self.records {
            let action = record.action().to_string();
            let entity_id = record.entity_id();
            if let Err(err) = sink.record(record) {
                warn!(%action, %entity_id, error = ?err, "audit publish failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use fulfil_core::{ProductId, StockLotId};
    use fulfil_events::InMemoryAuditSink;
    use fulfil_inventory::StockItem;
    use fulfil_sales::{OrderApproved, OrderEvent};
    use serde::Serializer;

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("snapshot unavailable"))
        }
    }

    #[test]
    fn unserializable_snapshot_is_dropped_and_counted() {
        let order_id = fulfil_core::OrderId::new();
        let event = OrderEvent::OrderApproved(OrderApproved {
            order_id,
            occurred_at: Utc::now(),
        });
        let mut buffer = AuditBuffer::new();

        buffer.event("sales.order", order_id, &event, None::<&Unserializable>, &Unserializable);

        assert!(buffer.is_empty());
        assert_eq!(buffer.dropped(), 1);
    }

    #[test]
    fn lot_change_records_before_and_after_quantities() {
        let before = StockLot::receive(
            StockLotId::new(),
            StockItem::Product(ProductId::new()),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            60,
        )
        .unwrap();
        let mut after = before.clone();
        after.reserve(60).unwrap();

        let order_id = Uuid::now_v7();
        let mut buffer = AuditBuffer::caused_by(order_id);
        buffer.lot_change(LedgerAction::Reserved, &LotChange { before, after }, Utc::now());

        let sink = InMemoryAuditSink::new();
        buffer.publish(&sink);

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action(), "inventory.lot.reserved");
        assert_eq!(records[0].caused_by_id(), Some(order_id));
        assert_eq!(records[0].detail()["quantity_reserved"]["after"], 60);
        assert_eq!(records[0].before().unwrap()["quantity_reserved"], 0);
    }
}
