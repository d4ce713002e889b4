//! In-memory audit sink for tests/dev.

use std::sync::Mutex;

use thiserror::Error;
use uuid::Uuid;

use crate::record::AuditRecord;
use crate::sink::AuditSink;

#[derive(Debug, Error)]
pub enum InMemorySinkError {
    /// Recording failed due to internal lock poisoning.
    #[error("audit sink lock poisoned")]
    Poisoned,
}

/// Collects every committed record, in publication order.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Records touching one entity, oldest first.
    pub fn for_entity(&self, entity_id: impl Into<Uuid>) -> Vec<AuditRecord> {
        let entity_id = entity_id.into();
        self.records()
            .into_iter()
            .filter(|r| r.entity_id() == entity_id)
            .collect()
    }

    pub fn actions(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| r.action().to_string())
            .collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    type Error = InMemorySinkError;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error> {
        let mut records = self.records.lock().map_err(|_| InMemorySinkError::Poisoned)?;
        records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn records_are_kept_in_publication_order() {
        let sink = InMemoryAuditSink::new();
        let lot = Uuid::now_v7();
        let other = Uuid::now_v7();

        sink.record(AuditRecord::new("inventory.lot", lot, "inventory.lot.reserved", Utc::now()))
            .unwrap();
        sink.record(AuditRecord::new("inventory.lot", other, "inventory.lot.reserved", Utc::now()))
            .unwrap();
        sink.record(AuditRecord::new("inventory.lot", lot, "inventory.lot.released", Utc::now()))
            .unwrap();

        assert_eq!(sink.records().len(), 3);
        let actions: Vec<_> = sink
            .for_entity(lot)
            .iter()
            .map(|r| r.action().to_string())
            .collect();
        assert_eq!(actions, vec!["inventory.lot.reserved", "inventory.lot.released"]);
    }
}
