//! Audit sink abstraction.
//!
//! The sink is the narrow interface to the external audit collaborator. It is
//! only ever called with records of changes that have already been committed.

use std::convert::Infallible;
use std::sync::Arc;

use tracing::info;

use crate::record::AuditRecord;

/// Destination for committed audit records.
///
/// Implementations must be safe to share across threads; publishing happens on
/// the thread that ran the operation.
pub trait AuditSink: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error>;
}

impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    type Error = S::Error;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error> {
        (**self).record(record)
    }
}

/// Sink that writes each record as a structured `tracing` event on the
/// `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    type Error = Infallible;

    fn record(&self, record: AuditRecord) -> Result<(), Self::Error> {
        info!(
            target: "audit",
            action = record.action(),
            entity_type = record.entity_type(),
            entity_id = %record.entity_id(),
            caused_by = ?record.caused_by_id(),
            detail = %record.detail(),
            "state change"
        );
        Ok(())
    }
}
