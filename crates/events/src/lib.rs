//! Domain events and the audit boundary.
//!
//! Aggregates emit typed [`Event`]s; services translate each significant state
//! change into an [`AuditRecord`] and hand it to an [`AuditSink`] after the
//! surrounding transaction commits.

pub mod event;
pub mod record;
pub mod sink;
pub mod in_memory_sink;

pub use event::Event;
pub use in_memory_sink::{InMemoryAuditSink, InMemorySinkError};
pub use record::{AuditRecord, AuditRecordError};
pub use sink::{AuditSink, TracingAuditSink};
