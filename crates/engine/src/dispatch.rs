//! Command execution against an in-transaction aggregate.
//!
//! ```text
//! Command
//!   ↓
//! 1. Decide: aggregate.handle(command) (pure, produces events)
//!   ↓
//! 2. Apply each event, evolving state and version
//!   ↓
//! 3. Buffer one audit record per event (state before, state after)
//! ```
//!
//! Persisting the aggregate (with its version check) is left to the caller,
//! which knows the repository and the version it loaded.

use serde::Serialize;
use uuid::Uuid;

use fulfil_core::{Aggregate, AggregateRoot, DomainError};
use fulfil_events::Event;

use crate::audit::AuditBuffer;
use crate::error::FulfillmentResult;

pub(crate) fn execute<A>(
    aggregate: &mut A,
    entity_type: &'static str,
    command: A::Command,
    audit: &mut AuditBuffer,
) -> FulfillmentResult<Vec<A::Event>>
where
    A: Aggregate<Error = DomainError> + Clone + Serialize,
    A::Event: Event + Serialize,
    <A as AggregateRoot>::Id: Copy + Into<Uuid>,
{
    let events = aggregate.handle(&command)?;

    let entity_id: Uuid = (*aggregate.id()).into();
    for event in &events {
        let before = (aggregate.version() > 0).then(|| aggregate.clone());
        aggregate.apply(event);
        audit.event(entity_type, entity_id, event, before.as_ref(), &*aggregate);
    }

    Ok(events)
}
