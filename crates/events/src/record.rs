use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use crate::event::Event;

#[derive(Debug, Error)]
pub enum AuditRecordError {
    #[error("failed to serialize audit snapshot: {0}")]
    Serialize(String),
}

/// Structured record of one state change, consumed by the external audit sink.
///
/// Carries before/after snapshots of the changed entity plus a free-form
/// `detail` object (quantities, counterparties, references) so the consumer can
/// render a human-readable summary without re-querying the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    record_id: Uuid,
    entity_type: String,
    entity_id: Uuid,
    action: String,
    occurred_at: DateTime<Utc>,

    /// The order (or other root) whose operation caused this change.
    caused_by: Option<Uuid>,

    before: Option<JsonValue>,
    after: Option<JsonValue>,
    detail: JsonValue,
}

impl AuditRecord {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: Uuid,
        action: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            record_id: Uuid::now_v7(),
            entity_type: entity_type.into(),
            entity_id,
            action: action.into(),
            occurred_at,
            caused_by: None,
            before: None,
            after: None,
            detail: JsonValue::Null,
        }
    }

    /// Build a record whose action and timestamp come from a domain event.
    ///
    /// The serialized event becomes the `detail` payload.
    pub fn from_event<E>(
        entity_type: impl Into<String>,
        entity_id: Uuid,
        event: &E,
    ) -> Result<Self, AuditRecordError>
    where
        E: Event + Serialize,
    {
        let detail = to_json(event)?;
        Ok(Self::new(entity_type, entity_id, event.event_type(), event.occurred_at()).with_detail(detail))
    }

    pub fn caused_by(mut self, root: impl Into<Uuid>) -> Self {
        self.caused_by = Some(root.into());
        self
    }

    pub fn with_detail(mut self, detail: JsonValue) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_before<T: Serialize>(mut self, value: &T) -> Result<Self, AuditRecordError> {
        self.before = Some(to_json(value)?);
        Ok(self)
    }

    pub fn with_after<T: Serialize>(mut self, value: &T) -> Result<Self, AuditRecordError> {
        self.after = Some(to_json(value)?);
        Ok(self)
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn caused_by_id(&self) -> Option<Uuid> {
        self.caused_by
    }

    pub fn before(&self) -> Option<&JsonValue> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&JsonValue> {
        self.after.as_ref()
    }

    pub fn detail(&self) -> &JsonValue {
        &self.detail
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<JsonValue, AuditRecordError> {
    serde_json::to_value(value).map_err(|e| AuditRecordError::Serialize(e.to_string()))
}
