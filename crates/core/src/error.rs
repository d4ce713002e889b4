//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invalid transitions, missing references, conflicts). Infrastructure concerns
/// belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (empty line set, non-positive quantity, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated (e.g. reserved would exceed on-hand).
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A lifecycle transition was attempted from a state that does not allow it.
    #[error("cannot {action} {entity} in status {status}")]
    InvalidState {
        entity: &'static str,
        status: String,
        action: &'static str,
    },

    /// A conflict occurred (duplicate artifact, stale version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A product has no active bill-of-materials lines.
    #[error("no bill of materials defined for product {product_id}")]
    NoBomDefined { product_id: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(
        entity: &'static str,
        status: impl core::fmt::Debug,
        action: &'static str,
    ) -> Self {
        Self::InvalidState {
            entity,
            status: format!("{status:?}"),
            action,
        }
    }

    pub fn no_bom(product_id: impl core::fmt::Display) -> Self {
        Self::NoBomDefined {
            product_id: product_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_message_names_entity_status_and_action() {
        #[derive(Debug)]
        enum Status {
            Shipped,
        }

        let err = DomainError::invalid_state("order", Status::Shipped, "cancel");
        assert_eq!(err.to_string(), "cannot cancel order in status Shipped");
    }

    #[test]
    fn not_found_carries_entity_and_id() {
        let err = DomainError::not_found("material", "m-1");
        assert_eq!(
            err,
            DomainError::NotFound {
                entity: "material",
                id: "m-1".to_string()
            }
        );
    }
}
