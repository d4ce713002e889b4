use thiserror::Error;

use fulfil_core::DomainError;
use fulfil_infra::StoreError;

/// Error surfaced by every engine operation.
///
/// Domain and store errors are folded into the fulfillment taxonomy so callers
/// match on one enum. Nothing is retried internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FulfillmentError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("cannot {action} {entity} in status {status}")]
    InvalidState {
        entity: &'static str,
        status: String,
        action: &'static str,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    /// Concurrent modification; re-invoking the operation is safe.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("no bill of materials defined for product {product_id}")]
    NoBomDefined { product_id: String },

    /// A ledger or document invariant would have been broken.
    #[error("invariant violated: {0}")]
    Invariant(String),

    #[error("store failure: {0}")]
    Store(String),
}

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

impl From<DomainError> for FulfillmentError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                FulfillmentError::Validation(msg)
            }
            DomainError::InvariantViolation(msg) => FulfillmentError::Invariant(msg),
            DomainError::NotFound { entity, id } => FulfillmentError::NotFound { entity, id },
            DomainError::InvalidState {
                entity,
                status,
                action,
            } => FulfillmentError::InvalidState {
                entity,
                status,
                action,
            },
            DomainError::Conflict(msg) => FulfillmentError::Conflict(msg),
            DomainError::NoBomDefined { product_id } => FulfillmentError::NoBomDefined { product_id },
        }
    }
}

impl From<StoreError> for FulfillmentError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => FulfillmentError::Conflict(msg),
            StoreError::NotFound { entity, id } => FulfillmentError::NotFound { entity, id },
            StoreError::Domain(err) => err.into(),
            StoreError::Poisoned => FulfillmentError::Store("store lock poisoned".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_wrapped_by_the_store_keep_their_kind() {
        let err: FulfillmentError =
            StoreError::Domain(DomainError::invalid_state("order", "Shipped", "cancel")).into();
        assert!(matches!(err, FulfillmentError::InvalidState { action: "cancel", .. }));
    }

    #[test]
    fn stale_versions_surface_as_conflict() {
        let err: FulfillmentError = StoreError::Conflict("lot moved".to_string()).into();
        assert_eq!(err, FulfillmentError::Conflict("lot moved".to_string()));
    }
}
