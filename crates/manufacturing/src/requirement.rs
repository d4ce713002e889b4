use serde::{Deserialize, Serialize};

use fulfil_core::{DomainError, DomainResult, MaterialId, PartyId, ValueObject};

/// Material need of one manufacturing order, netted against availability at
/// the moment it was computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRequirement {
    pub material_id: MaterialId,
    pub quantity_required: i64,
    pub quantity_available: i64,
    pub quantity_short: i64,
    pub preferred_vendor_id: Option<PartyId>,
}

impl MaterialRequirement {
    /// `short = max(0, required - available)`.
    pub fn net(
        material_id: MaterialId,
        quantity_required: i64,
        quantity_available: i64,
        preferred_vendor_id: Option<PartyId>,
    ) -> DomainResult<Self> {
        if quantity_required < 0 || quantity_available < 0 {
            return Err(DomainError::validation(
                "material quantities cannot be negative",
            ));
        }
        Ok(Self {
            material_id,
            quantity_required,
            quantity_available,
            quantity_short: (quantity_required - quantity_available).max(0),
            preferred_vendor_id,
        })
    }

    pub fn is_short(&self) -> bool {
        self.quantity_short > 0
    }
}

impl ValueObject for MaterialRequirement {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn short_is_clamped_at_zero() {
        let covered = MaterialRequirement::net(MaterialId::new(), 10, 30, None).unwrap();
        assert_eq!(covered.quantity_short, 0);
        assert!(!covered.is_short());

        let short = MaterialRequirement::net(MaterialId::new(), 80, 30, None).unwrap();
        assert_eq!(short.quantity_short, 50);
    }

    #[test]
    fn negative_quantities_are_rejected() {
        assert!(MaterialRequirement::net(MaterialId::new(), -1, 0, None).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: available + short always covers what is required, and
        /// short never exceeds it.
        #[test]
        fn netting_covers_requirement(required in 0i64..10_000, available in 0i64..10_000) {
            let req = MaterialRequirement::net(MaterialId::new(), required, available, None).unwrap();
            prop_assert!(req.quantity_short >= 0);
            prop_assert!(req.quantity_short <= required);
            prop_assert!(req.quantity_available + req.quantity_short >= required);
        }
    }
}
