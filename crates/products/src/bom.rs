//! Bill-of-materials lines: the per-unit material composition of a product.

use serde::{Deserialize, Serialize};

use fulfil_core::{DomainError, DomainResult, MaterialId, ProductId};

/// One component of a product's bill of materials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BomLine {
    product_id: ProductId,
    material_id: MaterialId,
    per_unit_quantity: i64,
    /// Position within the product's BOM; expansion output follows it.
    sequence: u32,
    active: bool,
}

impl BomLine {
    pub fn new(
        product_id: ProductId,
        material_id: MaterialId,
        per_unit_quantity: i64,
        sequence: u32,
    ) -> DomainResult<Self> {
        if per_unit_quantity <= 0 {
            return Err(DomainError::validation("per-unit quantity must be positive"));
        }
        Ok(Self {
            product_id,
            material_id,
            per_unit_quantity,
            sequence,
            active: true,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn material_id(&self) -> MaterialId {
        self.material_id
    }

    pub fn per_unit_quantity(&self) -> i64 {
        self.per_unit_quantity
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Material needed to build `quantity` units.
    pub fn requirement_for(&self, quantity: i64) -> DomainResult<i64> {
        self.per_unit_quantity
            .checked_mul(quantity)
            .ok_or_else(|| DomainError::validation("material requirement overflows"))
    }
}

/// Active lines of `product_id`, ordered by sequence.
pub fn active_lines<'a>(
    lines: impl IntoIterator<Item = &'a BomLine>,
    product_id: ProductId,
) -> Vec<&'a BomLine> {
    let mut active: Vec<&BomLine> = lines
        .into_iter()
        .filter(|l| l.product_id == product_id && l.active)
        .collect();
    active.sort_by_key(|l| (l.sequence, l.material_id));
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn non_positive_per_unit_quantity_is_rejected() {
        let err = BomLine::new(ProductId::new(), MaterialId::new(), 0, 1).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn active_lines_skip_inactive_and_foreign_lines() {
        let widget = ProductId::new();
        let gadget = ProductId::new();
        let steel = MaterialId::new();
        let paint = MaterialId::new();

        let mut retired = BomLine::new(widget, paint, 1, 1).unwrap();
        retired.deactivate();
        let lines = vec![
            BomLine::new(widget, steel, 2, 2).unwrap(),
            retired,
            BomLine::new(gadget, steel, 5, 1).unwrap(),
            BomLine::new(widget, paint, 3, 0).unwrap(),
        ];

        let active = active_lines(&lines, widget);
        let materials: Vec<_> = active.iter().map(|l| l.material_id()).collect();
        assert_eq!(materials, vec![paint, steel]);
    }

    proptest! {
        /// Property: requirement scales linearly with the ordered quantity.
        #[test]
        fn requirement_is_per_unit_times_quantity(per_unit in 1i64..1_000, quantity in 0i64..100_000) {
            let line = BomLine::new(ProductId::new(), MaterialId::new(), per_unit, 1).unwrap();
            prop_assert_eq!(line.requirement_for(quantity).unwrap(), per_unit * quantity);
        }
    }
}
