//! BOM resolver: product quantity → raw-material requirements netted against
//! current material availability.

use fulfil_core::{DomainError, MaterialId, ProductId};
use fulfil_infra::{Catalog, InventoryLedger};
use fulfil_inventory::{StockItem, available_quantity};
use fulfil_manufacturing::MaterialRequirement;

use crate::error::{FulfillmentError, FulfillmentResult};

/// Expand `quantity` units of `product_id` into material requirements.
///
/// Lines for the same material are merged before netting; output follows BOM
/// sequence (first occurrence). Availability is read fresh from the ledger.
pub fn expand<T>(tx: &T, product_id: ProductId, quantity: i64) -> FulfillmentResult<Vec<MaterialRequirement>>
where
    T: Catalog + InventoryLedger + ?Sized,
{
    if quantity < 0 {
        return Err(FulfillmentError::Validation(format!(
            "cannot expand negative quantity {quantity}"
        )));
    }

    let lines = tx.bom_lines(product_id)?;
    if lines.is_empty() {
        return Err(DomainError::no_bom(product_id).into());
    }

    let mut merged: Vec<(MaterialId, i64)> = Vec::with_capacity(lines.len());
    for line in &lines {
        let required = line.requirement_for(quantity)?;
        match merged.iter_mut().find(|(m, _)| *m == line.material_id()) {
            Some((_, total)) => {
                *total = total.checked_add(required).ok_or_else(|| {
                    FulfillmentError::Validation(format!(
                        "requirement for material {} exceeds the supported range",
                        line.material_id()
                    ))
                })?;
            }
            None => merged.push((line.material_id(), required)),
        }
    }

    merged
        .into_iter()
        .map(|(material_id, required)| -> FulfillmentResult<MaterialRequirement> {
            let material = tx.material(material_id)?;
            let lots = tx.lots_for(StockItem::Material(material_id))?;
            let available = available_quantity(&lots);
            Ok(MaterialRequirement::net(
                material_id,
                required,
                available,
                material.preferred_vendor_id(),
            )?)
        })
        .collect()
}
