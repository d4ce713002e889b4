//! Shortage cascade.
//!
//! A pipeline of typed stages, each usable on its own:
//!
//! 1. [`derive_manufacturing`]: one planned manufacturing order per short
//!    product, with its BOM requirements netted against material stock.
//! 2. [`aggregate_materials`]: material shortfall summed per material across
//!    every manufacturing order of the run.
//! 3. [`group_by_vendor`]: aggregated shortfall split by preferred vendor;
//!    materials nobody can supply are reported as unresolved.
//!
//! [`resolve`] runs all three and persists the resulting documents.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use fulfil_core::{
    ExpectedVersion, ManufacturingOrderId, MaterialId, OrderId, PartyId, ProductId,
    PurchaseOrderId,
};
use fulfil_infra::{
    Catalog, InventoryLedger, ManufacturingRepository, PurchasingRepository, Transaction,
};
use fulfil_manufacturing::{
    ManufacturingOrder, ManufacturingOrderCommand, MaterialRequirement, PlanManufacturingOrder,
};
use fulfil_parties::PartyKind;
use fulfil_purchasing::{PurchaseOrder, PurchaseOrderCommand, RaisePurchaseOrder};

use crate::audit::AuditBuffer;
use crate::bom::expand;
use crate::dispatch::execute;
use crate::error::{FulfillmentError, FulfillmentResult};

/// Unmet finished-goods demand for one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortageEntry {
    pub product_id: ProductId,
    pub short_quantity: i64,
    pub source_order_ids: BTreeSet<OrderId>,
}

/// Stage 1 output: a manufacturing order not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedManufacturing {
    pub product_id: ProductId,
    pub quantity: i64,
    pub source_order_ids: BTreeSet<OrderId>,
    pub requirements: Vec<MaterialRequirement>,
}

/// Stage 2 output: run-wide shortfall of one material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialShortage {
    pub material_id: MaterialId,
    pub quantity_short: i64,
    pub preferred_vendor_id: Option<PartyId>,
    pub source_manufacturing_order_ids: BTreeSet<ManufacturingOrderId>,
}

/// Stage 3 output: everything to buy from one vendor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorBatch {
    pub vendor_id: PartyId,
    pub lines: Vec<(MaterialId, i64)>,
    pub source_manufacturing_order_ids: BTreeSet<ManufacturingOrderId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoPreferredVendor,
    VendorSuspended,
}

/// Material shortfall no purchase order was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedShortage {
    pub material_id: MaterialId,
    pub quantity_short: i64,
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CascadeOutcome {
    pub manufacturing_order_ids: Vec<ManufacturingOrderId>,
    pub purchase_order_ids: Vec<PurchaseOrderId>,
    pub unresolved_materials: Vec<UnresolvedShortage>,
    /// Short products without an active BOM (only when those are tolerated).
    pub unplanned_products: Vec<ProductId>,
}

/// Stage 1: plan one manufacturing order per short product.
///
/// Entries with nothing short are skipped. A product without an active BOM
/// fails the stage unless `fail_on_missing_bom` is false, in which case it is
/// returned in the second list.
pub fn derive_manufacturing<T>(
    tx: &T,
    shortages: &[ShortageEntry],
    fail_on_missing_bom: bool,
) -> FulfillmentResult<(Vec<PlannedManufacturing>, Vec<ProductId>)>
where
    T: Catalog + InventoryLedger + ?Sized,
{
    let mut planned = Vec::with_capacity(shortages.len());
    let mut unplanned = Vec::new();

    for entry in shortages.iter().filter(|e| e.short_quantity > 0) {
        match expand(tx, entry.product_id, entry.short_quantity) {
            Ok(requirements) => planned.push(PlannedManufacturing {
                product_id: entry.product_id,
                quantity: entry.short_quantity,
                source_order_ids: entry.source_order_ids.clone(),
                requirements,
            }),
            Err(FulfillmentError::NoBomDefined { .. }) if !fail_on_missing_bom => {
                warn!(
                    product_id = %entry.product_id,
                    short = entry.short_quantity,
                    "short product has no BOM; left unplanned"
                );
                unplanned.push(entry.product_id);
            }
            Err(err) => return Err(err),
        }
    }

    Ok((planned, unplanned))
}

/// Stage 2: sum `quantity_short` per material across manufacturing orders.
///
/// Materials with no shortfall are left out. Output follows first appearance.
/// A total beyond `i64` is a `Validation` error.
pub fn aggregate_materials(orders: &[ManufacturingOrder]) -> FulfillmentResult<Vec<MaterialShortage>> {
    let mut aggregated: Vec<MaterialShortage> = Vec::new();

    for mo in orders {
        for req in mo.requirements().iter().filter(|r| r.is_short()) {
            match aggregated.iter_mut().find(|a| a.material_id == req.material_id) {
                Some(existing) => {
                    existing.quantity_short = existing
                        .quantity_short
                        .checked_add(req.quantity_short)
                        .ok_or_else(|| {
                            FulfillmentError::Validation(format!(
                                "shortage of material {} exceeds the supported range",
                                req.material_id
                            ))
                        })?;
                    existing.source_manufacturing_order_ids.insert(mo.id_typed());
                    if existing.preferred_vendor_id.is_none() {
                        existing.preferred_vendor_id = req.preferred_vendor_id;
                    }
                }
                None => aggregated.push(MaterialShortage {
                    material_id: req.material_id,
                    quantity_short: req.quantity_short,
                    preferred_vendor_id: req.preferred_vendor_id,
                    source_manufacturing_order_ids: BTreeSet::from([mo.id_typed()]),
                }),
            }
        }
    }

    Ok(aggregated)
}

/// Stage 3: one batch per preferred vendor, one line per material.
///
/// A material without a preferred vendor, or whose vendor is suspended, is
/// unresolved. A vendor reference to a missing party is `NotFound`.
pub fn group_by_vendor<C>(
    catalog: &C,
    shortages: &[MaterialShortage],
) -> FulfillmentResult<(Vec<VendorBatch>, Vec<UnresolvedShortage>)>
where
    C: Catalog + ?Sized,
{
    let mut batches: Vec<VendorBatch> = Vec::new();
    let mut unresolved = Vec::new();

    for shortage in shortages {
        let Some(vendor_id) = shortage.preferred_vendor_id else {
            unresolved.push(UnresolvedShortage {
                material_id: shortage.material_id,
                quantity_short: shortage.quantity_short,
                reason: UnresolvedReason::NoPreferredVendor,
            });
            continue;
        };

        let vendor = catalog.party(vendor_id)?;
        if vendor.kind() != PartyKind::Vendor {
            return Err(FulfillmentError::Validation(format!(
                "preferred vendor {vendor_id} of material {} is not a vendor",
                shortage.material_id
            )));
        }
        if !vendor.can_transact() {
            unresolved.push(UnresolvedShortage {
                material_id: shortage.material_id,
                quantity_short: shortage.quantity_short,
                reason: UnresolvedReason::VendorSuspended,
            });
            continue;
        }

        let batch = match batches.iter().position(|b| b.vendor_id == vendor_id) {
            Some(idx) => &mut batches[idx],
            None => {
                batches.push(VendorBatch {
                    vendor_id,
                    lines: Vec::new(),
                    source_manufacturing_order_ids: BTreeSet::new(),
                });
                let last = batches.len() - 1;
                &mut batches[last]
            }
        };
        batch.lines.push((shortage.material_id, shortage.quantity_short));
        batch
            .source_manufacturing_order_ids
            .extend(shortage.source_manufacturing_order_ids.iter().copied());
    }

    Ok((batches, unresolved))
}

/// Run the whole cascade for one batch of shortages and persist the
/// manufacturing and purchase orders it produces.
pub fn resolve<T>(
    tx: &mut T,
    shortages: &[ShortageEntry],
    fail_on_missing_bom: bool,
    now: DateTime<Utc>,
    audit: &mut AuditBuffer,
) -> FulfillmentResult<CascadeOutcome>
where
    T: Transaction + ?Sized,
{
    let (planned, unplanned_products) = derive_manufacturing(&*tx, shortages, fail_on_missing_bom)?;

    let mut manufacturing_orders = Vec::with_capacity(planned.len());
    for plan in planned {
        let id = ManufacturingOrderId::new();
        let mut mo = ManufacturingOrder::empty(id);
        execute(
            &mut mo,
            "manufacturing.order",
            ManufacturingOrderCommand::Plan(PlanManufacturingOrder {
                manufacturing_order_id: id,
                product_id: plan.product_id,
                quantity: plan.quantity,
                source_order_ids: plan.source_order_ids,
                requirements: plan.requirements,
                occurred_at: now,
            }),
            audit,
        )?;
        tx.save_manufacturing_order(mo.clone(), ExpectedVersion::Exact(0))?;
        debug!(
            manufacturing_order_id = %id,
            product_id = %plan.product_id,
            quantity = plan.quantity,
            "manufacturing order planned"
        );
        manufacturing_orders.push(mo);
    }

    let materials = aggregate_materials(&manufacturing_orders)?;
    let (batches, unresolved_materials) = group_by_vendor(&*tx, &materials)?;

    let mut purchase_order_ids = Vec::with_capacity(batches.len());
    for batch in batches {
        let id = PurchaseOrderId::new();
        let mut po = PurchaseOrder::empty(id);
        execute(
            &mut po,
            "purchasing.order",
            PurchaseOrderCommand::Raise(RaisePurchaseOrder {
                purchase_order_id: id,
                vendor_id: batch.vendor_id,
                lines: batch.lines,
                source_manufacturing_order_ids: batch.source_manufacturing_order_ids,
                occurred_at: now,
            }),
            audit,
        )?;
        tx.save_purchase_order(po, ExpectedVersion::Exact(0))?;
        debug!(purchase_order_id = %id, vendor_id = %batch.vendor_id, "purchase order raised");
        purchase_order_ids.push(id);
    }

    for material in &unresolved_materials {
        warn!(
            material_id = %material.material_id,
            quantity_short = material.quantity_short,
            reason = ?material.reason,
            "material shortage has no purchasable vendor"
        );
    }

    let outcome = CascadeOutcome {
        manufacturing_order_ids: manufacturing_orders.iter().map(ManufacturingOrder::id_typed).collect(),
        purchase_order_ids,
        unresolved_materials,
        unplanned_products,
    };
    info!(
        manufacturing_orders = outcome.manufacturing_order_ids.len(),
        purchase_orders = outcome.purchase_order_ids.len(),
        unresolved = outcome.unresolved_materials.len(),
        unplanned = outcome.unplanned_products.len(),
        "shortage cascade resolved"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fulfil_core::Aggregate;
    use fulfil_infra::{FulfillmentStore, InMemoryStore, StoreError};
    use fulfil_parties::Party;
    use fulfil_products::{BomLine, Material};

    fn planned_mo(requirements: Vec<MaterialRequirement>) -> ManufacturingOrder {
        let id = ManufacturingOrderId::new();
        let mut mo = ManufacturingOrder::empty(id);
        let events = mo
            .handle(&ManufacturingOrderCommand::Plan(PlanManufacturingOrder {
                manufacturing_order_id: id,
                product_id: ProductId::new(),
                quantity: 5,
                source_order_ids: BTreeSet::from([OrderId::new()]),
                requirements,
                occurred_at: Utc::now(),
            }))
            .unwrap();
        mo.apply(&events[0]);
        mo
    }

    fn short(material_id: MaterialId, quantity: i64, vendor: Option<PartyId>) -> MaterialRequirement {
        MaterialRequirement::net(material_id, quantity, 0, vendor).unwrap()
    }

    #[test]
    fn aggregation_sums_across_manufacturing_orders() {
        let m = MaterialId::new();
        let vendor = PartyId::new();
        let first = planned_mo(vec![short(m, 5, Some(vendor))]);
        let second = planned_mo(vec![short(m, 5, Some(vendor))]);

        let aggregated = aggregate_materials(&[first.clone(), second.clone()]).unwrap();

        assert_eq!(aggregated.len(), 1);
        assert_eq!(aggregated[0].quantity_short, 10);
        assert_eq!(
            aggregated[0].source_manufacturing_order_ids,
            BTreeSet::from([first.id_typed(), second.id_typed()])
        );
    }

    #[test]
    fn aggregation_skips_covered_materials() {
        let covered = MaterialRequirement::net(MaterialId::new(), 10, 50, None).unwrap();
        let aggregated = aggregate_materials(&[planned_mo(vec![covered])]).unwrap();
        assert!(aggregated.is_empty());
    }

    #[test]
    fn aggregation_rejects_totals_beyond_range() {
        let m = MaterialId::new();
        let first = planned_mo(vec![short(m, i64::MAX, None)]);
        let second = planned_mo(vec![short(m, 1, None)]);

        let err = aggregate_materials(&[first, second]).unwrap_err();
        assert!(matches!(err, FulfillmentError::Validation(_)));
    }

    fn seed_party(store: &InMemoryStore, party: Party) -> PartyId {
        let id = party.id_typed();
        store.transaction(|tx| tx.put_party(party)).unwrap();
        id
    }

    fn shortage(material_id: MaterialId, quantity: i64, vendor: Option<PartyId>) -> MaterialShortage {
        MaterialShortage {
            material_id,
            quantity_short: quantity,
            preferred_vendor_id: vendor,
            source_manufacturing_order_ids: BTreeSet::from([ManufacturingOrderId::new()]),
        }
    }

    #[test]
    fn grouping_puts_one_vendor_on_one_batch() {
        let store = InMemoryStore::new();
        let acme = seed_party(&store, Party::vendor(PartyId::new(), "Acme").unwrap());
        let globex = seed_party(&store, Party::vendor(PartyId::new(), "Globex").unwrap());
        let (steel, paint, glue) = (MaterialId::new(), MaterialId::new(), MaterialId::new());

        let (batches, unresolved) = store
            .read(|tx| {
                group_by_vendor(
                    tx,
                    &[
                        shortage(steel, 50, Some(acme)),
                        shortage(paint, 7, Some(globex)),
                        shortage(glue, 3, Some(acme)),
                    ],
                )
            })
            .unwrap();

        assert!(unresolved.is_empty());
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].vendor_id, acme);
        assert_eq!(batches[0].lines, vec![(steel, 50), (glue, 3)]);
        assert_eq!(batches[0].source_manufacturing_order_ids.len(), 2);
        assert_eq!(batches[1].lines, vec![(paint, 7)]);
    }

    #[test]
    fn grouping_reports_missing_and_suspended_vendors() {
        let store = InMemoryStore::new();
        let mut suspended = Party::vendor(PartyId::new(), "Initech").unwrap();
        suspended.suspend().unwrap();
        let initech = seed_party(&store, suspended);
        let (steel, paint) = (MaterialId::new(), MaterialId::new());

        let (batches, unresolved) = store
            .read(|tx| group_by_vendor(tx, &[shortage(steel, 5, None), shortage(paint, 2, Some(initech))]))
            .unwrap();

        assert!(batches.is_empty());
        assert_eq!(
            unresolved,
            vec![
                UnresolvedShortage {
                    material_id: steel,
                    quantity_short: 5,
                    reason: UnresolvedReason::NoPreferredVendor,
                },
                UnresolvedShortage {
                    material_id: paint,
                    quantity_short: 2,
                    reason: UnresolvedReason::VendorSuspended,
                },
            ]
        );
    }

    #[test]
    fn grouping_rejects_dangling_vendor_reference() {
        let store = InMemoryStore::new();
        let err = store
            .read(|tx| group_by_vendor(tx, &[shortage(MaterialId::new(), 1, Some(PartyId::new()))]))
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NotFound { entity: "party", .. }));
    }

    #[test]
    fn derive_tolerates_missing_bom_when_configured() {
        let store = InMemoryStore::new();
        let entry = ShortageEntry {
            product_id: ProductId::new(),
            short_quantity: 4,
            source_order_ids: BTreeSet::from([OrderId::new()]),
        };

        let err = store
            .read(|tx| derive_manufacturing(tx, std::slice::from_ref(&entry), true))
            .unwrap_err();
        assert!(matches!(err, FulfillmentError::NoBomDefined { .. }));

        let (planned, unplanned) = store
            .read(|tx| derive_manufacturing(tx, std::slice::from_ref(&entry), false))
            .unwrap();
        assert!(planned.is_empty());
        assert_eq!(unplanned, vec![entry.product_id]);
    }

    #[test]
    fn resolve_persists_documents_with_provenance() {
        let store = InMemoryStore::new();
        let vendor = seed_party(&store, Party::vendor(PartyId::new(), "Acme").unwrap());
        let widget = ProductId::new();
        let m = MaterialId::new();
        store
            .transaction(|tx| {
                tx.put_material(Material::create(m, "M-1", "Steel", Some(vendor))?)?;
                tx.put_bom_line(BomLine::new(widget, m, 2, 1)?)?;
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let order_id = OrderId::new();
        let mut audit = AuditBuffer::caused_by(order_id);
        let outcome = store
            .transaction(|tx| {
                resolve(
                    tx,
                    &[ShortageEntry {
                        product_id: widget,
                        short_quantity: 40,
                        source_order_ids: BTreeSet::from([order_id]),
                    }],
                    true,
                    Utc::now(),
                    &mut audit,
                )
            })
            .unwrap();

        assert_eq!(outcome.manufacturing_order_ids.len(), 1);
        assert_eq!(outcome.purchase_order_ids.len(), 1);
        assert_eq!(audit.len(), 2);

        let mo = store
            .read(|tx| tx.manufacturing_order(outcome.manufacturing_order_ids[0]))
            .unwrap();
        assert!(mo.source_order_ids().contains(&order_id));

        let po = store
            .read(|tx| tx.purchase_order(outcome.purchase_order_ids[0]))
            .unwrap();
        assert_eq!(po.vendor_id(), Some(vendor));
        assert_eq!(po.quantity_for(m), 80);
        assert!(po.source_manufacturing_order_ids().contains(&mo.id_typed()));
    }
}
