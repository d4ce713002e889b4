use serde::{Deserialize, Serialize};

use fulfil_core::{DomainError, DomainResult, Entity, MaterialId, PartyId, ProductId};

/// Product status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    Active,
    Archived,
}

/// A finished good that retailers can order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    sku: String,
    name: String,
    status: ProductStatus,
}

impl Product {
    /// Create an orderable product.
    pub fn create(id: ProductId, sku: impl Into<String>, name: impl Into<String>) -> DomainResult<Self> {
        let sku = sku.into();
        let name = name.into();
        validate_sku_and_name(&sku, &name)?;
        Ok(Self {
            id,
            sku,
            name,
            status: ProductStatus::Active,
        })
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ProductStatus {
        self.status
    }

    /// Check if product can be ordered (must be Active).
    pub fn can_be_sold(&self) -> bool {
        self.status == ProductStatus::Active
    }

    pub fn archive(&mut self) -> DomainResult<()> {
        if self.status == ProductStatus::Archived {
            return Err(DomainError::invalid_state("product", self.status, "archive"));
        }
        self.status = ProductStatus::Archived;
        Ok(())
    }

    pub fn reactivate(&mut self) -> DomainResult<()> {
        if self.status == ProductStatus::Active {
            return Err(DomainError::invalid_state("product", self.status, "reactivate"));
        }
        self.status = ProductStatus::Active;
        Ok(())
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A raw material consumed by manufacturing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Material {
    id: MaterialId,
    sku: String,
    name: String,
    preferred_vendor_id: Option<PartyId>,
}

impl Material {
    pub fn create(
        id: MaterialId,
        sku: impl Into<String>,
        name: impl Into<String>,
        preferred_vendor_id: Option<PartyId>,
    ) -> DomainResult<Self> {
        let sku = sku.into();
        let name = name.into();
        validate_sku_and_name(&sku, &name)?;
        Ok(Self {
            id,
            sku,
            name,
            preferred_vendor_id,
        })
    }

    pub fn id_typed(&self) -> MaterialId {
        self.id
    }

    pub fn sku(&self) -> &str {
        &self.sku
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preferred_vendor_id(&self) -> Option<PartyId> {
        self.preferred_vendor_id
    }

    pub fn set_preferred_vendor(&mut self, vendor_id: Option<PartyId>) {
        self.preferred_vendor_id = vendor_id;
    }
}

impl Entity for Material {
    type Id = MaterialId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_sku_and_name(sku: &str, name: &str) -> DomainResult<()> {
    if sku.trim().is_empty() {
        return Err(DomainError::validation("sku cannot be empty"));
    }
    if name.trim().is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    Ok(())
}
