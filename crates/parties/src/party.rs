use serde::{Deserialize, Serialize};

use fulfil_core::{DomainError, DomainResult, Entity, PartyId};

/// Party kind: retailer (places orders) or vendor (supplies materials).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyKind {
    Retailer,
    Vendor,
}

/// Party status lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartyStatus {
    Active,
    Suspended,
}

/// A retailer or vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Party {
    id: PartyId,
    kind: PartyKind,
    name: String,
    status: PartyStatus,
}

impl Party {
    pub fn register(id: PartyId, kind: PartyKind, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("party name cannot be empty"));
        }
        Ok(Self {
            id,
            kind,
            name,
            status: PartyStatus::Active,
        })
    }

    pub fn retailer(id: PartyId, name: impl Into<String>) -> DomainResult<Self> {
        Self::register(id, PartyKind::Retailer, name)
    }

    pub fn vendor(id: PartyId, name: impl Into<String>) -> DomainResult<Self> {
        Self::register(id, PartyKind::Vendor, name)
    }

    pub fn id_typed(&self) -> PartyId {
        self.id
    }

    pub fn kind(&self) -> PartyKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> PartyStatus {
        self.status
    }

    /// Suspended parties cannot transact.
    pub fn can_transact(&self) -> bool {
        self.status == PartyStatus::Active
    }

    pub fn suspend(&mut self) -> DomainResult<()> {
        if self.status == PartyStatus::Suspended {
            return Err(DomainError::invalid_state("party", self.status, "suspend"));
        }
        self.status = PartyStatus::Suspended;
        Ok(())
    }

    pub fn reactivate(&mut self) -> DomainResult<()> {
        if self.status == PartyStatus::Active {
            return Err(DomainError::invalid_state("party", self.status, "reactivate"));
        }
        self.status = PartyStatus::Active;
        Ok(())
    }
}

impl Entity for Party {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rejects_blank_name() {
        let err = Party::vendor(PartyId::new(), "   ").unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn suspended_party_cannot_transact() {
        let mut vendor = Party::vendor(PartyId::new(), "Acme Metals").unwrap();
        assert!(vendor.can_transact());

        vendor.suspend().unwrap();
        assert!(!vendor.can_transact());
        assert!(matches!(
            vendor.suspend().unwrap_err(),
            DomainError::InvalidState { .. }
        ));

        vendor.reactivate().unwrap();
        assert!(vendor.can_transact());
    }
}
