//! Strongly-typed identifiers used across the domain.
//!
//! Every entity reference is a distinct newtype over [`Uuid`] so that a sale
//! id can never be passed where a lot id is expected.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

macro_rules! impl_uuid_newtype {
    ($t:ident, $name:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $t(Uuid);

        impl $t {
            /// Create a new identifier.
            ///
            /// Uses UUIDv7 (time-ordered). Prefer passing IDs explicitly in tests
            /// for determinism.
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// True for the all-zero identifier, which downstream event
            /// handling treats as "absent" rather than a parse error.
            pub fn is_nil(&self) -> bool {
                self.0.is_nil()
            }
        }

        impl Default for $t {
            fn default() -> Self {
                Self(Uuid::nil())
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $t {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$t> for Uuid {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = Uuid::from_str(s)
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Ok(Self(uuid))
            }
        }
    };
}

impl_uuid_newtype!(CampaignId, "CampaignId", "Identifier of a campaign (tenancy boundary for shop data).");
impl_uuid_newtype!(UserId, "UserId", "Identifier of an authenticated user (actor identity).");
impl_uuid_newtype!(CustomerId, "CustomerId", "Identifier of a customer record.");
impl_uuid_newtype!(SaleId, "SaleId", "Identifier of a sales order.");
impl_uuid_newtype!(SaleLineId, "SaleLineId", "Identifier of one line on a sales order.");
impl_uuid_newtype!(ItemId, "ItemId", "Identifier of a catalog item.");
impl_uuid_newtype!(StorageLocationId, "StorageLocationId", "Identifier of a storage location.");
impl_uuid_newtype!(LotId, "LotId", "Identifier of an inventory lot.");
impl_uuid_newtype!(AdjustmentId, "AdjustmentId", "Identifier of an inventory adjustment ledger row.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_strings() {
        let id = SaleId::new();
        let parsed: SaleId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn default_id_is_nil() {
        assert!(LotId::default().is_nil());
        assert!(!LotId::new().is_nil());
    }

    #[test]
    fn invalid_string_is_rejected() {
        let err = "not-a-uuid".parse::<ItemId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }
}
