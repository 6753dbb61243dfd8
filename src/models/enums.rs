//! Shared domain enums stored as text columns

use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, Postgres};
use utoipa::ToSchema;

/// Implements `as_str`, `Display`, `FromStr` and the sqlx text conversions for
/// an enum whose variants map one-to-one onto database strings.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {}: {}", stringify!($name), s)),
                }
            }
        }

        impl sqlx::Type<Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<Postgres>>::compatible(ty)
            }
        }

        impl<'r> Decode<'r, Postgres> for $name {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let s: &str = Decode::<Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl Encode<'_, Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as Encode<Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Librarian,
    ReaderPublic,
}

text_enum!(Role {
    Admin => "admin",
    Librarian => "librarian",
    ReaderPublic => "reader_public",
});

/// Landing page of each role after login or activation
const LANDING_ROUTES: [(Role, &str); 3] = [
    (Role::Admin, "/admin/dashboard"),
    (Role::Librarian, "/librarian/dashboard"),
    (Role::ReaderPublic, "/catalog"),
];

impl Role {
    pub fn landing_route(&self) -> &'static str {
        LANDING_ROUTES
            .iter()
            .find(|(role, _)| role == self)
            .map(|(_, route)| *route)
            .unwrap_or("/login")
    }

    /// Admins and librarians manage the catalog, loans and reservations
    pub fn is_staff(&self) -> bool {
        matches!(self, Role::Admin | Role::Librarian)
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Physical condition of the copies of a book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InventoryCondition {
    Nuevo,
    Usado,
    Deteriorado,
}

text_enum!(InventoryCondition {
    Nuevo => "nuevo",
    Usado => "usado",
    Deteriorado => "deteriorado",
});

/// Availability status shown in the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InventoryStatus {
    Disponible,
    Prestado,
    Reservado,
    Perdido,
    Danado,
}

text_enum!(InventoryStatus {
    Disponible => "disponible",
    Prestado => "prestado",
    Reservado => "reservado",
    Perdido => "perdido",
    Danado => "danado",
});

impl InventoryStatus {
    /// Statuses set by staff that transitions never overwrite
    pub fn is_manual_hold(&self) -> bool {
        matches!(self, InventoryStatus::Perdido | InventoryStatus::Danado)
    }
}

// ---------------------------------------------------------------------------
// Reservation
// ---------------------------------------------------------------------------

/// Reservation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    PendingCredential,
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

text_enum!(ReservationStatus {
    PendingCredential => "pending_credential",
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Cancelled => "cancelled",
});

/// Whether the reader picked up an approved reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    Collected,
    NotCollected,
}

text_enum!(CollectionStatus {
    Collected => "collected",
    NotCollected => "not_collected",
});

// ---------------------------------------------------------------------------
// Loan
// ---------------------------------------------------------------------------

/// Loan lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Active,
    Returned,
    Overdue,
    Lost,
}

text_enum!(LoanStatus {
    Active => "active",
    Returned => "returned",
    Overdue => "overdue",
    Lost => "lost",
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_role_has_a_landing_route() {
        assert_eq!(Role::Admin.landing_route(), "/admin/dashboard");
        assert_eq!(Role::Librarian.landing_route(), "/librarian/dashboard");
        assert_eq!(Role::ReaderPublic.landing_route(), "/catalog");
        for role in Role::ALL {
            assert_ne!(role.landing_route(), "/login");
        }
    }

    #[test]
    fn text_values_round_trip_through_from_str() {
        for status in ReservationStatus::ALL {
            assert_eq!(status.as_str().parse::<ReservationStatus>().unwrap(), *status);
        }
        assert_eq!("Reader_Public".parse::<Role>().unwrap(), Role::ReaderPublic);
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn serde_uses_database_spelling() {
        assert_eq!(
            serde_json::to_string(&ReservationStatus::PendingCredential).unwrap(),
            "\"pending_credential\""
        );
        assert_eq!(serde_json::to_string(&InventoryStatus::Danado).unwrap(), "\"danado\"");
        assert_eq!(serde_json::to_string(&Role::ReaderPublic).unwrap(), "\"reader_public\"");
    }

    #[test]
    fn only_staff_roles_are_staff() {
        assert!(Role::Admin.is_staff());
        assert!(Role::Librarian.is_staff());
        assert!(!Role::ReaderPublic.is_staff());
    }
}
