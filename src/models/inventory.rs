//! Inventory (stock, condition, availability) of a book

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::{InventoryCondition, InventoryStatus};

/// Inventory row, one per book
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Inventory {
    pub id: i32,
    pub book_id: i32,
    /// Copies owned by the library, including those out on loan
    pub quantity: i32,
    pub condition: InventoryCondition,
    pub status: InventoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Copy counts for a book at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Availability {
    pub quantity: i64,
    /// Loans in `active` or `overdue`
    pub on_loan: i64,
    /// Approved reservations waiting to be collected
    pub on_hold: i64,
    pub available: i64,
}

impl Availability {
    pub fn new(quantity: i32, on_loan: i64, on_hold: i64) -> Self {
        let quantity = i64::from(quantity);
        Self {
            quantity,
            on_loan,
            on_hold,
            available: (quantity - on_loan - on_hold).max(0),
        }
    }

    pub fn is_available(&self) -> bool {
        self.available > 0
    }

    pub fn outstanding(&self) -> i64 {
        self.on_loan + self.on_hold
    }

    /// Status the inventory should show given these counts.
    ///
    /// `perdido` and `danado` set by staff are kept as they are.
    pub fn derive_status(&self, current: InventoryStatus) -> InventoryStatus {
        if current.is_manual_hold() {
            current
        } else if self.is_available() {
            InventoryStatus::Disponible
        } else if self.on_loan > 0 {
            InventoryStatus::Prestado
        } else if self.on_hold > 0 {
            InventoryStatus::Reservado
        } else {
            InventoryStatus::Perdido
        }
    }
}

/// Inventory with computed availability
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InventoryView {
    #[serde(flatten)]
    pub inventory: Inventory,
    pub on_loan: i64,
    pub on_hold: i64,
    pub available: i64,
    pub is_available: bool,
}

impl InventoryView {
    pub fn new(inventory: Inventory, availability: Availability) -> Self {
        Self {
            inventory,
            on_loan: availability.on_loan,
            on_hold: availability.on_hold,
            available: availability.available,
            is_available: availability.is_available(),
        }
    }
}

/// Update inventory request (staff). Status is settable independently.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateInventory {
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: Option<i32>,
    pub condition: Option<InventoryCondition>,
    pub status: Option<InventoryStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_copies_subtract_loans_and_holds() {
        let a = Availability::new(3, 1, 1);
        assert_eq!(a.available, 1);
        assert!(a.is_available());
        assert_eq!(a.derive_status(InventoryStatus::Prestado), InventoryStatus::Disponible);
    }

    #[test]
    fn single_copy_on_loan_is_prestado() {
        let a = Availability::new(1, 1, 0);
        assert!(!a.is_available());
        assert_eq!(a.derive_status(InventoryStatus::Disponible), InventoryStatus::Prestado);
    }

    #[test]
    fn single_copy_on_hold_is_reservado() {
        let a = Availability::new(1, 0, 1);
        assert_eq!(a.derive_status(InventoryStatus::Disponible), InventoryStatus::Reservado);
    }

    #[test]
    fn no_copies_left_is_perdido() {
        let a = Availability::new(0, 0, 0);
        assert_eq!(a.derive_status(InventoryStatus::Disponible), InventoryStatus::Perdido);
    }

    #[test]
    fn manual_statuses_are_sticky() {
        let a = Availability::new(4, 0, 0);
        assert_eq!(a.derive_status(InventoryStatus::Danado), InventoryStatus::Danado);
        assert_eq!(a.derive_status(InventoryStatus::Perdido), InventoryStatus::Perdido);
    }

    #[test]
    fn oversubscription_never_goes_negative() {
        let a = Availability::new(1, 2, 1);
        assert_eq!(a.available, 0);
        assert_eq!(a.outstanding(), 3);
    }
}
