//! Reservation model and its lifecycle rules

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::{CollectionStatus, ReservationStatus};
use crate::error::{AppError, AppResult};

impl ReservationStatus {
    /// `rejected` and `cancelled` are final
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Rejected | ReservationStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: ReservationStatus) -> bool {
        use ReservationStatus::*;

        matches!(
            (self, next),
            (PendingCredential, Pending)
                | (Pending, Approved)
                | (PendingCredential | Pending, Rejected)
                | (PendingCredential | Pending | Approved, Cancelled)
        )
    }
}

/// Reservation row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Reservation {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<i32>,
    pub planned_return_date: Option<NaiveDate>,
    pub collection_status: Option<CollectionStatus>,
    pub collection_marked_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Approved and waiting for the reader: holds one copy
    pub fn is_hold(&self) -> bool {
        self.status == ReservationStatus::Approved && self.collection_status.is_none()
    }

    /// Still blocks the reader from reserving the same book again
    pub fn is_open(&self) -> bool {
        match self.status {
            ReservationStatus::PendingCredential | ReservationStatus::Pending => true,
            ReservationStatus::Approved => self.collection_status.is_none(),
            ReservationStatus::Rejected | ReservationStatus::Cancelled => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.expires_at.map(|at| at < now).unwrap_or(false)
    }

    /// Check that this reservation may move to `next`
    pub fn ensure_transition(&self, next: ReservationStatus) -> AppResult<()> {
        let allowed = self.status.can_transition_to(next)
            // Once marked collected/not collected an approved reservation is settled
            && !(self.status == ReservationStatus::Approved && self.collection_status.is_some());

        if allowed {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// Check that the reader pick-up can be recorded
    pub fn ensure_collectable(&self) -> AppResult<()> {
        if self.is_hold() {
            return Ok(());
        }
        match self.collection_status {
            Some(marked) => Err(AppError::BusinessRule(format!(
                "Reservation {} is already marked {}",
                self.id, marked
            ))),
            None => Err(AppError::BusinessRule(format!(
                "Reservation {} is {} and cannot be collected",
                self.id, self.status
            ))),
        }
    }
}

/// Reservation joined with reader and book for display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ReservationDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub reservation: Reservation,
    pub user_name: Option<String>,
    pub matricula: String,
    pub book_title: String,
    pub isbn: String,
    /// Loan created when the reservation was collected
    pub loan_id: Option<i32>,
}

/// Create reservation request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReservation {
    pub book_id: i32,
    /// Staff may reserve on behalf of a reader; ignored for readers
    pub user_id: Option<i32>,
    pub planned_return_date: NaiveDate,
    #[validate(length(max = 1000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

/// Record a pick-up; creates the loan
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct CollectReservation {
    /// Defaults to the planned return date, then to the configured loan length
    pub due_date: Option<NaiveDate>,
    pub left_credential: Option<bool>,
    #[validate(length(max = 1000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

/// Reservation list parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ReservationQuery {
    pub status: Option<ReservationStatus>,
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn reservation(status: ReservationStatus) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: 1,
            user_id: 2,
            book_id: 3,
            status,
            reserved_at: now,
            expires_at: Some(now + Duration::days(3)),
            approved_at: None,
            approved_by: None,
            planned_return_date: None,
            collection_status: None,
            collection_marked_at: None,
            cancelled_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn terminal_states_are_one_way() {
        for from in [ReservationStatus::Rejected, ReservationStatus::Cancelled] {
            assert!(from.is_terminal());
            for to in ReservationStatus::ALL {
                assert!(!from.can_transition_to(*to), "{from} -> {to} must be refused");
            }
        }
        assert_err!(reservation(ReservationStatus::Rejected)
            .ensure_transition(ReservationStatus::Approved));
        assert_err!(reservation(ReservationStatus::Cancelled)
            .ensure_transition(ReservationStatus::Approved));
    }

    #[test]
    fn approval_requires_pending() {
        assert_ok!(reservation(ReservationStatus::Pending)
            .ensure_transition(ReservationStatus::Approved));
        assert_err!(reservation(ReservationStatus::PendingCredential)
            .ensure_transition(ReservationStatus::Approved));
        assert_err!(reservation(ReservationStatus::Approved)
            .ensure_transition(ReservationStatus::Approved));
    }

    #[test]
    fn credential_verification_promotes_to_pending() {
        assert!(ReservationStatus::PendingCredential.can_transition_to(ReservationStatus::Pending));
        assert!(!ReservationStatus::Approved.can_transition_to(ReservationStatus::Pending));
    }

    #[test]
    fn collected_reservation_cannot_be_cancelled() {
        let mut r = reservation(ReservationStatus::Approved);
        assert_ok!(r.ensure_transition(ReservationStatus::Cancelled));
        assert!(r.is_hold());

        r.collection_status = Some(CollectionStatus::Collected);
        assert!(!r.is_hold());
        assert!(!r.is_open());
        assert_err!(r.ensure_transition(ReservationStatus::Cancelled));
        assert_err!(r.ensure_collectable());
    }

    #[test]
    fn only_unmarked_approved_reservations_are_collectable() {
        assert_ok!(reservation(ReservationStatus::Approved).ensure_collectable());
        assert_err!(reservation(ReservationStatus::Pending).ensure_collectable());
    }

    #[test]
    fn expiry_only_applies_to_open_reservations() {
        let later = Utc::now() + Duration::days(10);
        assert!(reservation(ReservationStatus::Pending).is_expired(later));
        assert!(!reservation(ReservationStatus::Rejected).is_expired(later));
        assert!(!reservation(ReservationStatus::Pending).is_expired(Utc::now()));
    }
}
