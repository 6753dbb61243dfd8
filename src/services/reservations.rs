//! Reservation lifecycle service
//!
//! Every transition that can change what a book has available runs in one
//! transaction that first locks the book's inventory row, then the
//! reservation row, and re-derives the inventory status before committing.

use chrono::{Duration, NaiveDate, Utc};
use sqlx::{Postgres, Transaction};
use validator::Validate;

use crate::{
    config::ReservationsConfig,
    error::{AppError, AppResult},
    models::{
        enums::{CollectionStatus, ReservationStatus},
        inventory::Inventory,
        loan::{LoanDetails, NewLoan},
        reservation::{CollectReservation, CreateReservation, Reservation, ReservationDetails, ReservationQuery},
        user::{RequestContext, User},
    },
    repository::Repository,
};

/// Status a new reservation starts in
pub fn initial_status(user: &User) -> ReservationStatus {
    if user.has_verified_credential() {
        ReservationStatus::Pending
    } else {
        ReservationStatus::PendingCredential
    }
}

/// Due date of a loan created from a collected reservation
fn collection_due_date(
    requested: Option<NaiveDate>,
    reservation: &Reservation,
    today: NaiveDate,
    default_loan_days: i64,
) -> AppResult<NaiveDate> {
    let due_date = requested
        .or(reservation.planned_return_date.filter(|d| *d > today))
        .unwrap_or(today + Duration::days(default_loan_days));

    if due_date < today {
        return Err(AppError::validation("due_date", "Due date cannot be in the past"));
    }
    Ok(due_date)
}

/// Result of an expiry sweep
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct ExpiredHolds {
    pub expired: usize,
    pub reservation_ids: Vec<i32>,
}

#[derive(Clone)]
pub struct ReservationsService {
    repository: Repository,
    config: ReservationsConfig,
}

impl ReservationsService {
    pub fn new(repository: Repository, config: ReservationsConfig) -> Self {
        Self { repository, config }
    }

    /// Begin a transaction holding the book's inventory lock, then the reservation lock
    async fn lock_reservation(
        &self,
        id: i32,
    ) -> AppResult<(Transaction<'static, Postgres>, Inventory, Reservation)> {
        let book_id = self.repository.reservations_get_by_id(id).await?.book_id;

        let mut tx = self.repository.begin().await?;
        let inventory = self.repository.inventory_lock(&mut tx, book_id).await?;
        let reservation = self.repository.reservations_lock(&mut tx, id).await?;

        Ok((tx, inventory, reservation))
    }

    /// Place a reservation for the caller, or for a reader when staff act on their behalf
    pub async fn create_reservation(
        &self,
        ctx: &RequestContext,
        data: CreateReservation,
    ) -> AppResult<ReservationDetails> {
        data.validate()?;

        let user_id = match data.user_id {
            Some(user_id) if ctx.is_staff() => user_id,
            _ => ctx.user_id,
        };

        let today = Utc::now().date_naive();
        if data.planned_return_date <= today {
            return Err(AppError::validation(
                "planned_return_date",
                "Planned return date must be in the future",
            ));
        }

        let user = self.repository.users_get_by_id(user_id).await?;
        if !user.status {
            return Err(AppError::BusinessRule("Account is not activated".to_string()));
        }
        self.repository.books_get_by_id(data.book_id).await?;

        let mut tx = self.repository.begin().await?;

        let inventory = self.repository.inventory_lock(&mut tx, data.book_id).await?;
        if inventory.status.is_manual_hold() {
            return Err(AppError::NotAvailable(format!(
                "Book {} is {} and cannot be reserved",
                data.book_id, inventory.status
            )));
        }

        if self
            .repository
            .reservations_open_exists(&mut tx, user_id, data.book_id)
            .await?
        {
            return Err(AppError::Conflict(
                "You already have an open reservation for this book".to_string(),
            ));
        }

        let status = initial_status(&user);
        let reservation = self
            .repository
            .reservations_insert(
                &mut tx,
                user_id,
                data.book_id,
                status,
                Utc::now() + Duration::days(self.config.hold_days),
                data.planned_return_date,
                data.notes.as_deref(),
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            reservation_id = reservation.id,
            user_id,
            book_id = data.book_id,
            status = %status,
            "Reservation created"
        );
        self.repository.reservations_get_details(reservation.id).await
    }

    pub async fn get_reservation(&self, ctx: &RequestContext, id: i32) -> AppResult<ReservationDetails> {
        let details = self.repository.reservations_get_details(id).await?;
        ctx.require_self_or_staff(details.reservation.user_id)?;
        Ok(details)
    }

    /// Staff listing
    pub async fn list_reservations(
        &self,
        ctx: &RequestContext,
        query: &ReservationQuery,
    ) -> AppResult<(Vec<ReservationDetails>, i64)> {
        ctx.require_staff()?;
        self.repository.reservations_search(query).await
    }

    /// The caller's own reservations
    pub async fn my_reservations(
        &self,
        ctx: &RequestContext,
        mut query: ReservationQuery,
    ) -> AppResult<(Vec<ReservationDetails>, i64)> {
        query.user_id = Some(ctx.user_id);
        self.repository.reservations_search(&query).await
    }

    /// Approve a pending reservation if a copy is free; the copy is then held
    pub async fn approve(&self, ctx: &RequestContext, id: i32) -> AppResult<ReservationDetails> {
        ctx.require_staff()?;

        let (mut tx, inventory, reservation) = self.lock_reservation(id).await?;
        reservation.ensure_transition(ReservationStatus::Approved)?;

        let availability = self.repository.inventory_availability(&mut tx, &inventory).await?;
        if inventory.status.is_manual_hold() || !availability.is_available() {
            tracing::info!(
                reservation_id = id,
                book_id = inventory.book_id,
                available = availability.available,
                status = %inventory.status,
                "Approval refused, no copy available"
            );
            return Err(AppError::NotAvailable(format!(
                "No copy of book {} is available",
                inventory.book_id
            )));
        }

        let expires_at = Utc::now() + Duration::days(self.config.hold_days);
        self.repository
            .reservations_approve(&mut tx, id, ctx.user_id, expires_at)
            .await?;
        self.repository.inventory_refresh_status(&mut tx, &inventory).await?;

        tx.commit().await?;

        tracing::info!(reservation_id = id, approved_by = ctx.user_id, "Reservation approved");
        self.repository.reservations_get_details(id).await
    }

    pub async fn reject(&self, ctx: &RequestContext, id: i32) -> AppResult<ReservationDetails> {
        ctx.require_staff()?;

        let (mut tx, _inventory, reservation) = self.lock_reservation(id).await?;
        reservation.ensure_transition(ReservationStatus::Rejected)?;
        self.repository
            .reservations_close(&mut tx, id, ReservationStatus::Rejected)
            .await?;

        tx.commit().await?;

        tracing::info!(reservation_id = id, rejected_by = ctx.user_id, "Reservation rejected");
        self.repository.reservations_get_details(id).await
    }

    /// Cancel by the owner or staff; an approved hold releases its copy
    pub async fn cancel(&self, ctx: &RequestContext, id: i32) -> AppResult<ReservationDetails> {
        let (mut tx, inventory, reservation) = self.lock_reservation(id).await?;
        ctx.require_self_or_staff(reservation.user_id)?;
        reservation.ensure_transition(ReservationStatus::Cancelled)?;

        self.repository
            .reservations_close(&mut tx, id, ReservationStatus::Cancelled)
            .await?;
        self.repository.inventory_refresh_status(&mut tx, &inventory).await?;

        tx.commit().await?;

        tracing::info!(reservation_id = id, cancelled_by = ctx.user_id, "Reservation cancelled");
        self.repository.reservations_get_details(id).await
    }

    /// The reader picked the book up: the hold becomes a loan
    pub async fn mark_collected(
        &self,
        ctx: &RequestContext,
        id: i32,
        data: CollectReservation,
    ) -> AppResult<LoanDetails> {
        ctx.require_staff()?;
        data.validate()?;

        let (mut tx, inventory, reservation) = self.lock_reservation(id).await?;
        reservation.ensure_collectable()?;

        let today = Utc::now().date_naive();
        let due_date = collection_due_date(data.due_date, &reservation, today, self.config.default_loan_days)?;

        self.repository
            .reservations_mark_collection(&mut tx, id, CollectionStatus::Collected)
            .await?;
        let loan = self
            .repository
            .loans_insert(
                &mut tx,
                &NewLoan {
                    user_id: reservation.user_id,
                    book_id: reservation.book_id,
                    librarian_id: ctx.user_id,
                    reservation_id: Some(id),
                    due_date,
                    planned_return_date: reservation.planned_return_date,
                    left_credential: data.left_credential.unwrap_or(false),
                    notes: data.notes.or(reservation.notes),
                },
            )
            .await?;
        self.repository.inventory_refresh_status(&mut tx, &inventory).await?;

        tx.commit().await?;

        tracing::info!(
            reservation_id = id,
            loan_id = loan.id,
            librarian_id = ctx.user_id,
            %due_date,
            "Reservation collected"
        );
        self.repository.loans_get_details(loan.id).await
    }

    /// The reader never came: release the held copy
    pub async fn mark_not_collected(&self, ctx: &RequestContext, id: i32) -> AppResult<ReservationDetails> {
        ctx.require_staff()?;

        let (mut tx, inventory, reservation) = self.lock_reservation(id).await?;
        reservation.ensure_collectable()?;

        self.repository
            .reservations_mark_collection(&mut tx, id, CollectionStatus::NotCollected)
            .await?;
        self.repository.inventory_refresh_status(&mut tx, &inventory).await?;

        tx.commit().await?;

        tracing::info!(reservation_id = id, marked_by = ctx.user_id, "Reservation not collected");
        self.repository.reservations_get_details(id).await
    }

    /// Cancel every open reservation whose hold window has passed
    pub async fn expire_holds(&self, ctx: &RequestContext) -> AppResult<ExpiredHolds> {
        ctx.require_staff()?;

        let now = Utc::now();
        let candidates = self.repository.reservations_list_expired(now).await?;
        let mut reservation_ids = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let (mut tx, inventory, reservation) = self.lock_reservation(candidate.id).await?;

            // Another request may have moved it since the listing
            if !reservation.is_expired(now) || reservation.ensure_transition(ReservationStatus::Cancelled).is_err() {
                continue;
            }

            self.repository
                .reservations_close(&mut tx, reservation.id, ReservationStatus::Cancelled)
                .await?;
            self.repository.inventory_refresh_status(&mut tx, &inventory).await?;
            tx.commit().await?;

            reservation_ids.push(reservation.id);
        }

        tracing::info!(expired = reservation_ids.len(), run_by = ctx.user_id, "Expired reservations cancelled");
        Ok(ExpiredHolds {
            expired: reservation_ids.len(),
            reservation_ids,
        })
    }

    /// Verify a reader's school credential and release their waiting reservations
    pub async fn verify_credential(&self, ctx: &RequestContext, user_id: i32) -> AppResult<(User, u64)> {
        ctx.require_staff()?;

        let user = self.repository.users_get_by_id(user_id).await?;
        if user.school_credential_path.is_none() {
            return Err(AppError::BusinessRule(
                "The user has not uploaded a school credential".to_string(),
            ));
        }

        let mut tx = self.repository.begin().await?;
        let user = self
            .repository
            .users_verify_credential(&mut tx, user_id, ctx.user_id)
            .await?;
        let promoted = self
            .repository
            .reservations_promote_credential(&mut tx, user_id)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id, verified_by = ctx.user_id, promoted, "Credential verified");
        Ok((user, promoted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::Role;
    use tokio_test::{assert_err, assert_ok};

    fn user(verified: bool) -> User {
        let now = Utc::now();
        User {
            id: 9,
            name: Some("Lucía Méndez".into()),
            email: None,
            password: None,
            role: Role::ReaderPublic,
            status: true,
            matricula: "A01700001".into(),
            activation_token: None,
            activation_token_digest: None,
            school_credential_path: Some("storage/credentials/user_9.pdf".into()),
            credential_verified_at: verified.then_some(now),
            verified_by: verified.then_some(1),
            created_at: now,
            updated_at: now,
        }
    }

    fn approved(planned_return_date: Option<NaiveDate>) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: 4,
            user_id: 9,
            book_id: 12,
            status: ReservationStatus::Approved,
            reserved_at: now,
            expires_at: Some(now + Duration::days(3)),
            approved_at: Some(now),
            approved_by: Some(2),
            planned_return_date,
            collection_status: None,
            collection_marked_at: None,
            cancelled_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn unverified_readers_wait_for_credential() {
        assert_eq!(initial_status(&user(false)), ReservationStatus::PendingCredential);
        assert_eq!(initial_status(&user(true)), ReservationStatus::Pending);
    }

    #[test]
    fn collection_due_date_prefers_request_then_plan() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let planned = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let requested = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();

        assert_eq!(
            collection_due_date(Some(requested), &approved(Some(planned)), today, 14).unwrap(),
            requested
        );
        assert_eq!(collection_due_date(None, &approved(Some(planned)), today, 14).unwrap(), planned);
        assert_eq!(
            collection_due_date(None, &approved(None), today, 14).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
    }

    #[test]
    fn collection_due_date_cannot_be_past() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_err!(collection_due_date(Some(yesterday), &approved(None), today, 14));
        // A stale plan falls back to the default loan length
        assert_ok!(collection_due_date(None, &approved(Some(yesterday)), today, 14));
    }
}
