//! Loan lifecycle service

use chrono::{Duration, NaiveDate, Utc};
use sqlx::{Postgres, Transaction};
use validator::Validate;

use crate::{
    config::ReservationsConfig,
    error::{AppError, AppResult},
    models::{
        enums::LoanStatus,
        inventory::Inventory,
        loan::{ensure_valid_fine, CloseLoan, CreateLoan, Loan, LoanDetails, LoanQuery, NewLoan, SetFine},
        user::RequestContext,
    },
    repository::Repository,
};

/// Result of an overdue sweep
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct OverdueSweep {
    pub marked: usize,
    pub loan_ids: Vec<i32>,
}

/// Due date of a direct loan
fn loan_due_date(requested: Option<NaiveDate>, today: NaiveDate, default_loan_days: i64) -> AppResult<NaiveDate> {
    let due_date = requested.unwrap_or(today + Duration::days(default_loan_days));
    if due_date < today {
        return Err(AppError::validation("due_date", "Due date cannot be in the past"));
    }
    Ok(due_date)
}

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    config: ReservationsConfig,
}

impl LoansService {
    pub fn new(repository: Repository, config: ReservationsConfig) -> Self {
        Self { repository, config }
    }

    /// Begin a transaction holding the book's inventory lock, then the loan lock
    async fn lock_loan(&self, id: i32) -> AppResult<(Transaction<'static, Postgres>, Inventory, Loan)> {
        let book_id = self.repository.loans_get_by_id(id).await?.book_id;

        let mut tx = self.repository.begin().await?;
        let inventory = self.repository.inventory_lock(&mut tx, book_id).await?;
        let loan = self.repository.loans_lock(&mut tx, id).await?;

        Ok((tx, inventory, loan))
    }

    /// Lend a copy directly, without a prior reservation
    pub async fn create_loan(&self, ctx: &RequestContext, data: CreateLoan) -> AppResult<LoanDetails> {
        ctx.require_staff()?;
        data.validate()?;

        let today = Utc::now().date_naive();
        let due_date = loan_due_date(data.due_date, today, self.config.default_loan_days)?;

        let user = self.repository.users_get_by_id(data.user_id).await?;
        if !user.status {
            return Err(AppError::BusinessRule("Account is not activated".to_string()));
        }
        self.repository.books_get_by_id(data.book_id).await?;

        let mut tx = self.repository.begin().await?;

        let inventory = self.repository.inventory_lock(&mut tx, data.book_id).await?;
        let availability = self.repository.inventory_availability(&mut tx, &inventory).await?;
        if inventory.status.is_manual_hold() || !availability.is_available() {
            return Err(AppError::NotAvailable(format!(
                "No copy of book {} is available",
                data.book_id
            )));
        }

        let loan = self
            .repository
            .loans_insert(
                &mut tx,
                &NewLoan {
                    user_id: data.user_id,
                    book_id: data.book_id,
                    librarian_id: ctx.user_id,
                    reservation_id: None,
                    due_date,
                    planned_return_date: data.planned_return_date,
                    left_credential: data.left_credential.unwrap_or(false),
                    notes: data.notes,
                },
            )
            .await?;
        self.repository.inventory_refresh_status(&mut tx, &inventory).await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = loan.id,
            user_id = data.user_id,
            book_id = data.book_id,
            librarian_id = ctx.user_id,
            %due_date,
            "Loan created"
        );
        self.repository.loans_get_details(loan.id).await
    }

    pub async fn get_loan(&self, ctx: &RequestContext, id: i32) -> AppResult<LoanDetails> {
        let details = self.repository.loans_get_details(id).await?;
        ctx.require_self_or_staff(details.loan.user_id)?;
        Ok(details)
    }

    pub async fn list_loans(&self, ctx: &RequestContext, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        ctx.require_staff()?;
        self.repository.loans_search(query).await
    }

    /// The caller's own loans
    pub async fn my_loans(&self, ctx: &RequestContext, mut query: LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        query.user_id = Some(ctx.user_id);
        self.repository.loans_search(&query).await
    }

    /// Record the copy coming back
    pub async fn return_loan(&self, ctx: &RequestContext, id: i32, data: CloseLoan) -> AppResult<LoanDetails> {
        self.close_loan(ctx, id, LoanStatus::Returned, data).await
    }

    /// The copy will not come back; it is removed from stock
    pub async fn mark_lost(&self, ctx: &RequestContext, id: i32, data: CloseLoan) -> AppResult<LoanDetails> {
        self.close_loan(ctx, id, LoanStatus::Lost, data).await
    }

    async fn close_loan(
        &self,
        ctx: &RequestContext,
        id: i32,
        status: LoanStatus,
        data: CloseLoan,
    ) -> AppResult<LoanDetails> {
        ctx.require_staff()?;
        let fine_amount = data.fine_amount.map(ensure_valid_fine).transpose()?;

        let (mut tx, inventory, loan) = self.lock_loan(id).await?;
        loan.ensure_transition(status)?;

        self.repository.loans_close(&mut tx, id, status, fine_amount).await?;

        let inventory = if status == LoanStatus::Lost {
            self.repository.inventory_decrement(&mut tx, &inventory).await?
        } else {
            inventory
        };
        self.repository.inventory_refresh_status(&mut tx, &inventory).await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = id,
            status = %status,
            fine = ?fine_amount,
            librarian_id = ctx.user_id,
            "Loan closed"
        );
        self.repository.loans_get_details(id).await
    }

    /// Flag one active loan whose due date has passed
    pub async fn mark_overdue(&self, ctx: &RequestContext, id: i32) -> AppResult<LoanDetails> {
        ctx.require_staff()?;

        let mut tx = self.repository.begin().await?;
        let loan = self.repository.loans_lock(&mut tx, id).await?;
        loan.ensure_overdue(Utc::now().date_naive())?;
        self.repository.loans_mark_overdue(&mut tx, id).await?;
        tx.commit().await?;

        tracing::info!(loan_id = id, "Loan marked overdue");
        self.repository.loans_get_details(id).await
    }

    /// Flag every active loan whose due date has passed
    pub async fn sweep_overdue(&self, ctx: &RequestContext) -> AppResult<OverdueSweep> {
        ctx.require_staff()?;

        let loan_ids = self
            .repository
            .loans_sweep_overdue(Utc::now().date_naive())
            .await?;

        tracing::info!(marked = loan_ids.len(), run_by = ctx.user_id, "Overdue sweep finished");
        Ok(OverdueSweep {
            marked: loan_ids.len(),
            loan_ids,
        })
    }

    pub async fn set_fine(&self, ctx: &RequestContext, id: i32, data: SetFine) -> AppResult<LoanDetails> {
        ctx.require_staff()?;
        let fine_amount = ensure_valid_fine(data.fine_amount)?;

        self.repository.loans_set_fine(id, fine_amount).await?;

        tracing::info!(loan_id = id, fine = %fine_amount, librarian_id = ctx.user_id, "Fine set");
        self.repository.loans_get_details(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    #[test]
    fn direct_loans_default_to_configured_length() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        assert_eq!(
            loan_due_date(None, today, 14).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 24).unwrap()
        );
        assert_eq!(loan_due_date(Some(today), today, 14).unwrap(), today);
        assert_err!(loan_due_date(NaiveDate::from_ymd_opt(2024, 1, 9), today, 14));
    }
}
