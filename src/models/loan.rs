//! Loan model and its lifecycle rules

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::LoanStatus;
use crate::error::{AppError, AppResult};

impl LoanStatus {
    /// The copy is still out of the library
    pub fn is_outstanding(&self) -> bool {
        matches!(self, LoanStatus::Active | LoanStatus::Overdue)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_outstanding()
    }

    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;

        matches!(
            (self, next),
            (Active, Overdue) | (Active | Overdue, Returned) | (Active | Overdue, Lost)
        )
    }
}

/// Loan row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Loan {
    pub id: i32,
    pub user_id: i32,
    pub book_id: i32,
    pub librarian_id: Option<i32>,
    /// Reservation this loan fulfils, if any
    pub reservation_id: Option<i32>,
    pub status: LoanStatus,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub planned_return_date: Option<NaiveDate>,
    pub returned_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
    /// The reader left a school credential as collateral
    pub left_credential: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    pub fn is_past_due(&self, today: NaiveDate) -> bool {
        self.status.is_outstanding() && self.due_date < today
    }

    pub fn ensure_transition(&self, next: LoanStatus) -> AppResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }

    /// `overdue` is only reachable once the due date has passed
    pub fn ensure_overdue(&self, today: NaiveDate) -> AppResult<()> {
        self.ensure_transition(LoanStatus::Overdue)?;
        if self.due_date >= today {
            return Err(AppError::BusinessRule(format!(
                "Loan {} is due on {} and is not overdue yet",
                self.id, self.due_date
            )));
        }
        Ok(())
    }
}

/// Fines are entered by staff and can never be negative
pub fn ensure_valid_fine(amount: Decimal) -> AppResult<Decimal> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::validation("fine_amount", "Fine amount cannot be negative"));
    }
    Ok(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}

/// Loan joined with reader, book and librarian for display
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanDetails {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub loan: Loan,
    pub user_name: Option<String>,
    pub matricula: String,
    pub book_title: String,
    pub isbn: String,
    pub librarian_name: Option<String>,
    /// Outstanding and past its due date
    pub is_past_due: bool,
}

/// Create a direct loan (staff)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateLoan {
    pub user_id: i32,
    pub book_id: i32,
    /// Defaults to today plus the configured loan length
    pub due_date: Option<NaiveDate>,
    pub planned_return_date: Option<NaiveDate>,
    pub left_credential: Option<bool>,
    #[validate(length(max = 1000, message = "Notes are too long"))]
    pub notes: Option<String>,
}

/// Loan values computed by the service, written in one insert
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub user_id: i32,
    pub book_id: i32,
    pub librarian_id: i32,
    pub reservation_id: Option<i32>,
    pub due_date: NaiveDate,
    pub planned_return_date: Option<NaiveDate>,
    pub left_credential: bool,
    pub notes: Option<String>,
}

/// Close a loan, optionally with a fine
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CloseLoan {
    #[schema(value_type = Option<String>)]
    pub fine_amount: Option<Decimal>,
}

/// Set the fine of a loan
#[derive(Debug, Deserialize, ToSchema)]
pub struct SetFine {
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
}

/// Loan list parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct LoanQuery {
    pub status: Option<LoanStatus>,
    pub user_id: Option<i32>,
    pub book_id: Option<i32>,
    /// Only outstanding loans past their due date
    pub overdue_only: Option<bool>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tokio_test::{assert_err, assert_ok};

    fn loan(status: LoanStatus, due_date: NaiveDate) -> Loan {
        let now = Utc::now();
        Loan {
            id: 10,
            user_id: 1,
            book_id: 2,
            librarian_id: Some(3),
            reservation_id: None,
            status,
            borrowed_at: now,
            due_date,
            planned_return_date: None,
            returned_at: None,
            fine_amount: Decimal::ZERO,
            left_credential: false,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn returned_and_lost_are_terminal() {
        for from in [LoanStatus::Returned, LoanStatus::Lost] {
            assert!(from.is_terminal());
            for to in LoanStatus::ALL {
                assert!(!from.can_transition_to(*to));
            }
        }
    }

    #[test]
    fn overdue_loans_can_still_be_returned_or_lost() {
        let today = Utc::now().date_naive();
        let l = loan(LoanStatus::Overdue, today - Duration::days(3));
        assert_ok!(l.ensure_transition(LoanStatus::Returned));
        assert_ok!(l.ensure_transition(LoanStatus::Lost));
        assert_err!(l.ensure_transition(LoanStatus::Active));
    }

    #[test]
    fn overdue_requires_a_passed_due_date() {
        let today = Utc::now().date_naive();
        assert_err!(loan(LoanStatus::Active, today).ensure_overdue(today));
        assert_ok!(loan(LoanStatus::Active, today - Duration::days(1)).ensure_overdue(today));
        assert_err!(loan(LoanStatus::Returned, today - Duration::days(1)).ensure_overdue(today));
    }

    #[test]
    fn past_due_only_counts_outstanding_loans() {
        let today = Utc::now().date_naive();
        let yesterday = today - Duration::days(1);
        assert!(loan(LoanStatus::Active, yesterday).is_past_due(today));
        assert!(!loan(LoanStatus::Returned, yesterday).is_past_due(today));
    }

    #[test]
    fn fines_are_non_negative_and_rounded() {
        assert_err!(ensure_valid_fine(Decimal::new(-1, 0)));
        assert_eq!(ensure_valid_fine(Decimal::new(12345, 3)).unwrap(), Decimal::new(1235, 2));
        assert_eq!(ensure_valid_fine(Decimal::new(12344, 3)).unwrap(), Decimal::new(1234, 2));
        assert_ok!(ensure_valid_fine(Decimal::ZERO));
    }
}
