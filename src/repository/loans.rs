//! Loan domain methods on Repository

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::{paginate, Repository};
use crate::{
    error::{AppError, AppResult},
    models::{
        enums::LoanStatus,
        loan::{Loan, LoanDetails, LoanQuery, NewLoan},
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT l.*, u.name AS user_name, u.matricula, b.title AS book_title, b.isbn,
           lib.name AS librarian_name,
           (l.status IN ('active', 'overdue') AND l.due_date < CURRENT_DATE) AS is_past_due
    FROM loans l
    JOIN users u ON u.id = l.user_id
    JOIN books b ON b.id = l.book_id
    LEFT JOIN users lib ON lib.id = l.librarian_id
"#;

impl Repository {
    /// Get loan by ID
    pub async fn loans_get_by_id(&self, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Get loan with reader, book and librarian details
    pub async fn loans_get_details(&self, id: i32) -> AppResult<LoanDetails> {
        let query = format!("{} WHERE l.id = $1", DETAILS_SELECT);
        sqlx::query_as::<_, LoanDetails>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// Lock a loan row until the transaction ends
    pub async fn loans_lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }

    /// List loans with pagination, newest first
    pub async fn loans_search(&self, query: &LoanQuery) -> AppResult<(Vec<LoanDetails>, i64)> {
        let (_, per_page, offset) = paginate(query.page, query.per_page);

        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &LoanQuery) {
            builder.push(" WHERE TRUE");
            if let Some(status) = query.status {
                builder.push(" AND l.status = ").push_bind(status);
            }
            if let Some(user_id) = query.user_id {
                builder.push(" AND l.user_id = ").push_bind(user_id);
            }
            if let Some(book_id) = query.book_id {
                builder.push(" AND l.book_id = ").push_bind(book_id);
            }
            if query.overdue_only.unwrap_or(false) {
                builder.push(" AND l.status IN ('active', 'overdue') AND l.due_date < CURRENT_DATE");
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loans l");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        push_filters(&mut select, query);
        select
            .push(" ORDER BY l.borrowed_at DESC, l.id DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let loans = select.build_query_as::<LoanDetails>().fetch_all(&self.pool).await?;

        Ok((loans, total))
    }

    /// Insert a new active loan
    pub async fn loans_insert(&self, conn: &mut PgConnection, loan: &NewLoan) -> AppResult<Loan> {
        let created = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                user_id, book_id, librarian_id, reservation_id, status,
                due_date, planned_return_date, left_credential, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(loan.user_id)
        .bind(loan.book_id)
        .bind(loan.librarian_id)
        .bind(loan.reservation_id)
        .bind(LoanStatus::Active)
        .bind(loan.due_date)
        .bind(loan.planned_return_date)
        .bind(loan.left_credential)
        .bind(&loan.notes)
        .fetch_one(&mut *conn)
        .await?;

        Ok(created)
    }

    /// Close a loan as returned or lost, recording the fine
    pub async fn loans_close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: LoanStatus,
        fine_amount: Option<Decimal>,
    ) -> AppResult<Loan> {
        let now = Utc::now();
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET status = $1, returned_at = $2, fine_amount = COALESCE($3, fine_amount), updated_at = $2
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(fine_amount)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(loan)
    }

    /// Flag a single loan as overdue
    pub async fn loans_mark_overdue(&self, conn: &mut PgConnection, id: i32) -> AppResult<Loan> {
        let loan = sqlx::query_as::<_, Loan>(
            "UPDATE loans SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(LoanStatus::Overdue)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(loan)
    }

    /// Flag every active loan past its due date as overdue.
    /// Availability is unchanged: the copy was already out.
    pub async fn loans_sweep_overdue(&self, today: NaiveDate) -> AppResult<Vec<i32>> {
        let ids: Vec<i32> = sqlx::query_scalar(
            r#"
            UPDATE loans
            SET status = $1, updated_at = NOW()
            WHERE status = $2 AND due_date < $3
            RETURNING id
            "#,
        )
        .bind(LoanStatus::Overdue)
        .bind(LoanStatus::Active)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    /// Set the fine of a loan
    pub async fn loans_set_fine(&self, id: i32, fine_amount: Decimal) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(
            "UPDATE loans SET fine_amount = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(fine_amount)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))
    }
}
