//! Report queries on Repository

use chrono::NaiveDate;
use sqlx::{Postgres, QueryBuilder};

use super::{books::STOCK_CTE, Repository};
use crate::{
    error::AppResult,
    models::{
        enums::{InventoryStatus, LoanStatus, ReservationStatus},
        report::{BookReportRow, LoanReportRow, ReservationReportRow},
    },
};

/// Inclusive date range on a timestamp column
fn push_date_range(
    builder: &mut QueryBuilder<'_, Postgres>,
    column: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) {
    if let Some(from) = from {
        builder.push(format!(" AND {}::DATE >= ", column)).push_bind(from);
    }
    if let Some(to) = to {
        builder.push(format!(" AND {}::DATE <= ", column)).push_bind(to);
    }
}

impl Repository {
    /// Catalog with stock figures, for books added within the range
    pub async fn reports_books(
        &self,
        status: Option<InventoryStatus>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<BookReportRow>> {
        let mut builder = QueryBuilder::<Postgres>::new(STOCK_CTE);
        builder.push(
            r#"
            SELECT b.id, b.title, b.isbn, b.folio, b.publication_year,
                   COALESCE((SELECT STRING_AGG(a.name, '; ' ORDER BY ba.position, a.name)
                             FROM book_authors ba JOIN authors a ON a.id = ba.author_id
                             WHERE ba.book_id = b.id), '') AS authors,
                   c.name AS category, p.name AS publisher, g.name AS genre,
                   i.quantity, i.condition, i.status,
                   COALESCE(s.on_loan, 0) AS on_loan,
                   COALESCE(s.on_hold, 0) AS on_hold,
                   COALESCE(s.available, 0) AS available,
                   b.created_at
            FROM books b
            LEFT JOIN categories c ON c.id = b.category_id
            LEFT JOIN publishers p ON p.id = b.publisher_id
            LEFT JOIN genres g ON g.id = b.genre_id
            LEFT JOIN inventories i ON i.book_id = b.id
            LEFT JOIN stock s ON s.book_id = b.id
            WHERE TRUE
            "#,
        );
        if let Some(status) = status {
            builder.push(" AND i.status = ").push_bind(status);
        }
        push_date_range(&mut builder, "b.created_at", from, to);
        builder.push(" ORDER BY LOWER(b.title), b.id");

        let rows = builder.build_query_as::<BookReportRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Loans borrowed within the range
    pub async fn reports_loans(
        &self,
        status: Option<LoanStatus>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<LoanReportRow>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"
            SELECT l.id, u.matricula, u.name AS user_name, b.title AS book_title, b.isbn,
                   l.status, l.borrowed_at, l.due_date, l.returned_at, l.fine_amount,
                   l.left_credential, lib.name AS librarian_name, l.reservation_id
            FROM loans l
            JOIN users u ON u.id = l.user_id
            JOIN books b ON b.id = l.book_id
            LEFT JOIN users lib ON lib.id = l.librarian_id
            WHERE TRUE
            "#,
        );
        if let Some(status) = status {
            builder.push(" AND l.status = ").push_bind(status);
        }
        push_date_range(&mut builder, "l.borrowed_at", from, to);
        builder.push(" ORDER BY l.borrowed_at DESC, l.id DESC");

        let rows = builder.build_query_as::<LoanReportRow>().fetch_all(&self.pool).await?;
        Ok(rows)
    }

    /// Reservations placed within the range
    pub async fn reports_reservations(
        &self,
        status: Option<ReservationStatus>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> AppResult<Vec<ReservationReportRow>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"
            SELECT r.id, u.matricula, u.name AS user_name, b.title AS book_title, b.isbn,
                   r.status, r.reserved_at, r.expires_at, r.approved_at,
                   appr.name AS approved_by_name, r.planned_return_date, r.collection_status
            FROM reservations r
            JOIN users u ON u.id = r.user_id
            JOIN books b ON b.id = r.book_id
            LEFT JOIN users appr ON appr.id = r.approved_by
            WHERE TRUE
            "#,
        );
        if let Some(status) = status {
            builder.push(" AND r.status = ").push_bind(status);
        }
        push_date_range(&mut builder, "r.reserved_at", from, to);
        builder.push(" ORDER BY r.reserved_at DESC, r.id DESC");

        let rows = builder
            .build_query_as::<ReservationReportRow>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
