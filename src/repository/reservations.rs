//! Reservation domain methods on Repository

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::{paginate, Repository};
use crate::{
    error::{AppError, AppResult},
    models::{
        enums::{CollectionStatus, ReservationStatus},
        reservation::{Reservation, ReservationDetails, ReservationQuery},
    },
};

const DETAILS_SELECT: &str = r#"
    SELECT r.*, u.name AS user_name, u.matricula, b.title AS book_title, b.isbn,
           (SELECT l.id FROM loans l WHERE l.reservation_id = r.id) AS loan_id
    FROM reservations r
    JOIN users u ON u.id = r.user_id
    JOIN books b ON b.id = r.book_id
"#;

impl Repository {
    /// Get reservation by ID
    pub async fn reservations_get_by_id(&self, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Get reservation with reader and book details
    pub async fn reservations_get_details(&self, id: i32) -> AppResult<ReservationDetails> {
        let query = format!("{} WHERE r.id = $1", DETAILS_SELECT);
        sqlx::query_as::<_, ReservationDetails>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// Lock a reservation row until the transaction ends
    pub async fn reservations_lock(&self, conn: &mut PgConnection, id: i32) -> AppResult<Reservation> {
        sqlx::query_as::<_, Reservation>("SELECT * FROM reservations WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Reservation with id {} not found", id)))
    }

    /// List reservations with pagination, newest first
    pub async fn reservations_search(&self, query: &ReservationQuery) -> AppResult<(Vec<ReservationDetails>, i64)> {
        let (_, per_page, offset) = paginate(query.page, query.per_page);

        fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ReservationQuery) {
            builder.push(" WHERE TRUE");
            if let Some(status) = query.status {
                builder.push(" AND r.status = ").push_bind(status);
            }
            if let Some(user_id) = query.user_id {
                builder.push(" AND r.user_id = ").push_bind(user_id);
            }
            if let Some(book_id) = query.book_id {
                builder.push(" AND r.book_id = ").push_bind(book_id);
            }
        }

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM reservations r");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        push_filters(&mut select, query);
        select
            .push(" ORDER BY r.reserved_at DESC, r.id DESC LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let reservations = select
            .build_query_as::<ReservationDetails>()
            .fetch_all(&self.pool)
            .await?;

        Ok((reservations, total))
    }

    /// Whether the reader already has an open reservation for this book
    pub async fn reservations_open_exists(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM reservations
                WHERE user_id = $1 AND book_id = $2
                  AND (status IN ('pending_credential', 'pending')
                       OR (status = 'approved' AND collection_status IS NULL))
            )
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(exists)
    }

    /// Insert a new reservation
    #[allow(clippy::too_many_arguments)]
    pub async fn reservations_insert(
        &self,
        conn: &mut PgConnection,
        user_id: i32,
        book_id: i32,
        status: ReservationStatus,
        expires_at: DateTime<Utc>,
        planned_return_date: NaiveDate,
        notes: Option<&str>,
    ) -> AppResult<Reservation> {
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            INSERT INTO reservations (user_id, book_id, status, expires_at, planned_return_date, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .bind(status)
        .bind(expires_at)
        .bind(planned_return_date)
        .bind(notes)
        .fetch_one(&mut *conn)
        .await?;

        Ok(reservation)
    }

    /// Approve a reservation; the hold window restarts at approval time
    pub async fn reservations_approve(
        &self,
        conn: &mut PgConnection,
        id: i32,
        approved_by: i32,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Reservation> {
        let now = Utc::now();
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET status = $1, approved_at = $2, approved_by = $3, expires_at = $4, updated_at = $2
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(ReservationStatus::Approved)
        .bind(now)
        .bind(approved_by)
        .bind(expires_at)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(reservation)
    }

    /// Move a reservation to `rejected` or `cancelled`
    pub async fn reservations_close(
        &self,
        conn: &mut PgConnection,
        id: i32,
        status: ReservationStatus,
    ) -> AppResult<Reservation> {
        let now = Utc::now();
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET status = $1, cancelled_at = $2, updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(reservation)
    }

    /// Record whether the reader picked the book up
    pub async fn reservations_mark_collection(
        &self,
        conn: &mut PgConnection,
        id: i32,
        collection: CollectionStatus,
    ) -> AppResult<Reservation> {
        let now = Utc::now();
        let reservation = sqlx::query_as::<_, Reservation>(
            r#"
            UPDATE reservations
            SET collection_status = $1, collection_marked_at = $2, updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(collection)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(reservation)
    }

    /// Promote a reader's `pending_credential` reservations to `pending`
    pub async fn reservations_promote_credential(&self, conn: &mut PgConnection, user_id: i32) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $1, updated_at = $2
            WHERE user_id = $3 AND status = $4
            "#,
        )
        .bind(ReservationStatus::Pending)
        .bind(Utc::now())
        .bind(user_id)
        .bind(ReservationStatus::PendingCredential)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Open reservations whose hold window has passed
    pub async fn reservations_list_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<Reservation>> {
        let reservations = sqlx::query_as::<_, Reservation>(
            r#"
            SELECT * FROM reservations
            WHERE expires_at < $1
              AND (status IN ('pending_credential', 'pending')
                   OR (status = 'approved' AND collection_status IS NULL))
            ORDER BY book_id, id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(reservations)
    }
}
