//! Repository layer for database operations
//!
//! Each domain module adds `<domain>_*` methods on [`Repository`]. Methods taking a
//! `&mut PgConnection` are meant to run inside a caller-owned transaction.

pub mod authors;
pub mod books;
pub mod inventory;
pub mod loans;
pub mod reports;
pub mod reservations;
pub mod taxonomy;
pub mod users;

use sqlx::{Pool, Postgres, Transaction};

use crate::error::AppResult;

/// Default and maximum page sizes for list endpoints
pub const DEFAULT_PER_PAGE: i64 = 20;
pub const MAX_PER_PAGE: i64 = 100;

/// Main repository struct holding database connection pool
#[derive(Clone)]
pub struct Repository {
    pub pool: Pool<Postgres>,
}

impl Repository {
    /// Create a new repository with the given database pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Start a transaction for a multi-step state transition
    pub async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        Ok(self.pool.begin().await?)
    }
}

/// Clamp `page`/`per_page` query values and return `(page, per_page, offset)`
pub fn paginate(page: Option<i64>, per_page: Option<i64>) -> (i64, i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
    (page, per_page, (page - 1) * per_page)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        assert_eq!(paginate(None, None), (1, 20, 0));
        assert_eq!(paginate(Some(3), Some(10)), (3, 10, 20));
        assert_eq!(paginate(Some(0), Some(1000)), (1, 100, 0));
        assert_eq!(paginate(Some(-4), Some(0)), (1, 1, 0));
    }
}
