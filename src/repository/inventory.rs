//! Inventory domain methods on Repository

use chrono::Utc;
use sqlx::{PgConnection, PgExecutor, Row};

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        enums::{InventoryCondition, InventoryStatus},
        inventory::{Availability, Inventory, InventoryView, UpdateInventory},
    },
};

/// Loans holding a copy and approved reservations waiting for pick-up
const OUTSTANDING_COUNTS: &str = r#"
    SELECT
        (SELECT COUNT(*) FROM loans
          WHERE book_id = $1 AND status IN ('active', 'overdue')) AS on_loan,
        (SELECT COUNT(*) FROM reservations
          WHERE book_id = $1 AND status = 'approved' AND collection_status IS NULL) AS on_hold
"#;

async fn outstanding_counts<'e>(executor: impl PgExecutor<'e>, book_id: i32) -> AppResult<(i64, i64)> {
    let row = sqlx::query(OUTSTANDING_COUNTS)
        .bind(book_id)
        .fetch_one(executor)
        .await?;
    Ok((row.get("on_loan"), row.get("on_hold")))
}

impl Repository {
    /// Get the inventory of a book
    pub async fn inventory_get(&self, book_id: i32) -> AppResult<Inventory> {
        sqlx::query_as::<_, Inventory>("SELECT * FROM inventories WHERE book_id = $1")
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Inventory for book {} not found", book_id)))
    }

    /// Get the inventory of a book with its current availability
    pub async fn inventory_view(&self, book_id: i32) -> AppResult<InventoryView> {
        let inventory = self.inventory_get(book_id).await?;
        let (on_loan, on_hold) = outstanding_counts(&self.pool, book_id).await?;
        let availability = Availability::new(inventory.quantity, on_loan, on_hold);
        Ok(InventoryView::new(inventory, availability))
    }

    /// Lock the inventory row of a book until the transaction ends.
    ///
    /// Every transition that changes availability starts here, so concurrent
    /// approvals and loans on the same book are serialized.
    pub async fn inventory_lock(&self, conn: &mut PgConnection, book_id: i32) -> AppResult<Inventory> {
        sqlx::query_as::<_, Inventory>("SELECT * FROM inventories WHERE book_id = $1 FOR UPDATE")
            .bind(book_id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Inventory for book {} not found", book_id)))
    }

    /// Availability of a locked inventory, as seen by the current transaction
    pub async fn inventory_availability(
        &self,
        conn: &mut PgConnection,
        inventory: &Inventory,
    ) -> AppResult<Availability> {
        let (on_loan, on_hold) = outstanding_counts(&mut *conn, inventory.book_id).await?;
        Ok(Availability::new(inventory.quantity, on_loan, on_hold))
    }

    /// Re-derive and store the status of a locked inventory
    pub async fn inventory_refresh_status(
        &self,
        conn: &mut PgConnection,
        inventory: &Inventory,
    ) -> AppResult<InventoryStatus> {
        let availability = self.inventory_availability(&mut *conn, inventory).await?;
        let status = availability.derive_status(inventory.status);

        if status != inventory.status {
            sqlx::query("UPDATE inventories SET status = $1, updated_at = $2 WHERE id = $3")
                .bind(status)
                .bind(Utc::now())
                .bind(inventory.id)
                .execute(&mut *conn)
                .await?;
            tracing::debug!(
                book_id = inventory.book_id,
                from = %inventory.status,
                to = %status,
                "Inventory status changed"
            );
        }

        Ok(status)
    }

    /// Create the inventory row of a new book
    pub async fn inventory_create(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        quantity: i32,
        condition: InventoryCondition,
    ) -> AppResult<Inventory> {
        let status = Availability::new(quantity, 0, 0).derive_status(InventoryStatus::Disponible);

        let inventory = sqlx::query_as::<_, Inventory>(
            r#"
            INSERT INTO inventories (book_id, quantity, condition, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(quantity)
        .bind(condition)
        .bind(status)
        .fetch_one(&mut *conn)
        .await?;

        Ok(inventory)
    }

    /// Apply a staff update to a locked inventory
    pub async fn inventory_update(
        &self,
        conn: &mut PgConnection,
        inventory: &Inventory,
        data: &UpdateInventory,
    ) -> AppResult<Inventory> {
        let updated = sqlx::query_as::<_, Inventory>(
            r#"
            UPDATE inventories
            SET quantity = $1, condition = $2, status = $3, updated_at = $4
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(data.quantity.unwrap_or(inventory.quantity))
        .bind(data.condition.unwrap_or(inventory.condition))
        .bind(data.status.unwrap_or(inventory.status))
        .bind(Utc::now())
        .bind(inventory.id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }

    /// Remove one copy from stock (a lost copy)
    pub async fn inventory_decrement(&self, conn: &mut PgConnection, inventory: &Inventory) -> AppResult<Inventory> {
        let updated = sqlx::query_as::<_, Inventory>(
            r#"
            UPDATE inventories
            SET quantity = GREATEST(quantity - 1, 0), updated_at = $1
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(inventory.id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(updated)
    }
}
