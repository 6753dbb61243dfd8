//! Category, publisher and genre methods on Repository
//!
//! The three tables share a shape, so the table name comes from
//! [`TaxonomyKind`] and is never taken from user input.

use chrono::Utc;

use super::Repository;
use crate::{
    error::{AppError, AppResult},
    models::{
        book::NamedRef,
        taxonomy::{TaxonomyKind, Term, TermInput},
    },
};

fn term_select(kind: TaxonomyKind) -> String {
    format!(
        r#"
        SELECT t.id, t.name, t.description,
               (SELECT COUNT(*) FROM books b WHERE b.{column} = t.id) AS book_count,
               t.created_at, t.updated_at
        FROM {table} t
        "#,
        column = kind.book_column(),
        table = kind.table(),
    )
}

impl Repository {
    /// List all terms of a kind, ordered by name
    pub async fn taxonomy_list(&self, kind: TaxonomyKind) -> AppResult<Vec<Term>> {
        let query = format!("{} ORDER BY t.name", term_select(kind));
        let terms = sqlx::query_as::<_, Term>(&query)
            .fetch_all(&self.pool)
            .await?;

        Ok(terms)
    }

    pub async fn taxonomy_get(&self, kind: TaxonomyKind, id: i32) -> AppResult<Term> {
        let query = format!("{} WHERE t.id = $1", term_select(kind));
        sqlx::query_as::<_, Term>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} with id {} not found", kind.label(), id)))
    }

    pub async fn taxonomy_create(&self, kind: TaxonomyKind, input: &TermInput) -> AppResult<Term> {
        let query = format!(
            "INSERT INTO {} (name, description) VALUES ($1, $2) RETURNING id",
            kind.table()
        );
        let id: i32 = sqlx::query_scalar(&query)
            .bind(input.name.trim())
            .bind(&input.description)
            .fetch_one(&self.pool)
            .await?;

        self.taxonomy_get(kind, id).await
    }

    pub async fn taxonomy_update(&self, kind: TaxonomyKind, id: i32, input: &TermInput) -> AppResult<Term> {
        let query = format!(
            "UPDATE {} SET name = $1, description = $2, updated_at = $3 WHERE id = $4",
            kind.table()
        );
        let result = sqlx::query(&query)
            .bind(input.name.trim())
            .bind(&input.description)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("{} with id {} not found", kind.label(), id)));
        }

        self.taxonomy_get(kind, id).await
    }

    /// Delete a term; books referencing it keep a null reference
    pub async fn taxonomy_delete(&self, kind: TaxonomyKind, id: i32) -> AppResult<()> {
        let query = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let result = sqlx::query(&query).bind(id).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("{} with id {} not found", kind.label(), id)));
        }

        Ok(())
    }

    /// Check that a term exists
    pub async fn taxonomy_exists(&self, kind: TaxonomyKind, id: i32) -> AppResult<bool> {
        let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", kind.table());
        let exists: bool = sqlx::query_scalar(&query)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

        Ok(exists)
    }

    /// Return the term with this name (case-insensitive), creating it if needed.
    /// The boolean tells whether a new row was inserted.
    pub async fn taxonomy_find_or_create(&self, kind: TaxonomyKind, name: &str) -> AppResult<(NamedRef, bool)> {
        let name = name.trim();

        let find = format!("SELECT id, name FROM {} WHERE LOWER(name) = LOWER($1)", kind.table());
        if let Some(existing) = sqlx::query_as::<_, NamedRef>(&find)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
        {
            return Ok((existing, false));
        }

        let insert = format!(
            "INSERT INTO {} (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id, name",
            kind.table()
        );
        let inserted = sqlx::query_as::<_, NamedRef>(&insert)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match inserted {
            Some(created) => Ok((created, true)),
            None => {
                let existing = sqlx::query_as::<_, NamedRef>(&find)
                    .bind(name)
                    .fetch_one(&self.pool)
                    .await?;
                Ok((existing, false))
            }
        }
    }
}
