//! Author domain methods on Repository

use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};

use super::{paginate, Repository};
use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorInput, AuthorQuery, AuthorShort},
        book::NamedRef,
    },
};

impl Repository {
    /// Get author by ID
    pub async fn authors_get_by_id(&self, id: i32) -> AppResult<Author> {
        sqlx::query_as::<_, Author>("SELECT * FROM authors WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    /// Search authors by name with pagination
    pub async fn authors_search(&self, query: &AuthorQuery) -> AppResult<(Vec<AuthorShort>, i64)> {
        let (_, per_page, offset) = paginate(query.page, query.per_page);
        let pattern = query
            .name
            .as_deref()
            .map(|name| format!("%{}%", name.trim().to_lowercase()));

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM authors a");
        if let Some(ref pattern) = pattern {
            count.push(" WHERE LOWER(a.name) LIKE ").push_bind(pattern.clone());
        }
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            r#"
            SELECT a.id, a.name,
                   (SELECT COUNT(*) FROM book_authors ba WHERE ba.author_id = a.id) AS book_count
            FROM authors a
            "#,
        );
        if let Some(pattern) = pattern {
            select.push(" WHERE LOWER(a.name) LIKE ").push_bind(pattern);
        }
        select
            .push(" ORDER BY a.name LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let authors = select.build_query_as::<AuthorShort>().fetch_all(&self.pool).await?;

        Ok((authors, total))
    }

    /// Create a new author
    pub async fn authors_create(&self, author: &AuthorInput) -> AppResult<Author> {
        let created = sqlx::query_as::<_, Author>(
            "INSERT INTO authors (name, biography) VALUES ($1, $2) RETURNING *",
        )
        .bind(author.name.trim())
        .bind(&author.biography)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    /// Update an existing author
    pub async fn authors_update(&self, id: i32, author: &AuthorInput) -> AppResult<Author> {
        sqlx::query_as::<_, Author>(
            r#"
            UPDATE authors SET name = $1, biography = $2, updated_at = $3
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(author.name.trim())
        .bind(&author.biography)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Author with id {} not found", id)))
    }

    /// Delete an author; the books keep their other authors
    pub async fn authors_delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM authors WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Author with id {} not found", id)));
        }

        Ok(())
    }

    /// Return the author with this name (case-insensitive), creating it if needed.
    /// The boolean tells whether a new row was inserted.
    pub async fn authors_find_or_create(&self, name: &str) -> AppResult<(NamedRef, bool)> {
        let name = name.trim();

        if let Some(existing) = sqlx::query_as::<_, NamedRef>(
            "SELECT id, name FROM authors WHERE LOWER(name) = LOWER($1)",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        {
            return Ok((existing, false));
        }

        // A concurrent insert of the same name lands on the conflict branch
        let inserted = sqlx::query_as::<_, NamedRef>(
            r#"
            INSERT INTO authors (name) VALUES ($1)
            ON CONFLICT (name) DO NOTHING
            RETURNING id, name
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(created) => Ok((created, true)),
            None => {
                let existing = sqlx::query_as::<_, NamedRef>("SELECT id, name FROM authors WHERE name = $1")
                    .bind(name)
                    .fetch_one(&self.pool)
                    .await?;
                Ok((existing, false))
            }
        }
    }

    /// Count how many of the given author IDs exist
    pub async fn authors_count_existing(&self, ids: &[i32]) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM authors WHERE id = ANY($1)")
            .bind(ids)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}
