//! Book domain methods on Repository

use chrono::Utc;
use sqlx::{PgConnection, Postgres, QueryBuilder};

use super::{paginate, Repository};
use crate::{
    error::{AppError, AppResult},
    models::book::{
        Book, BookDetail, BookDetailInput, BookQuery, BookShort, BookSort, BookView, CreateBook,
        NamedRef, UpdateBook,
    },
};

/// Copies on loan, on hold and free to hand out, per book
pub(super) const STOCK_CTE: &str = r#"
    WITH stock AS (
        SELECT i.book_id, i.status, counts.on_loan, counts.on_hold,
               GREATEST(i.quantity - counts.on_loan - counts.on_hold, 0)::BIGINT AS available
        FROM inventories i
        CROSS JOIN LATERAL (
            SELECT (SELECT COUNT(*) FROM loans l
                     WHERE l.book_id = i.book_id AND l.status IN ('active', 'overdue')) AS on_loan,
                   (SELECT COUNT(*) FROM reservations r
                     WHERE r.book_id = i.book_id AND r.status = 'approved'
                       AND r.collection_status IS NULL) AS on_hold
        ) counts
    )
"#;

const BOOK_FROM: &str = r#"
    FROM books b
    LEFT JOIN categories c ON c.id = b.category_id
    LEFT JOIN publishers p ON p.id = b.publisher_id
    LEFT JOIN genres g ON g.id = b.genre_id
    LEFT JOIN book_details d ON d.book_id = b.id
    LEFT JOIN stock s ON s.book_id = b.id
"#;

fn push_book_filters<'a>(builder: &mut QueryBuilder<'a, Postgres>, query: &'a BookQuery) {
    builder.push(" WHERE TRUE");

    if let Some(q) = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
        let pattern = format!("%{}%", q.to_lowercase());
        builder
            .push(" AND (to_tsvector('simple', b.title || ' ' || b.isbn) @@ plainto_tsquery('simple', ")
            .push_bind(q)
            .push(") OR to_tsvector('simple', COALESCE(d.description, '')) @@ plainto_tsquery('simple', ")
            .push_bind(q)
            .push(") OR LOWER(b.title) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR b.isbn LIKE ")
            .push_bind(pattern.clone())
            .push(
                " OR EXISTS (SELECT 1 FROM book_authors ba JOIN authors a ON a.id = ba.author_id \
                 WHERE ba.book_id = b.id AND LOWER(a.name) LIKE ",
            )
            .push_bind(pattern)
            .push("))");
    }
    if let Some(id) = query.category_id {
        builder.push(" AND b.category_id = ").push_bind(id);
    }
    if let Some(id) = query.publisher_id {
        builder.push(" AND b.publisher_id = ").push_bind(id);
    }
    if let Some(id) = query.genre_id {
        builder.push(" AND b.genre_id = ").push_bind(id);
    }
    if let Some(id) = query.author_id {
        builder
            .push(" AND EXISTS (SELECT 1 FROM book_authors ba WHERE ba.book_id = b.id AND ba.author_id = ")
            .push_bind(id)
            .push(")");
    }
    if let Some(year) = query.publication_year {
        builder.push(" AND b.publication_year = ").push_bind(year);
    }
    if query.available_only.unwrap_or(false) {
        builder.push(" AND COALESCE(s.available, 0) > 0 AND s.status NOT IN ('perdido', 'danado')");
    }
}

impl Repository {
    /// Search the catalog with pagination
    pub async fn books_search(&self, query: &BookQuery) -> AppResult<(Vec<BookShort>, i64)> {
        let (_, per_page, offset) = paginate(query.page, query.per_page);

        let mut count = QueryBuilder::<Postgres>::new(STOCK_CTE);
        count.push("SELECT COUNT(*)").push(BOOK_FROM);
        push_book_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(STOCK_CTE);
        select.push(
            r#"
            SELECT b.id, b.title, b.isbn, b.folio, b.publication_year,
                   c.name AS category, p.name AS publisher, g.name AS genre,
                   ARRAY(SELECT a.name FROM book_authors ba JOIN authors a ON a.id = ba.author_id
                          WHERE ba.book_id = b.id ORDER BY ba.position, a.name) AS authors,
                   s.status AS availability_status,
                   COALESCE(s.available, 0) AS available,
                   (COALESCE(s.available, 0) > 0 AND s.status NOT IN ('perdido', 'danado')) AS is_available
            "#,
        );
        select.push(BOOK_FROM);
        push_book_filters(&mut select, query);

        let q = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
        match (query.sort.unwrap_or_default(), q) {
            (BookSort::Relevance, Some(q)) => {
                select
                    .push(" ORDER BY ts_rank(to_tsvector('simple', b.title || ' ' || b.isbn), plainto_tsquery('simple', ")
                    .push_bind(q)
                    .push(")) DESC, b.title");
            }
            (BookSort::Year, _) => {
                select.push(" ORDER BY b.publication_year DESC NULLS LAST, b.title");
            }
            (BookSort::Newest, _) => {
                select.push(" ORDER BY b.created_at DESC, b.id DESC");
            }
            _ => {
                select.push(" ORDER BY LOWER(b.title), b.id");
            }
        }
        select
            .push(" LIMIT ")
            .push_bind(per_page)
            .push(" OFFSET ")
            .push_bind(offset);

        let books = select.build_query_as::<BookShort>().fetch_all(&self.pool).await?;

        Ok((books, total))
    }

    /// Get a book row by ID
    pub async fn books_get_by_id(&self, id: i32) -> AppResult<Book> {
        sqlx::query_as::<_, Book>("SELECT * FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Get a book with its relations, detail and inventory
    pub async fn books_get_view(&self, id: i32) -> AppResult<BookView> {
        let book = self.books_get_by_id(id).await?;

        let authors = sqlx::query_as::<_, NamedRef>(
            r#"
            SELECT a.id, a.name
            FROM book_authors ba
            JOIN authors a ON a.id = ba.author_id
            WHERE ba.book_id = $1
            ORDER BY ba.position, a.name
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let category = self.books_named_ref("categories", book.category_id).await?;
        let publisher = self.books_named_ref("publishers", book.publisher_id).await?;
        let genre = self.books_named_ref("genres", book.genre_id).await?;

        let detail = sqlx::query_as::<_, BookDetail>("SELECT * FROM book_details WHERE book_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let inventory = match self.inventory_view(id).await {
            Ok(view) => Some(view),
            Err(AppError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        Ok(BookView {
            book,
            authors,
            category,
            publisher,
            genre,
            detail,
            inventory,
        })
    }

    async fn books_named_ref(&self, table: &'static str, id: Option<i32>) -> AppResult<Option<NamedRef>> {
        let Some(id) = id else {
            return Ok(None);
        };

        let query = format!("SELECT id, name FROM {} WHERE id = $1", table);
        let named = sqlx::query_as::<_, NamedRef>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(named)
    }

    /// Check if an ISBN or folio is already used by another book
    pub async fn books_identity_exists(
        &self,
        isbn: Option<&str>,
        folio: Option<&str>,
        exclude_id: Option<i32>,
    ) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM books
                WHERE (isbn = $1 OR folio = $2)
                  AND ($3::INTEGER IS NULL OR id != $3)
            )
            "#,
        )
        .bind(isbn)
        .bind(folio)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    /// Insert the book row
    pub async fn books_insert(&self, conn: &mut PgConnection, book: &CreateBook, isbn: &str) -> AppResult<Book> {
        let created = sqlx::query_as::<_, Book>(
            r#"
            INSERT INTO books (title, isbn, folio, publication_year, category_id, publisher_id, genre_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(book.title.trim())
        .bind(isbn)
        .bind(&book.folio)
        .bind(book.publication_year)
        .bind(book.category_id)
        .bind(book.publisher_id)
        .bind(book.genre_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(created)
    }

    /// Update the book row; `isbn` is the normalized value when it changes
    pub async fn books_update_row(
        &self,
        conn: &mut PgConnection,
        id: i32,
        book: &UpdateBook,
        isbn: Option<&str>,
    ) -> AppResult<Book> {
        let now = Utc::now();

        let mut sets = vec!["updated_at = $1".to_string()];
        let mut param_idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, param_idx));
                    param_idx += 1;
                }
            };
        }

        add_field!(book.title, "title");
        add_field!(isbn, "isbn");
        add_field!(book.folio, "folio");
        add_field!(book.publication_year, "publication_year");
        add_field!(book.category_id, "category_id");
        add_field!(book.publisher_id, "publisher_id");
        add_field!(book.genre_id, "genre_id");

        let query = format!(
            "UPDATE books SET {} WHERE id = ${} RETURNING *",
            sets.join(", "),
            param_idx
        );

        let mut builder = sqlx::query_as::<_, Book>(&query).bind(now);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(book.title);
        bind_field!(isbn);
        bind_field!(book.folio);
        bind_field!(book.publication_year);
        bind_field!(book.category_id);
        bind_field!(book.publisher_id);
        bind_field!(book.genre_id);

        builder
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    /// Create or replace the detail row of a book
    pub async fn books_upsert_detail(
        &self,
        conn: &mut PgConnection,
        book_id: i32,
        detail: &BookDetailInput,
    ) -> AppResult<BookDetail> {
        let saved = sqlx::query_as::<_, BookDetail>(
            r#"
            INSERT INTO book_details (book_id, description, pages, language, edition, location, cover_image_path)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (book_id) DO UPDATE SET
                description = EXCLUDED.description,
                pages = EXCLUDED.pages,
                language = EXCLUDED.language,
                edition = EXCLUDED.edition,
                location = EXCLUDED.location,
                cover_image_path = EXCLUDED.cover_image_path,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(book_id)
        .bind(&detail.description)
        .bind(detail.pages)
        .bind(&detail.language)
        .bind(&detail.edition)
        .bind(&detail.location)
        .bind(&detail.cover_image_path)
        .fetch_one(&mut *conn)
        .await?;

        Ok(saved)
    }

    /// Replace the author list of a book, keeping the given order
    pub async fn books_set_authors(&self, conn: &mut PgConnection, book_id: i32, author_ids: &[i32]) -> AppResult<()> {
        sqlx::query("DELETE FROM book_authors WHERE book_id = $1")
            .bind(book_id)
            .execute(&mut *conn)
            .await?;

        let mut seen = Vec::with_capacity(author_ids.len());
        for author_id in author_ids {
            if seen.contains(author_id) {
                continue;
            }
            seen.push(*author_id);

            sqlx::query("INSERT INTO book_authors (book_id, author_id, position) VALUES ($1, $2, $3)")
                .bind(book_id)
                .bind(author_id)
                .bind((seen.len() - 1) as i16)
                .execute(&mut *conn)
                .await?;
        }

        Ok(())
    }

    /// Delete a book. Detail, inventory, author links, reservations and
    /// loans are removed with it.
    pub async fn books_delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }

        Ok(())
    }
}
