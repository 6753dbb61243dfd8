//! Catalog service: books, authors, taxonomy terms and inventory

use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        author::{Author, AuthorInput, AuthorQuery, AuthorShort},
        book::{normalize_isbn, BookQuery, BookShort, BookView, CreateBook, NamedRef, UpdateBook},
        enums::{InventoryCondition, InventoryStatus},
        inventory::{Availability, InventoryView, UpdateInventory},
        taxonomy::{QuickCreate, TaxonomyKind, Term, TermInput},
        user::RequestContext,
    },
    repository::Repository,
};

/// Status to store after a staff inventory update.
///
/// `perdido` and `danado` chosen by staff are kept; any other requested
/// status is re-derived from the counts. A quantity change lifts a `perdido`
/// that only meant "no copies left".
fn updated_status(
    current: InventoryStatus,
    requested: Option<InventoryStatus>,
    quantity_changed: bool,
    availability: &Availability,
) -> InventoryStatus {
    match requested {
        Some(status) if status.is_manual_hold() => status,
        Some(_) => availability.derive_status(InventoryStatus::Disponible),
        None if quantity_changed && current == InventoryStatus::Perdido => {
            availability.derive_status(InventoryStatus::Disponible)
        }
        None => availability.derive_status(current),
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
}

impl CatalogService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    // ---------------------------------------------------------------------
    // Books
    // ---------------------------------------------------------------------

    /// Public catalog search
    pub async fn search_books(&self, query: &BookQuery) -> AppResult<(Vec<BookShort>, i64)> {
        self.repository.books_search(query).await
    }

    pub async fn get_book(&self, id: i32) -> AppResult<BookView> {
        self.repository.books_get_view(id).await
    }

    /// Create a book with its detail, inventory and authors in one transaction
    pub async fn create_book(&self, ctx: &RequestContext, data: CreateBook) -> AppResult<BookView> {
        ctx.require_staff()?;
        data.validate()?;

        let isbn = normalize_isbn(&data.isbn)
            .ok_or_else(|| AppError::validation("isbn", format!("Invalid ISBN: {}", data.isbn)))?;

        if self
            .repository
            .books_identity_exists(Some(&isbn), data.folio.as_deref(), None)
            .await?
        {
            return Err(AppError::Conflict("A book with this ISBN or folio already exists".to_string()));
        }

        self.ensure_references(data.category_id, data.publisher_id, data.genre_id, Some(data.author_ids.as_slice()))
            .await?;

        let mut tx = self.repository.begin().await?;

        let book = self.repository.books_insert(&mut tx, &data, &isbn).await?;
        if let Some(ref detail) = data.detail {
            self.repository.books_upsert_detail(&mut tx, book.id, detail).await?;
        }
        self.repository
            .inventory_create(
                &mut tx,
                book.id,
                data.quantity.unwrap_or(1),
                data.condition.unwrap_or(InventoryCondition::Nuevo),
            )
            .await?;
        self.repository.books_set_authors(&mut tx, book.id, &data.author_ids).await?;

        tx.commit().await?;

        tracing::info!(book_id = book.id, isbn = %book.isbn, created_by = ctx.user_id, "Book created");
        self.repository.books_get_view(book.id).await
    }

    pub async fn update_book(&self, ctx: &RequestContext, id: i32, data: UpdateBook) -> AppResult<BookView> {
        ctx.require_staff()?;
        data.validate()?;

        let isbn = match data.isbn {
            Some(ref raw) => Some(
                normalize_isbn(raw).ok_or_else(|| AppError::validation("isbn", format!("Invalid ISBN: {}", raw)))?,
            ),
            None => None,
        };

        if (isbn.is_some() || data.folio.is_some())
            && self
                .repository
                .books_identity_exists(isbn.as_deref(), data.folio.as_deref(), Some(id))
                .await?
        {
            return Err(AppError::Conflict("A book with this ISBN or folio already exists".to_string()));
        }

        self.ensure_references(data.category_id, data.publisher_id, data.genre_id, data.author_ids.as_deref())
            .await?;

        let mut tx = self.repository.begin().await?;

        self.repository
            .books_update_row(&mut tx, id, &data, isbn.as_deref())
            .await?;
        if let Some(ref detail) = data.detail {
            self.repository.books_upsert_detail(&mut tx, id, detail).await?;
        }
        if let Some(ref author_ids) = data.author_ids {
            self.repository.books_set_authors(&mut tx, id, author_ids).await?;
        }

        tx.commit().await?;

        tracing::info!(book_id = id, updated_by = ctx.user_id, "Book updated");
        self.repository.books_get_view(id).await
    }

    /// Delete a book and everything it owns
    pub async fn delete_book(&self, ctx: &RequestContext, id: i32) -> AppResult<()> {
        ctx.require_staff()?;
        self.repository.books_delete(id).await?;
        tracing::info!(book_id = id, deleted_by = ctx.user_id, "Book deleted");
        Ok(())
    }

    async fn ensure_references(
        &self,
        category_id: Option<i32>,
        publisher_id: Option<i32>,
        genre_id: Option<i32>,
        author_ids: Option<&[i32]>,
    ) -> AppResult<()> {
        for (kind, id) in [
            (TaxonomyKind::Categories, category_id),
            (TaxonomyKind::Publishers, publisher_id),
            (TaxonomyKind::Genres, genre_id),
        ] {
            if let Some(id) = id {
                if !self.repository.taxonomy_exists(kind, id).await? {
                    return Err(AppError::NotFound(format!("{} with id {} not found", kind.label(), id)));
                }
            }
        }

        if let Some(ids) = author_ids.filter(|ids| !ids.is_empty()) {
            let mut unique = ids.to_vec();
            unique.sort_unstable();
            unique.dedup();
            if self.repository.authors_count_existing(&unique).await? != unique.len() as i64 {
                return Err(AppError::NotFound("One or more authors do not exist".to_string()));
            }
        }

        Ok(())
    }

    // ---------------------------------------------------------------------
    // Inventory
    // ---------------------------------------------------------------------

    pub async fn get_inventory(&self, ctx: &RequestContext, book_id: i32) -> AppResult<InventoryView> {
        ctx.require_staff()?;
        self.repository.inventory_view(book_id).await
    }

    /// Update stock, condition or status of a book.
    ///
    /// The quantity can never drop below the copies out on loan or on hold.
    pub async fn update_inventory(
        &self,
        ctx: &RequestContext,
        book_id: i32,
        data: UpdateInventory,
    ) -> AppResult<InventoryView> {
        ctx.require_staff()?;
        data.validate()?;

        let mut tx = self.repository.begin().await?;

        let inventory = self.repository.inventory_lock(&mut tx, book_id).await?;
        let current = self.repository.inventory_availability(&mut tx, &inventory).await?;

        let quantity = data.quantity.unwrap_or(inventory.quantity);
        if i64::from(quantity) < current.outstanding() {
            return Err(AppError::BusinessRule(format!(
                "Quantity {} is below the {} copies on loan or on hold",
                quantity,
                current.outstanding()
            )));
        }

        let availability = Availability::new(quantity, current.on_loan, current.on_hold);
        let status = updated_status(
            inventory.status,
            data.status,
            quantity != inventory.quantity,
            &availability,
        );

        let updated = self
            .repository
            .inventory_update(
                &mut tx,
                &inventory,
                &UpdateInventory {
                    quantity: Some(quantity),
                    condition: data.condition,
                    status: Some(status),
                },
            )
            .await?;

        tx.commit().await?;

        tracing::info!(
            book_id,
            quantity,
            status = %status,
            updated_by = ctx.user_id,
            "Inventory updated"
        );
        Ok(InventoryView::new(updated, availability))
    }

    // ---------------------------------------------------------------------
    // Authors
    // ---------------------------------------------------------------------

    pub async fn search_authors(&self, query: &AuthorQuery) -> AppResult<(Vec<AuthorShort>, i64)> {
        self.repository.authors_search(query).await
    }

    pub async fn get_author(&self, id: i32) -> AppResult<Author> {
        self.repository.authors_get_by_id(id).await
    }

    pub async fn create_author(&self, ctx: &RequestContext, data: AuthorInput) -> AppResult<Author> {
        ctx.require_staff()?;
        data.validate()?;
        self.repository.authors_create(&data).await
    }

    pub async fn update_author(&self, ctx: &RequestContext, id: i32, data: AuthorInput) -> AppResult<Author> {
        ctx.require_staff()?;
        data.validate()?;
        self.repository.authors_update(id, &data).await
    }

    pub async fn delete_author(&self, ctx: &RequestContext, id: i32) -> AppResult<()> {
        ctx.require_staff()?;
        self.repository.authors_delete(id).await
    }

    /// Inline creation from the book form; an existing name returns the existing author
    pub async fn quick_create_author(&self, ctx: &RequestContext, data: QuickCreate) -> AppResult<(NamedRef, bool)> {
        ctx.require_staff()?;
        data.validate()?;
        self.repository.authors_find_or_create(&data.name).await
    }

    // ---------------------------------------------------------------------
    // Categories, publishers, genres
    // ---------------------------------------------------------------------

    pub async fn list_terms(&self, kind: TaxonomyKind) -> AppResult<Vec<Term>> {
        self.repository.taxonomy_list(kind).await
    }

    pub async fn get_term(&self, kind: TaxonomyKind, id: i32) -> AppResult<Term> {
        self.repository.taxonomy_get(kind, id).await
    }

    pub async fn create_term(&self, ctx: &RequestContext, kind: TaxonomyKind, data: TermInput) -> AppResult<Term> {
        ctx.require_staff()?;
        data.validate()?;
        self.repository.taxonomy_create(kind, &data).await
    }

    pub async fn update_term(
        &self,
        ctx: &RequestContext,
        kind: TaxonomyKind,
        id: i32,
        data: TermInput,
    ) -> AppResult<Term> {
        ctx.require_staff()?;
        data.validate()?;
        self.repository.taxonomy_update(kind, id, &data).await
    }

    pub async fn delete_term(&self, ctx: &RequestContext, kind: TaxonomyKind, id: i32) -> AppResult<()> {
        ctx.require_staff()?;
        self.repository.taxonomy_delete(kind, id).await
    }

    pub async fn quick_create_term(
        &self,
        ctx: &RequestContext,
        kind: TaxonomyKind,
        data: QuickCreate,
    ) -> AppResult<(NamedRef, bool)> {
        ctx.require_staff()?;
        data.validate()?;
        self.repository.taxonomy_find_or_create(kind, &data.name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_can_flag_damaged_copies() {
        let a = Availability::new(3, 0, 0);
        assert_eq!(
            updated_status(InventoryStatus::Disponible, Some(InventoryStatus::Danado), false, &a),
            InventoryStatus::Danado
        );
    }

    #[test]
    fn requested_derived_status_is_recomputed() {
        let a = Availability::new(1, 1, 0);
        assert_eq!(
            updated_status(InventoryStatus::Danado, Some(InventoryStatus::Disponible), false, &a),
            InventoryStatus::Prestado
        );
    }

    #[test]
    fn restocking_lifts_out_of_stock_perdido() {
        let a = Availability::new(2, 0, 0);
        assert_eq!(
            updated_status(InventoryStatus::Perdido, None, true, &a),
            InventoryStatus::Disponible
        );
        assert_eq!(
            updated_status(InventoryStatus::Perdido, None, false, &a),
            InventoryStatus::Perdido
        );
    }
}
