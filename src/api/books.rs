//! Public catalog and staff book management endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        book::{BookQuery, BookShort, BookView, CreateBook, UpdateBook},
        user::RequestContext,
    },
};

use super::PaginatedResponse;

/// Browse and search the catalog; no authentication required
#[utoipa::path(
    get,
    path = "/catalog",
    tag = "catalog",
    params(BookQuery),
    responses(
        (status = 200, description = "Matching books with availability", body = PaginatedResponse<BookShort>)
    )
)]
pub async fn search_catalog(
    State(state): State<crate::AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<BookShort>>> {
    let (books, total) = state.services.catalog.search_books(&query).await?;

    Ok(Json(PaginatedResponse::new(books, total, query.page, query.per_page)))
}

/// Book detail with authors, taxonomy and availability
#[utoipa::path(
    get,
    path = "/catalog/{id}",
    tag = "catalog",
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookView),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_catalog_book(
    State(state): State<crate::AppState>,
    Path(id): Path<i32>,
) -> AppResult<Json<BookView>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Staff listing, same filters as the public catalog
#[utoipa::path(
    get,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    params(BookQuery),
    responses(
        (status = 200, description = "List of books", body = PaginatedResponse<BookShort>),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<BookShort>>> {
    ctx.require_staff()?;
    let (books, total) = state.services.catalog.search_books(&query).await?;

    Ok(Json(PaginatedResponse::new(books, total, query.page, query.per_page)))
}

#[utoipa::path(
    get,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 200, description = "Book details", body = BookView),
        (status = 404, description = "Book not found")
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<BookView>> {
    ctx.require_staff()?;
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a book with its detail, inventory and authors
#[utoipa::path(
    post,
    path = "/books",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book created", body = BookView),
        (status = 404, description = "Referenced author or term not found"),
        (status = 409, description = "ISBN or folio already exists"),
        (status = 422, description = "Invalid fields")
    )
)]
pub async fn create_book(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Json(data): Json<CreateBook>,
) -> AppResult<(StatusCode, Json<BookView>)> {
    let book = state.services.catalog.create_book(&ctx, data).await?;
    Ok((StatusCode::CREATED, Json(book)))
}

#[utoipa::path(
    put,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = BookView),
        (status = 404, description = "Book not found"),
        (status = 409, description = "ISBN or folio already exists")
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(data): Json<UpdateBook>,
) -> AppResult<Json<BookView>> {
    let book = state.services.catalog.update_book(&ctx, id, data).await?;
    Ok(Json(book))
}

/// Delete a book with its inventory, reservations and loans
#[utoipa::path(
    delete,
    path = "/books/{id}",
    tag = "books",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Book ID")
    ),
    responses(
        (status = 204, description = "Book deleted"),
        (status = 404, description = "Book not found")
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_book(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
