//! Author endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        author::{Author, AuthorInput, AuthorQuery, AuthorShort},
        taxonomy::QuickCreate,
        user::RequestContext,
    },
};

use super::{taxonomy::QuickCreateResponse, PaginatedResponse};

/// List authors with their book counts
#[utoipa::path(
    get,
    path = "/authors",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(AuthorQuery),
    responses(
        (status = 200, description = "List of authors", body = PaginatedResponse<AuthorShort>)
    )
)]
pub async fn list_authors(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<AuthorQuery>,
) -> AppResult<Json<PaginatedResponse<AuthorShort>>> {
    ctx.require_staff()?;
    let (authors, total) = state.services.catalog.search_authors(&query).await?;

    Ok(Json(PaginatedResponse::new(authors, total, query.page, query.per_page)))
}

#[utoipa::path(
    get,
    path = "/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Author ID")
    ),
    responses(
        (status = 200, description = "Author details", body = Author),
        (status = 404, description = "Author not found")
    )
)]
pub async fn get_author(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<Author>> {
    ctx.require_staff()?;
    let author = state.services.catalog.get_author(id).await?;
    Ok(Json(author))
}

#[utoipa::path(
    post,
    path = "/authors",
    tag = "authors",
    security(("bearer_auth" = [])),
    request_body = AuthorInput,
    responses(
        (status = 201, description = "Author created", body = Author),
        (status = 409, description = "Name already exists"),
        (status = 422, description = "Invalid fields")
    )
)]
pub async fn create_author(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Json(data): Json<AuthorInput>,
) -> AppResult<(StatusCode, Json<Author>)> {
    let author = state.services.catalog.create_author(&ctx, data).await?;
    Ok((StatusCode::CREATED, Json(author)))
}

#[utoipa::path(
    put,
    path = "/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Author ID")
    ),
    request_body = AuthorInput,
    responses(
        (status = 200, description = "Author updated", body = Author),
        (status = 404, description = "Author not found")
    )
)]
pub async fn update_author(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(data): Json<AuthorInput>,
) -> AppResult<Json<Author>> {
    let author = state.services.catalog.update_author(&ctx, id, data).await?;
    Ok(Json(author))
}

/// Delete an author; their books lose the attribution
#[utoipa::path(
    delete,
    path = "/authors/{id}",
    tag = "authors",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Author ID")
    ),
    responses(
        (status = 204, description = "Author deleted"),
        (status = 404, description = "Author not found")
    )
)]
pub async fn delete_author(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_author(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Inline creation from the book form
#[utoipa::path(
    post,
    path = "/authors/quick",
    tag = "authors",
    security(("bearer_auth" = [])),
    request_body = QuickCreate,
    responses(
        (status = 201, description = "Author created", body = QuickCreateResponse),
        (status = 200, description = "Existing author with the same name", body = QuickCreateResponse)
    )
)]
pub async fn quick_create_author(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Json(data): Json<QuickCreate>,
) -> AppResult<(StatusCode, Json<QuickCreateResponse>)> {
    let (reference, created) = state.services.catalog.quick_create_author(&ctx, data).await?;
    Ok(QuickCreateResponse::into_reply(reference, created))
}
