//! Category, publisher and genre endpoints.
//!
//! The same handlers serve `/categories`, `/publishers` and `/genres`; the
//! router attaches the matching [`TaxonomyKind`] as a request extension.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        book::NamedRef,
        taxonomy::{QuickCreate, TaxonomyKind, Term, TermInput},
        user::RequestContext,
    },
};

/// Quick-create result; `created` is false when the name already existed
#[derive(Serialize, ToSchema)]
pub struct QuickCreateResponse {
    pub id: i32,
    pub name: String,
    pub created: bool,
}

impl QuickCreateResponse {
    pub fn into_reply(reference: NamedRef, created: bool) -> (StatusCode, Json<Self>) {
        let status = if created { StatusCode::CREATED } else { StatusCode::OK };
        (
            status,
            Json(Self {
                id: reference.id,
                name: reference.name,
                created,
            }),
        )
    }
}

/// List the terms of one taxonomy
#[utoipa::path(
    get,
    path = "/{kind}",
    tag = "taxonomy",
    security(("bearer_auth" = [])),
    params(
        ("kind" = TaxonomyKind, Path, description = "categories, publishers or genres")
    ),
    responses(
        (status = 200, description = "Terms with their book counts", body = Vec<Term>)
    )
)]
pub async fn list_terms(
    State(state): State<crate::AppState>,
    Extension(kind): Extension<TaxonomyKind>,
    ctx: RequestContext,
) -> AppResult<Json<Vec<Term>>> {
    ctx.require_staff()?;
    let terms = state.services.catalog.list_terms(kind).await?;
    Ok(Json(terms))
}

#[utoipa::path(
    get,
    path = "/{kind}/{id}",
    tag = "taxonomy",
    security(("bearer_auth" = [])),
    params(
        ("kind" = TaxonomyKind, Path, description = "categories, publishers or genres"),
        ("id" = i32, Path, description = "Term ID")
    ),
    responses(
        (status = 200, description = "Term details", body = Term),
        (status = 404, description = "Term not found")
    )
)]
pub async fn get_term(
    State(state): State<crate::AppState>,
    Extension(kind): Extension<TaxonomyKind>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<Term>> {
    ctx.require_staff()?;
    let term = state.services.catalog.get_term(kind, id).await?;
    Ok(Json(term))
}

#[utoipa::path(
    post,
    path = "/{kind}",
    tag = "taxonomy",
    security(("bearer_auth" = [])),
    params(
        ("kind" = TaxonomyKind, Path, description = "categories, publishers or genres")
    ),
    request_body = TermInput,
    responses(
        (status = 201, description = "Term created", body = Term),
        (status = 409, description = "Name already exists"),
        (status = 422, description = "Invalid fields")
    )
)]
pub async fn create_term(
    State(state): State<crate::AppState>,
    Extension(kind): Extension<TaxonomyKind>,
    ctx: RequestContext,
    Json(data): Json<TermInput>,
) -> AppResult<(StatusCode, Json<Term>)> {
    let term = state.services.catalog.create_term(&ctx, kind, data).await?;
    Ok((StatusCode::CREATED, Json(term)))
}

#[utoipa::path(
    put,
    path = "/{kind}/{id}",
    tag = "taxonomy",
    security(("bearer_auth" = [])),
    params(
        ("kind" = TaxonomyKind, Path, description = "categories, publishers or genres"),
        ("id" = i32, Path, description = "Term ID")
    ),
    request_body = TermInput,
    responses(
        (status = 200, description = "Term updated", body = Term),
        (status = 404, description = "Term not found"),
        (status = 409, description = "Name already exists")
    )
)]
pub async fn update_term(
    State(state): State<crate::AppState>,
    Extension(kind): Extension<TaxonomyKind>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(data): Json<TermInput>,
) -> AppResult<Json<Term>> {
    let term = state.services.catalog.update_term(&ctx, kind, id, data).await?;
    Ok(Json(term))
}

/// Delete a term; books referring to it keep existing without it
#[utoipa::path(
    delete,
    path = "/{kind}/{id}",
    tag = "taxonomy",
    security(("bearer_auth" = [])),
    params(
        ("kind" = TaxonomyKind, Path, description = "categories, publishers or genres"),
        ("id" = i32, Path, description = "Term ID")
    ),
    responses(
        (status = 204, description = "Term deleted"),
        (status = 404, description = "Term not found")
    )
)]
pub async fn delete_term(
    State(state): State<crate::AppState>,
    Extension(kind): Extension<TaxonomyKind>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.catalog.delete_term(&ctx, kind, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Inline creation from the book form
#[utoipa::path(
    post,
    path = "/{kind}/quick",
    tag = "taxonomy",
    security(("bearer_auth" = [])),
    params(
        ("kind" = TaxonomyKind, Path, description = "categories, publishers or genres")
    ),
    request_body = QuickCreate,
    responses(
        (status = 201, description = "Term created", body = QuickCreateResponse),
        (status = 200, description = "Existing term with the same name", body = QuickCreateResponse)
    )
)]
pub async fn quick_create_term(
    State(state): State<crate::AppState>,
    Extension(kind): Extension<TaxonomyKind>,
    ctx: RequestContext,
    Json(data): Json<QuickCreate>,
) -> AppResult<(StatusCode, Json<QuickCreateResponse>)> {
    let (reference, created) = state.services.catalog.quick_create_term(&ctx, kind, data).await?;
    Ok(QuickCreateResponse::into_reply(reference, created))
}
