//! User administration endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::user::{CreateUser, RequestContext, UpdateUser, User, UserQuery, UserShort, UserWithActivation},
};

use super::PaginatedResponse;

/// List users with search and pagination
#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    params(UserQuery),
    responses(
        (status = 200, description = "List of users", body = PaginatedResponse<UserShort>),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn list_users(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<UserQuery>,
) -> AppResult<Json<PaginatedResponse<UserShort>>> {
    let (page, per_page) = (query.page, query.per_page);
    let (users, total) = state.services.users.search_users(&ctx, query).await?;

    Ok(Json(PaginatedResponse::new(users, total, page, per_page)))
}

/// Get user details by ID
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User details", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_user(&ctx, id).await?;
    Ok(Json(user))
}

/// Create an inactive account and issue its activation link
#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    security(("bearer_auth" = [])),
    request_body = CreateUser,
    responses(
        (status = 201, description = "User created", body = UserWithActivation),
        (status = 403, description = "Admin role required"),
        (status = 409, description = "Matricula or email already exists"),
        (status = 422, description = "Invalid fields")
    )
)]
pub async fn create_user(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Json(user): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<UserWithActivation>)> {
    let created = state.services.users.create_user(&ctx, user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update an existing user
#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateUser,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 404, description = "User not found"),
        (status = 422, description = "Last active administrator cannot be demoted")
    )
)]
pub async fn update_user(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(user): Json<UpdateUser>,
) -> AppResult<Json<User>> {
    let updated = state.services.users.update_user(&ctx, id, user).await?;
    Ok(Json(updated))
}

/// Delete a user with their reservations and loans
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User deleted"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Cannot delete yourself or the last administrator")
    )
)]
pub async fn delete_user(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.users.delete_user(&ctx, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Issue a fresh activation link for an inactive account
#[utoipa::path(
    post,
    path = "/users/{id}/activation",
    tag = "users",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "New activation link", body = UserWithActivation),
        (status = 404, description = "User not found"),
        (status = 422, description = "Account is already active")
    )
)]
pub async fn regenerate_activation(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<UserWithActivation>> {
    let user = state.services.users.regenerate_activation(&ctx, id).await?;
    Ok(Json(user))
}
