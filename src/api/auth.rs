//! Authentication and account activation endpoints

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::user::{ActivateAccount, ActivationInfo, RequestContext, User},
    services::auth::{ActivationLookup, ActivationOutcome, LOGIN_ROUTE},
};

/// Login request body
#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Email address or matricula
    pub login: String,
    pub password: String,
}

/// Login response with JWT token
#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: String,
    /// Where the client should send the user after signing in
    pub landing_route: String,
    pub user: User,
}

impl LoginResponse {
    fn new(token: String, user: User) -> Self {
        Self {
            token,
            token_type: "Bearer".to_string(),
            landing_route: user.role.landing_route().to_string(),
            user,
        }
    }
}

/// Current user with their landing route
#[derive(Serialize, ToSchema)]
pub struct MeResponse {
    pub landing_route: String,
    pub user: User,
}

/// Authenticate by email or matricula
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials or inactive account"),
        (status = 429, description = "Login locked after too many failures")
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, user) = state
        .services
        .auth
        .login(&request.login, &request.password)
        .await?;

    Ok(Json(LoginResponse::new(token, user)))
}

/// Get the current user
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = MeResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me(State(state): State<crate::AppState>, ctx: RequestContext) -> AppResult<Json<MeResponse>> {
    let user = state.services.auth.me(&ctx).await?;
    Ok(Json(MeResponse {
        landing_route: user.role.landing_route().to_string(),
        user,
    }))
}

/// Resolve an activation link.
///
/// A link that was already used redirects to the login page.
#[utoipa::path(
    get,
    path = "/auth/activate/{token}",
    tag = "auth",
    params(
        ("token" = String, Path, description = "Activation token")
    ),
    responses(
        (status = 200, description = "Account waiting for activation", body = ActivationInfo),
        (status = 303, description = "Account already activated, go to login"),
        (status = 404, description = "Unknown activation link")
    )
)]
pub async fn show_activation(
    State(state): State<crate::AppState>,
    Path(token): Path<String>,
) -> AppResult<Response> {
    match state.services.auth.show_activation(&token).await? {
        ActivationLookup::Pending(user) => Ok(Json(ActivationInfo::from(&user)).into_response()),
        ActivationLookup::AlreadyActivated => Ok(Redirect::to(LOGIN_ROUTE).into_response()),
    }
}

/// Complete an activation and sign the user in
#[utoipa::path(
    post,
    path = "/auth/activate/{token}",
    tag = "auth",
    params(
        ("token" = String, Path, description = "Activation token")
    ),
    request_body = ActivateAccount,
    responses(
        (status = 200, description = "Account activated", body = LoginResponse),
        (status = 303, description = "Account already activated, go to login"),
        (status = 404, description = "Unknown activation link"),
        (status = 409, description = "Email already in use"),
        (status = 422, description = "Invalid fields")
    )
)]
pub async fn activate(
    State(state): State<crate::AppState>,
    Path(token): Path<String>,
    Json(form): Json<ActivateAccount>,
) -> AppResult<Response> {
    match state.services.auth.activate(&token, form).await? {
        ActivationOutcome::Activated { token, user } => {
            Ok(Json(LoginResponse::new(token, user)).into_response())
        }
        ActivationOutcome::AlreadyActivated => Ok(Redirect::to(LOGIN_ROUTE).into_response()),
    }
}
