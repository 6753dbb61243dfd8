//! Reader self-service endpoints

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::Multipart;

use utoipa::ToSchema;

use crate::{
    error::{AppError, AppResult},
    models::{
        loan::{LoanDetails, LoanQuery},
        reservation::{ReservationDetails, ReservationQuery},
        user::{RequestContext, User},
    },
    services::users::CREDENTIAL_FIELD,
};

use super::PaginatedResponse;

/// Multipart body of a credential upload
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct CredentialUpload {
    /// Scan of the school credential (jpg, png or pdf)
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

/// The caller's loans
#[utoipa::path(
    get,
    path = "/me/loans",
    tag = "me",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "Own loans", body = PaginatedResponse<LoanDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_loans(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    let (page, per_page) = (query.page, query.per_page);
    let (loans, total) = state.services.loans.my_loans(&ctx, query).await?;

    Ok(Json(PaginatedResponse::new(loans, total, page, per_page)))
}

/// The caller's reservations
#[utoipa::path(
    get,
    path = "/me/reservations",
    tag = "me",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "Own reservations", body = PaginatedResponse<ReservationDetails>),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn my_reservations(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<PaginatedResponse<ReservationDetails>>> {
    let (page, per_page) = (query.page, query.per_page);
    let (reservations, total) = state.services.reservations.my_reservations(&ctx, query).await?;

    Ok(Json(PaginatedResponse::new(reservations, total, page, per_page)))
}

/// Upload the school credential (jpg, png or pdf) as a multipart `file` field.
///
/// A new upload replaces the previous one and must be verified again.
#[utoipa::path(
    post,
    path = "/me/credential",
    tag = "me",
    security(("bearer_auth" = [])),
    request_body(content = CredentialUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Credential stored", body = User),
        (status = 400, description = "Malformed multipart body or missing file field"),
        (status = 422, description = "Empty, oversized or unsupported file")
    )
)]
pub async fn upload_credential(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    mut multipart: Multipart,
) -> AppResult<Json<User>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(CREDENTIAL_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;

        let user = state
            .services
            .users
            .upload_credential(&ctx, &file_name, &content)
            .await?;
        return Ok(Json(user));
    }

    Err(AppError::BadRequest(format!(
        "Missing `{}` field in multipart body",
        CREDENTIAL_FIELD
    )))
}
