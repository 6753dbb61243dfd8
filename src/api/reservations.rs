//! Reservation endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::{
        loan::LoanDetails,
        reservation::{CollectReservation, CreateReservation, ReservationDetails, ReservationQuery},
        user::{RequestContext, User},
    },
    services::reservations::ExpiredHolds,
};

use super::PaginatedResponse;

/// Result of verifying a reader's credential
#[derive(Serialize, ToSchema)]
pub struct CredentialVerified {
    pub user: User,
    /// Reservations moved from `pending_credential` to `pending`
    pub promoted_reservations: u64,
}

/// Staff listing with filters
#[utoipa::path(
    get,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(ReservationQuery),
    responses(
        (status = 200, description = "List of reservations", body = PaginatedResponse<ReservationDetails>),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn list_reservations(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<ReservationQuery>,
) -> AppResult<Json<PaginatedResponse<ReservationDetails>>> {
    let (reservations, total) = state.services.reservations.list_reservations(&ctx, &query).await?;

    Ok(Json(PaginatedResponse::new(reservations, total, query.page, query.per_page)))
}

/// Reserve a book.
///
/// Readers reserve for themselves; staff may pass `user_id`.
#[utoipa::path(
    post,
    path = "/reservations",
    tag = "reservations",
    security(("bearer_auth" = [])),
    request_body = CreateReservation,
    responses(
        (status = 201, description = "Reservation created", body = ReservationDetails),
        (status = 400, description = "Planned return date is not in the future"),
        (status = 404, description = "Book not found"),
        (status = 409, description = "Already reserved or book unavailable")
    )
)]
pub async fn create_reservation(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Json(data): Json<CreateReservation>,
) -> AppResult<(StatusCode, Json<ReservationDetails>)> {
    let reservation = state.services.reservations.create_reservation(&ctx, data).await?;
    Ok((StatusCode::CREATED, Json(reservation)))
}

#[utoipa::path(
    get,
    path = "/reservations/{id}",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation details", body = ReservationDetails),
        (status = 403, description = "Not your reservation"),
        (status = 404, description = "Reservation not found")
    )
)]
pub async fn get_reservation(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.get_reservation(&ctx, id).await?;
    Ok(Json(reservation))
}

/// Approve a pending reservation and hold a copy
#[utoipa::path(
    post,
    path = "/reservations/{id}/approve",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation approved", body = ReservationDetails),
        (status = 409, description = "No copy available or invalid transition")
    )
)]
pub async fn approve_reservation(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.approve(&ctx, id).await?;
    Ok(Json(reservation))
}

#[utoipa::path(
    post,
    path = "/reservations/{id}/reject",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation rejected", body = ReservationDetails),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn reject_reservation(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.reject(&ctx, id).await?;
    Ok(Json(reservation))
}

/// Cancel a reservation; allowed for its owner and for staff
#[utoipa::path(
    post,
    path = "/reservations/{id}/cancel",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Reservation cancelled", body = ReservationDetails),
        (status = 403, description = "Not your reservation"),
        (status = 409, description = "Invalid transition")
    )
)]
pub async fn cancel_reservation(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.cancel(&ctx, id).await?;
    Ok(Json(reservation))
}

/// The reader picked the book up; opens the loan
#[utoipa::path(
    post,
    path = "/reservations/{id}/collect",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    request_body = CollectReservation,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 409, description = "Reservation is not an open hold")
    )
)]
pub async fn collect_reservation(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(data): Json<CollectReservation>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    let loan = state.services.reservations.mark_collected(&ctx, id, data).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// The reader never came; the held copy is released
#[utoipa::path(
    post,
    path = "/reservations/{id}/not-collected",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Reservation ID")
    ),
    responses(
        (status = 200, description = "Hold released", body = ReservationDetails),
        (status = 409, description = "Reservation is not an open hold")
    )
)]
pub async fn not_collected_reservation(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<ReservationDetails>> {
    let reservation = state.services.reservations.mark_not_collected(&ctx, id).await?;
    Ok(Json(reservation))
}

/// Expire every reservation whose hold window has passed
#[utoipa::path(
    post,
    path = "/reservations/expire",
    tag = "reservations",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Expired reservations", body = ExpiredHolds),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn expire_reservations(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
) -> AppResult<Json<ExpiredHolds>> {
    let result = state.services.reservations.expire_holds(&ctx).await?;
    Ok(Json(result))
}

/// Verify a reader's uploaded credential and release their waiting reservations
#[utoipa::path(
    post,
    path = "/users/{id}/verify-credential",
    tag = "reservations",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Credential verified", body = CredentialVerified),
        (status = 404, description = "User not found"),
        (status = 422, description = "No credential uploaded")
    )
)]
pub async fn verify_credential(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<CredentialVerified>> {
    let (user, promoted_reservations) = state.services.reservations.verify_credential(&ctx, id).await?;
    Ok(Json(CredentialVerified {
        user,
        promoted_reservations,
    }))
}
