//! Loan endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        loan::{CloseLoan, CreateLoan, LoanDetails, LoanQuery, SetFine},
        user::RequestContext,
    },
    services::loans::OverdueSweep,
};

use super::PaginatedResponse;

/// Staff listing with filters
#[utoipa::path(
    get,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(LoanQuery),
    responses(
        (status = 200, description = "List of loans", body = PaginatedResponse<LoanDetails>),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn list_loans(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<LoanQuery>,
) -> AppResult<Json<PaginatedResponse<LoanDetails>>> {
    let (loans, total) = state.services.loans.list_loans(&ctx, &query).await?;

    Ok(Json(PaginatedResponse::new(loans, total, query.page, query.per_page)))
}

/// Lend a copy at the desk, without a reservation
#[utoipa::path(
    post,
    path = "/loans",
    tag = "loans",
    security(("bearer_auth" = [])),
    request_body = CreateLoan,
    responses(
        (status = 201, description = "Loan created", body = LoanDetails),
        (status = 404, description = "User or book not found"),
        (status = 409, description = "No copy available"),
        (status = 422, description = "Account is not activated")
    )
)]
pub async fn create_loan(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Json(data): Json<CreateLoan>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    let loan = state.services.loans.create_loan(&ctx, data).await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

#[utoipa::path(
    get,
    path = "/loans/{id}",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan details", body = LoanDetails),
        (status = 403, description = "Not your loan"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn get_loan(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(&ctx, id).await?;
    Ok(Json(loan))
}

/// Record a returned copy, optionally with a fine
#[utoipa::path(
    post,
    path = "/loans/{id}/return",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = CloseLoan,
    responses(
        (status = 200, description = "Loan returned", body = LoanDetails),
        (status = 409, description = "Loan is already closed")
    )
)]
pub async fn return_loan(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    body: Option<Json<CloseLoan>>,
) -> AppResult<Json<LoanDetails>> {
    let data = body.map(|Json(data)| data).unwrap_or_default();
    let loan = state.services.loans.return_loan(&ctx, id, data).await?;
    Ok(Json(loan))
}

/// The copy is lost; stock drops by one
#[utoipa::path(
    post,
    path = "/loans/{id}/lost",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = CloseLoan,
    responses(
        (status = 200, description = "Loan marked lost", body = LoanDetails),
        (status = 409, description = "Loan is already closed")
    )
)]
pub async fn mark_lost(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    body: Option<Json<CloseLoan>>,
) -> AppResult<Json<LoanDetails>> {
    let data = body.map(|Json(data)| data).unwrap_or_default();
    let loan = state.services.loans.mark_lost(&ctx, id, data).await?;
    Ok(Json(loan))
}

#[utoipa::path(
    post,
    path = "/loans/{id}/overdue",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    responses(
        (status = 200, description = "Loan marked overdue", body = LoanDetails),
        (status = 409, description = "Loan is not active"),
        (status = 422, description = "Due date has not passed")
    )
)]
pub async fn mark_overdue(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.mark_overdue(&ctx, id).await?;
    Ok(Json(loan))
}

/// Mark every active loan past its due date as overdue
#[utoipa::path(
    post,
    path = "/loans/overdue-sweep",
    tag = "loans",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Loans marked overdue", body = OverdueSweep)
    )
)]
pub async fn sweep_overdue(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
) -> AppResult<Json<OverdueSweep>> {
    let result = state.services.loans.sweep_overdue(&ctx).await?;
    Ok(Json(result))
}

#[utoipa::path(
    put,
    path = "/loans/{id}/fine",
    tag = "loans",
    security(("bearer_auth" = [])),
    params(
        ("id" = i32, Path, description = "Loan ID")
    ),
    request_body = SetFine,
    responses(
        (status = 200, description = "Fine updated", body = LoanDetails),
        (status = 400, description = "Negative fine"),
        (status = 404, description = "Loan not found")
    )
)]
pub async fn set_fine(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Path(id): Path<i32>,
    Json(data): Json<SetFine>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.set_fine(&ctx, id, data).await?;
    Ok(Json(loan))
}
