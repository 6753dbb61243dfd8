//! Report export endpoints

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::{
    error::AppResult,
    models::{report::ReportQuery, user::RequestContext},
    services::reports::RenderedReport,
};

fn download(report: RenderedReport) -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, report.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", report.file_name),
            ),
        ],
        report.body,
    )
}

/// Books with stock and status
#[utoipa::path(
    get,
    path = "/reports/books",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(ReportQuery),
    responses(
        (status = 200, description = "Report file (json, csv or html)"),
        (status = 400, description = "Unknown status for this report"),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn books_report(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<ReportQuery>,
) -> AppResult<impl IntoResponse> {
    let report = state.services.reports.books(&ctx, &query).await?;
    Ok(download(report))
}

/// Loans, filtered by status and borrow date
#[utoipa::path(
    get,
    path = "/reports/loans",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(ReportQuery),
    responses(
        (status = 200, description = "Report file (json, csv or html)"),
        (status = 400, description = "Unknown status or inverted date range"),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn loans_report(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<ReportQuery>,
) -> AppResult<impl IntoResponse> {
    let report = state.services.reports.loans(&ctx, &query).await?;
    Ok(download(report))
}

/// Reservations, filtered by status and reservation date
#[utoipa::path(
    get,
    path = "/reports/reservations",
    tag = "reports",
    security(("bearer_auth" = [])),
    params(ReportQuery),
    responses(
        (status = 200, description = "Report file (json, csv or html)"),
        (status = 400, description = "Unknown status or inverted date range"),
        (status = 403, description = "Staff role required")
    )
)]
pub async fn reservations_report(
    State(state): State<crate::AppState>,
    ctx: RequestContext,
    Query(query): Query<ReportQuery>,
) -> AppResult<impl IntoResponse> {
    let report = state.services.reports.reservations(&ctx, &query).await?;
    Ok(download(report))
}
