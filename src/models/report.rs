//! Read-only report projections

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use super::enums::{InventoryCondition, InventoryStatus, LoanStatus, ReservationStatus};

/// Output format of a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Json,
    Csv,
    /// Printable page, rendered to PDF by the client or a print service
    Html,
}

impl ReportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Json => "application/json",
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Html => "text/html; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Csv => "csv",
            ReportFormat::Html => "html",
        }
    }
}

/// Report filters. `status` is interpreted per report.
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct ReportQuery {
    pub format: Option<ReportFormat>,
    pub status: Option<String>,
    /// Inclusive lower bound on the report's date column
    pub from: Option<NaiveDate>,
    /// Inclusive upper bound on the report's date column
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct BookReportRow {
    pub id: i32,
    pub title: String,
    pub isbn: String,
    pub folio: Option<String>,
    pub publication_year: Option<i32>,
    pub authors: String,
    pub category: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub quantity: Option<i32>,
    pub condition: Option<InventoryCondition>,
    pub status: Option<InventoryStatus>,
    pub on_loan: i64,
    pub on_hold: i64,
    pub available: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct LoanReportRow {
    pub id: i32,
    pub matricula: String,
    pub user_name: Option<String>,
    pub book_title: String,
    pub isbn: String,
    pub status: LoanStatus,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub returned_at: Option<DateTime<Utc>>,
    #[schema(value_type = String)]
    pub fine_amount: Decimal,
    pub left_credential: bool,
    pub librarian_name: Option<String>,
    pub reservation_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ReservationReportRow {
    pub id: i32,
    pub matricula: String,
    pub user_name: Option<String>,
    pub book_title: String,
    pub isbn: String,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by_name: Option<String>,
    pub planned_return_date: Option<NaiveDate>,
    pub collection_status: Option<String>,
}
