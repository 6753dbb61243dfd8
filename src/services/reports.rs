//! Report exports in JSON, CSV and printable HTML

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::{
    error::{AppError, AppResult},
    models::{
        enums::{InventoryStatus, LoanStatus, ReservationStatus},
        report::{BookReportRow, LoanReportRow, ReportFormat, ReportQuery, ReservationReportRow},
        user::RequestContext,
    },
    repository::Repository,
};

/// A row that can be laid out as a table
pub trait ReportRow: Serialize {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

fn opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map(ToString::to_string).unwrap_or_default()
}

impl ReportRow for BookReportRow {
    const HEADERS: &'static [&'static str] = &[
        "ID", "Title", "ISBN", "Folio", "Year", "Authors", "Category", "Publisher", "Genre",
        "Quantity", "Condition", "Status", "On loan", "On hold", "Available", "Created",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.title.clone(),
            self.isbn.clone(),
            opt(&self.folio),
            opt(&self.publication_year),
            self.authors.clone(),
            opt(&self.category),
            opt(&self.publisher),
            opt(&self.genre),
            opt(&self.quantity),
            opt(&self.condition),
            opt(&self.status),
            self.on_loan.to_string(),
            self.on_hold.to_string(),
            self.available.to_string(),
            self.created_at.format("%Y-%m-%d").to_string(),
        ]
    }
}

impl ReportRow for LoanReportRow {
    const HEADERS: &'static [&'static str] = &[
        "ID", "Matricula", "Reader", "Title", "ISBN", "Status", "Borrowed", "Due", "Returned",
        "Fine", "Credential left", "Librarian", "Reservation",
    ];

    fn cells(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.matricula.clone(),
            opt(&self.user_name),
            self.book_title.clone(),
            self.isbn.clone(),
            self.status.to_string(),
            self.borrowed_at.format("%Y-%m-%d %H:%M").to_string(),
            self.due_date.to_string(),
            self.returned_at
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default(),
            self.fine_amount.to_string(),
            if self.left_credential { "yes" } else { "no" }.to_string(),
            opt(&self.librarian_name),
            opt(&self.reservation_id),
        ]
    }
}

impl ReportRow for ReservationReportRow {
    const HEADERS: &'static [&'static str] = &[
        "ID", "Matricula", "Reader", "Title", "ISBN", "Status", "Reserved", "Expires", "Approved",
        "Approved by", "Planned return", "Collection",
    ];

    fn cells(&self) -> Vec<String> {
        let stamp = |at: Option<chrono::DateTime<Utc>>| {
            at.map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default()
        };
        vec![
            self.id.to_string(),
            self.matricula.clone(),
            opt(&self.user_name),
            self.book_title.clone(),
            self.isbn.clone(),
            self.status.to_string(),
            self.reserved_at.format("%Y-%m-%d %H:%M").to_string(),
            stamp(self.expires_at),
            stamp(self.approved_at),
            opt(&self.approved_by_name),
            opt(&self.planned_return_date),
            opt(&self.collection_status),
        ]
    }
}

/// A rendered report ready to be sent as a download
#[derive(Debug)]
pub struct RenderedReport {
    pub content_type: &'static str,
    pub file_name: String,
    pub body: Vec<u8>,
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn render_csv<R: ReportRow>(rows: &[R]) -> AppResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(R::HEADERS)
        .map_err(|e| AppError::Internal(format!("Failed to write CSV header: {}", e)))?;
    for row in rows {
        writer
            .write_record(row.cells())
            .map_err(|e| AppError::Internal(format!("Failed to write CSV row: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| AppError::Internal(format!("Failed to finish CSV: {}", e)))
}

pub fn render_html<R: ReportRow>(title: &str, rows: &[R]) -> String {
    let header: String = R::HEADERS
        .iter()
        .map(|h| format!("<th>{}</th>", escape_html(h)))
        .collect();
    let body: String = rows
        .iter()
        .map(|row| {
            let cells: String = row
                .cells()
                .iter()
                .map(|c| format!("<td>{}</td>", escape_html(c)))
                .collect();
            format!("<tr>{}</tr>\n", cells)
        })
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html lang="es">
<head>
<meta charset="utf-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; font-size: 11px; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #999; padding: 3px 5px; text-align: left; }}
th {{ background: #eee; }}
@media print {{ @page {{ size: landscape; }} }}
</style>
</head>
<body>
<h1>{title}</h1>
<p>Generated {generated} &middot; {count} rows</p>
<table>
<thead><tr>{header}</tr></thead>
<tbody>
{body}</tbody>
</table>
</body>
</html>
"#,
        title = escape_html(title),
        generated = Utc::now().format("%Y-%m-%d %H:%M UTC"),
        count = rows.len(),
        header = header,
        body = body,
    )
}

fn render<R: ReportRow>(name: &str, title: &str, format: ReportFormat, rows: &[R]) -> AppResult<RenderedReport> {
    let body = match format {
        ReportFormat::Json => serde_json::to_vec(rows)
            .map_err(|e| AppError::Internal(format!("Failed to serialize report: {}", e)))?,
        ReportFormat::Csv => render_csv(rows)?,
        ReportFormat::Html => render_html(title, rows).into_bytes(),
    };

    Ok(RenderedReport {
        content_type: format.content_type(),
        file_name: format!("{}_{}.{}", name, Utc::now().format("%Y-%m-%d"), format.extension()),
        body,
    })
}

fn parse_status<S: std::str::FromStr<Err = String>>(status: Option<&str>) -> AppResult<Option<S>> {
    status
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.parse::<S>().map_err(|e| AppError::validation("status", e)))
        .transpose()
}

fn check_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> AppResult<()> {
    match (from, to) {
        (Some(from), Some(to)) if from > to => Err(AppError::validation(
            "from",
            "The start date must not be after the end date",
        )),
        _ => Ok(()),
    }
}

#[derive(Clone)]
pub struct ReportsService {
    repository: Repository,
}

impl ReportsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn books(&self, ctx: &RequestContext, query: &ReportQuery) -> AppResult<RenderedReport> {
        ctx.require_staff()?;
        let status = parse_status::<InventoryStatus>(query.status.as_deref())?;
        check_range(query.from, query.to)?;

        let rows = self.repository.reports_books(status, query.from, query.to).await?;
        render("books", "Books", query.format.unwrap_or_default(), &rows)
    }

    pub async fn loans(&self, ctx: &RequestContext, query: &ReportQuery) -> AppResult<RenderedReport> {
        ctx.require_staff()?;
        let status = parse_status::<LoanStatus>(query.status.as_deref())?;
        check_range(query.from, query.to)?;

        let rows = self.repository.reports_loans(status, query.from, query.to).await?;
        render("loans", "Loans", query.format.unwrap_or_default(), &rows)
    }

    pub async fn reservations(&self, ctx: &RequestContext, query: &ReportQuery) -> AppResult<RenderedReport> {
        ctx.require_staff()?;
        let status = parse_status::<ReservationStatus>(query.status.as_deref())?;
        check_range(query.from, query.to)?;

        let rows = self
            .repository
            .reports_reservations(status, query.from, query.to)
            .await?;
        render("reservations", "Reservations", query.format.unwrap_or_default(), &rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tokio_test::{assert_err, assert_ok};

    fn loan_row() -> LoanReportRow {
        LoanReportRow {
            id: 3,
            matricula: "A01700001".into(),
            user_name: Some("Ruiz, Ana".into()),
            book_title: "Cien años de soledad".into(),
            isbn: "9780307474728".into(),
            status: LoanStatus::Active,
            borrowed_at: Utc::now(),
            due_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            returned_at: None,
            fine_amount: Decimal::new(1550, 2),
            left_credential: true,
            librarian_name: None,
            reservation_id: Some(8),
        }
    }

    #[test]
    fn csv_quotes_fields_with_commas() {
        let csv = String::from_utf8(render_csv(&[loan_row()]).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("ID,Matricula,Reader,Title"));
        let row = lines.next().unwrap();
        assert!(row.contains("\"Ruiz, Ana\""));
        assert!(row.contains(",15.50,yes,,8"));
    }

    #[test]
    fn html_escapes_cell_content() {
        let mut row = loan_row();
        row.book_title = "<script>alert(1)</script>".into();
        let html = render_html("Loans", &[row]);
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("<th>Matricula</th>"));
    }

    #[test]
    fn report_status_must_match_the_report() {
        assert_eq!(parse_status::<LoanStatus>(Some("overdue")).unwrap(), Some(LoanStatus::Overdue));
        assert_eq!(parse_status::<LoanStatus>(Some("")).unwrap(), None);
        assert_err!(parse_status::<LoanStatus>(Some("approved")));
    }

    #[test]
    fn inverted_ranges_are_rejected() {
        let a = NaiveDate::from_ymd_opt(2024, 1, 1);
        let b = NaiveDate::from_ymd_opt(2024, 2, 1);
        assert_ok!(check_range(a, b));
        assert_ok!(check_range(None, b));
        assert_err!(check_range(b, a));
    }

    #[test]
    fn book_rows_carry_stock_figures() {
        let row = BookReportRow {
            id: 1,
            title: "Pedro Páramo".into(),
            isbn: "9788437604183".into(),
            folio: None,
            publication_year: Some(1955),
            authors: "Rulfo, Juan".into(),
            category: None,
            publisher: None,
            genre: None,
            quantity: Some(3),
            condition: Some(crate::models::enums::InventoryCondition::Usado),
            status: Some(InventoryStatus::Disponible),
            on_loan: 1,
            on_hold: 1,
            available: 1,
            created_at: Utc::now(),
        };
        assert_eq!(row.cells().len(), BookReportRow::HEADERS.len());

        let csv = String::from_utf8(render_csv(&[row]).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().contains("Status,On loan,On hold,Available,Created"));
        assert!(lines.next().unwrap().contains(",3,usado,disponible,1,1,1,"));
    }

    #[test]
    fn file_name_uses_format_extension() {
        let report = render("loans", "Loans", ReportFormat::Csv, &[loan_row()]).unwrap();
        assert!(report.file_name.starts_with("loans_"));
        assert!(report.file_name.ends_with(".csv"));
        assert_eq!(report.content_type, "text/csv; charset=utf-8");
    }
}
