//! Book model and related types

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::{
    enums::{InventoryCondition, InventoryStatus},
    inventory::InventoryView,
};

static ISBN_INPUT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9Xx][0-9Xx -]{8,16}$").expect("valid isbn regex"));

/// Strip separators from an ISBN and check it is a 10 or 13 character code.
pub fn normalize_isbn(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let valid = match compact.len() {
        10 => {
            let (body, check) = compact.split_at(9);
            body.chars().all(|c| c.is_ascii_digit())
                && check.chars().all(|c| c.is_ascii_digit() || c == 'X')
        }
        13 => compact.chars().all(|c| c.is_ascii_digit()),
        _ => false,
    };

    valid.then_some(compact)
}

/// Book row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Book {
    pub id: i32,
    pub title: String,
    pub isbn: String,
    /// Internal accession number
    pub folio: Option<String>,
    pub publication_year: Option<i32>,
    pub category_id: Option<i32>,
    pub publisher_id: Option<i32>,
    pub genre_id: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Descriptive data owned 1:1 by a book
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookDetail {
    pub id: i32,
    pub book_id: i32,
    pub description: Option<String>,
    pub pages: Option<i32>,
    pub language: Option<String>,
    pub edition: Option<String>,
    /// Shelf location
    pub location: Option<String>,
    pub cover_image_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `{id, name}` pair used for relations and quick-create responses
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct NamedRef {
    pub id: i32,
    pub name: String,
}

/// Book with its relations, detail and availability
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BookView {
    #[serde(flatten)]
    pub book: Book,
    pub authors: Vec<NamedRef>,
    pub category: Option<NamedRef>,
    pub publisher: Option<NamedRef>,
    pub genre: Option<NamedRef>,
    pub detail: Option<BookDetail>,
    pub inventory: Option<InventoryView>,
}

/// Catalog list entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BookShort {
    pub id: i32,
    pub title: String,
    pub isbn: String,
    pub folio: Option<String>,
    pub publication_year: Option<i32>,
    pub category: Option<String>,
    pub publisher: Option<String>,
    pub genre: Option<String>,
    pub authors: Vec<String>,
    pub availability_status: Option<InventoryStatus>,
    pub available: i64,
    pub is_available: bool,
}

/// Catalog ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookSort {
    #[default]
    Title,
    Year,
    Newest,
    /// Full-text rank, only meaningful together with `q`
    Relevance,
}

/// Catalog search parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct BookQuery {
    /// Full-text search over title, ISBN, description and author names
    pub q: Option<String>,
    pub category_id: Option<i32>,
    pub publisher_id: Option<i32>,
    pub genre_id: Option<i32>,
    pub author_id: Option<i32>,
    pub publication_year: Option<i32>,
    /// Only books with at least one copy available
    pub available_only: Option<bool>,
    pub sort: Option<BookSort>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Detail fields accepted on create/update
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct BookDetailInput {
    #[validate(length(max = 5000, message = "Description is too long"))]
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Pages must be positive"))]
    pub pages: Option<i32>,
    pub language: Option<String>,
    pub edition: Option<String>,
    pub location: Option<String>,
    pub cover_image_path: Option<String>,
}

/// Create book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: String,
    #[validate(regex(path = *ISBN_INPUT_RE, message = "Invalid ISBN"))]
    pub isbn: String,
    #[validate(length(min = 1, max = 64, message = "Folio must be 1-64 characters"))]
    pub folio: Option<String>,
    #[validate(range(min = 1000, max = 2100, message = "Invalid publication year"))]
    pub publication_year: Option<i32>,
    pub category_id: Option<i32>,
    pub publisher_id: Option<i32>,
    pub genre_id: Option<i32>,
    #[serde(default)]
    pub author_ids: Vec<i32>,
    #[validate(nested)]
    pub detail: Option<BookDetailInput>,
    /// Initial number of copies (default 1)
    #[validate(range(min = 0, message = "Quantity cannot be negative"))]
    pub quantity: Option<i32>,
    pub condition: Option<InventoryCondition>,
}

/// Update book request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title is required"))]
    pub title: Option<String>,
    #[validate(regex(path = *ISBN_INPUT_RE, message = "Invalid ISBN"))]
    pub isbn: Option<String>,
    #[validate(length(min = 1, max = 64, message = "Folio must be 1-64 characters"))]
    pub folio: Option<String>,
    #[validate(range(min = 1000, max = 2100, message = "Invalid publication year"))]
    pub publication_year: Option<i32>,
    pub category_id: Option<i32>,
    pub publisher_id: Option<i32>,
    pub genre_id: Option<i32>,
    pub author_ids: Option<Vec<i32>>,
    #[validate(nested)]
    pub detail: Option<BookDetailInput>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_isbn_separators() {
        assert_eq!(normalize_isbn("978-0-13-110362-7").as_deref(), Some("9780131103627"));
        assert_eq!(normalize_isbn("0-306-40615-x").as_deref(), Some("030640615X"));
        assert_eq!(normalize_isbn("0 306 40615 2").as_deref(), Some("0306406152"));
    }

    #[test]
    fn rejects_malformed_isbn() {
        assert!(normalize_isbn("12345").is_none());
        assert!(normalize_isbn("97801311036X7").is_none());
        assert!(normalize_isbn("X306406152").is_none());
    }

    #[test]
    fn create_book_validates_nested_detail() {
        let book = CreateBook {
            title: "Pedro Páramo".into(),
            isbn: "978-607-16-0528-2".into(),
            folio: None,
            publication_year: Some(1955),
            category_id: None,
            publisher_id: None,
            genre_id: None,
            author_ids: vec![],
            detail: Some(BookDetailInput {
                pages: Some(0),
                ..Default::default()
            }),
            quantity: Some(2),
            condition: None,
        };
        assert!(book.validate().is_err());
    }
}
