//! Categories, publishers and genres share one shape

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

/// Which lookup table a term belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TaxonomyKind {
    Categories,
    Publishers,
    Genres,
}

impl TaxonomyKind {
    pub fn table(&self) -> &'static str {
        match self {
            TaxonomyKind::Categories => "categories",
            TaxonomyKind::Publishers => "publishers",
            TaxonomyKind::Genres => "genres",
        }
    }

    /// Foreign key column on `books`
    pub fn book_column(&self) -> &'static str {
        match self {
            TaxonomyKind::Categories => "category_id",
            TaxonomyKind::Publishers => "publisher_id",
            TaxonomyKind::Genres => "genre_id",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TaxonomyKind::Categories => "Category",
            TaxonomyKind::Publishers => "Publisher",
            TaxonomyKind::Genres => "Genre",
        }
    }
}

/// A category, publisher or genre
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Term {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub book_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create or update term request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TermInput {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
    #[validate(length(max = 2000, message = "Description is too long"))]
    pub description: Option<String>,
}

/// Inline creation from the book form, only the name is needed
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct QuickCreate {
    #[validate(length(min = 1, max = 255, message = "Name is required"))]
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_from_path_segment() {
        let kind: TaxonomyKind = serde_json::from_str("\"publishers\"").unwrap();
        assert_eq!(kind, TaxonomyKind::Publishers);
        assert_eq!(kind.table(), "publishers");
        assert_eq!(kind.book_column(), "publisher_id");
        assert!(serde_json::from_str::<TaxonomyKind>("\"users\"").is_err());
    }
}
