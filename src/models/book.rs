//! Book (catalog entry) model and related types

use std::borrow::Cow;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::{Validate, ValidationError};

use crate::{config::SearchMode, search::ordering::OrderField};

/// Full book model (DB + API)
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub description: String,
    pub page_count: Option<i32>,
    pub genre: String,
    pub published_date: Option<NaiveDate>,
    /// Cached "no active loan references this book"; written by the loans engine only
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Short book representation embedded in loans
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BookShort {
    pub id: i64,
    pub title: String,
    pub author: String,
    pub isbn: String,
    pub genre: String,
    pub is_available: bool,
}

impl From<&Book> for BookShort {
    fn from(book: &Book) -> Self {
        Self {
            id: book.id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            genre: book.genre.clone(),
            is_available: book.is_available,
        }
    }
}

/// Row lock taken on a book inside a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct BookLock {
    pub id: i64,
    pub is_available: bool,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: String,
    #[validate(length(min = 1, max = 255, message = "Author must be 1 to 255 characters"))]
    pub author: String,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 1, message = "Page count must be positive"))]
    pub page_count: Option<i32>,
    #[serde(default)]
    #[validate(length(max = 100, message = "Genre must be at most 100 characters"))]
    pub genre: String,
    pub published_date: Option<NaiveDate>,
}

/// Update book request; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateBook {
    #[validate(length(min = 1, max = 255, message = "Title must be 1 to 255 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Author must be 1 to 255 characters"))]
    pub author: Option<String>,
    #[validate(custom(function = "validate_isbn"))]
    pub isbn: Option<String>,
    pub description: Option<String>,
    #[validate(range(min = 1, message = "Page count must be positive"))]
    pub page_count: Option<i32>,
    #[validate(length(max = 100, message = "Genre must be at most 100 characters"))]
    pub genre: Option<String>,
    pub published_date: Option<NaiveDate>,
}

/// Strip hyphens and whitespace from an ISBN as typed by a user
pub fn normalize_isbn(raw: &str) -> String {
    raw.chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect()
}

/// ISBN must normalize to 10 or 13 digits
pub fn validate_isbn(raw: &str) -> Result<(), ValidationError> {
    let isbn = normalize_isbn(raw);
    if isbn.len() != 10 && isbn.len() != 13 {
        return Err(ValidationError::new("isbn_length")
            .with_message(Cow::Borrowed("ISBN must be 10 or 13 characters long.")));
    }
    if !isbn.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("isbn_digits")
            .with_message(Cow::Borrowed("ISBN must contain only digits.")));
    }
    Ok(())
}

/// Book list query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookQuery {
    /// Free-text search over title, author, ISBN, genre and description
    pub search: Option<String>,
    /// Comma separated fields, e.g. `title_asc,published_date_desc`
    pub ordering: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub published_year: Option<i32>,
    pub is_available: Option<bool>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

/// Attribute filters applied before search and ordering
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookFilters {
    pub title: Option<String>,
    pub author: Option<String>,
    pub genre: Option<String>,
    pub isbn: Option<String>,
    pub published_year: Option<i32>,
    pub is_available: Option<bool>,
}

impl BookFilters {
    pub fn matches(&self, book: &Book) -> bool {
        fn contains(haystack: &str, needle: &Option<String>) -> bool {
            needle
                .as_ref()
                .map(|n| haystack.to_lowercase().contains(&n.to_lowercase()))
                .unwrap_or(true)
        }

        contains(&book.title, &self.title)
            && contains(&book.author, &self.author)
            && contains(&book.genre, &self.genre)
            && self.isbn.as_ref().map(|i| &book.isbn == i).unwrap_or(true)
            && self
                .published_year
                .map(|y| {
                    use chrono::Datelike;
                    book.published_date.map(|d| d.year() == y).unwrap_or(false)
                })
                .unwrap_or(true)
            && self
                .is_available
                .map(|a| book.is_available == a)
                .unwrap_or(true)
    }
}

/// Fully resolved catalog query handed to a book store
#[derive(Debug, Clone)]
pub struct CatalogQuery {
    pub search: Option<String>,
    pub mode: SearchMode,
    pub threshold: f64,
    pub filters: BookFilters,
    /// Explicit ordering; empty means rank order when searching, newest first otherwise
    pub ordering: Vec<OrderField>,
    pub page: i64,
    pub per_page: i64,
}

impl CatalogQuery {
    /// Rows skipped before this page; saturates for out-of-range page numbers
    pub fn offset(&self) -> i64 {
        self.page
            .saturating_sub(1)
            .max(0)
            .saturating_mul(self.per_page.max(0))
    }
}
