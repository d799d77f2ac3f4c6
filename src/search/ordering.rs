//! Catalog ordering parameter
//!
//! `ordering=title_desc,author` style lists. Each entry accepts a `_asc` or
//! `_desc` suffix or a leading `-`; unknown fields are dropped.

use std::cmp::Ordering;

use crate::models::Book;

/// Fields a catalog listing may be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    Author,
    Isbn,
    Genre,
    PageCount,
    PublishedDate,
    CreatedAt,
}

impl SortField {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "title" => Some(SortField::Title),
            "author" => Some(SortField::Author),
            "isbn" => Some(SortField::Isbn),
            "genre" => Some(SortField::Genre),
            "page_count" => Some(SortField::PageCount),
            "published_date" => Some(SortField::PublishedDate),
            "created_at" => Some(SortField::CreatedAt),
            _ => None,
        }
    }

    /// Column name in the `books` table
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Title => "title",
            SortField::Author => "author",
            SortField::Isbn => "isbn",
            SortField::Genre => "genre",
            SortField::PageCount => "page_count",
            SortField::PublishedDate => "published_date",
            SortField::CreatedAt => "created_at",
        }
    }

    fn is_text(&self) -> bool {
        matches!(
            self,
            SortField::Title | SortField::Author | SortField::Isbn | SortField::Genre
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderField {
    pub field: SortField,
    pub descending: bool,
}

impl OrderField {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        let (name, descending) = if let Some(rest) = raw.strip_prefix('-') {
            (rest.to_string(), true)
        } else if let Some(rest) = raw.strip_suffix("_desc") {
            (rest.to_string(), true)
        } else if let Some(rest) = raw.strip_suffix("_asc") {
            (rest.to_string(), false)
        } else {
            (raw, false)
        };
        SortField::from_name(&name).map(|field| OrderField { field, descending })
    }

    /// `ORDER BY` fragment; NULLs sort last ascending and first descending.
    /// Text sorts case-insensitively, then bytewise, independent of the
    /// database collation.
    pub fn sql(&self) -> String {
        let column = self.field.column();
        let direction = if self.descending { "DESC" } else { "ASC" };
        if self.field.is_text() {
            format!(
                "LOWER({column}) COLLATE \"C\" {direction}, {column} COLLATE \"C\" {direction}"
            )
        } else {
            format!("{column} {direction}")
        }
    }
}

/// Parse an ordering parameter, keeping the first occurrence of each field
pub fn parse_ordering(raw: &str) -> Vec<OrderField> {
    let mut fields: Vec<OrderField> = Vec::new();
    for order in raw.split(',').filter_map(OrderField::parse) {
        if !fields.iter().any(|f| f.field == order.field) {
            fields.push(order);
        }
    }
    fields
}

/// Same placement of NULLs as PostgreSQL: missing values sort after present ones
fn cmp_nullable<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.cmp(b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn cmp_field(a: &Book, b: &Book, field: SortField) -> Ordering {
    match field {
        SortField::Title => cmp_text(&a.title, &b.title),
        SortField::Author => cmp_text(&a.author, &b.author),
        SortField::Isbn => cmp_text(&a.isbn, &b.isbn),
        SortField::Genre => cmp_text(&a.genre, &b.genre),
        SortField::PageCount => cmp_nullable(&a.page_count, &b.page_count),
        SortField::PublishedDate => cmp_nullable(&a.published_date, &b.published_date),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

/// Compare two books by an explicit ordering, ties broken by id ascending
pub fn compare_books(a: &Book, b: &Book, ordering: &[OrderField]) -> Ordering {
    for order in ordering {
        let ord = cmp_field(a, b, order.field);
        let ord = if order.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.id.cmp(&b.id)
}

/// Default listing order: most recently added first
pub fn newest_first(a: &Book, b: &Book) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}

/// `ORDER BY` clause for an explicit ordering
pub fn order_by_sql(ordering: &[OrderField]) -> String {
    let mut parts: Vec<String> = ordering.iter().map(OrderField::sql).collect();
    parts.push("id ASC".to_string());
    parts.join(", ")
}
