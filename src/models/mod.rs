//! Data models for Libris

pub mod book;
pub mod loan;
pub mod review;
pub mod user;

// Re-export commonly used types
pub use book::{Book, BookShort};
pub use loan::{Loan, LoanDetails};
pub use review::Review;
pub use user::{Identity, Role, User};

use serde::Serialize;

/// Paginated list response
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}
