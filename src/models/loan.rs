//! Loan (borrow) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::book::BookShort;

/// Default loan period
pub const DEFAULT_LOAN_DAYS: u32 = 14;

/// One-book-at-a-time policy
pub const MAX_ACTIVE_LOANS_PER_USER: i64 = 1;

/// Loan model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Loan {
    pub id: i64,
    pub book_id: i64,
    pub user_id: i64,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
}

impl Loan {
    pub fn is_active(&self) -> bool {
        self.returned_at.is_none()
    }

    pub fn is_overdue_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && now > self.due_date
    }
}

/// Loan to insert
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub book_id: i64,
    pub user_id: i64,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

/// Loan with full details for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanDetails {
    pub id: i64,
    pub user_id: i64,
    pub user_email: String,
    pub book: BookShort,
    pub borrowed_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_overdue: bool,
}

impl LoanDetails {
    pub fn new(loan: &Loan, book: BookShort, user_email: String, now: DateTime<Utc>) -> Self {
        Self {
            id: loan.id,
            user_id: loan.user_id,
            user_email,
            book,
            borrowed_at: loan.borrowed_at,
            due_date: loan.due_date,
            returned_at: loan.returned_at,
            is_active: loan.is_active(),
            is_overdue: loan.is_overdue_at(now),
        }
    }
}

/// Which loans a listing returns
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanFilter {
    pub user_id: Option<i64>,
    pub active_only: bool,
    /// Only active loans whose due date is before this instant
    pub overdue_at: Option<DateTime<Utc>>,
}

impl LoanFilter {
    pub fn matches(&self, loan: &Loan) -> bool {
        self.user_id.map(|u| loan.user_id == u).unwrap_or(true)
            && (!self.active_only || loan.is_active())
            && self
                .overdue_at
                .map(|at| loan.is_active() && loan.due_date < at)
                .unwrap_or(true)
    }
}

/// Borrow request
#[derive(Debug, Deserialize)]
pub struct BorrowRequest {
    pub book_id: i64,
}
