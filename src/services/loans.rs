//! Borrowing engine: borrow/return and loan queries
//!
//! Each borrow or return runs in one ledger transaction and keeps the
//! book's `is_available` flag equal to "no active loan references it".
//! Lock order is book then borrower for borrows, loan then book for
//! returns.

use chrono::{Duration, Utc};

use crate::{
    error::{AppError, AppResult, LoanConflict},
    models::{
        loan::{LoanDetails, LoanFilter, NewLoan, MAX_ACTIVE_LOANS_PER_USER},
        user::Identity,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct LoansService {
    repository: Repository,
    duration: Duration,
}

impl LoansService {
    pub fn new(repository: Repository, duration_days: u32) -> Self {
        Self {
            repository,
            duration: Duration::days(i64::from(duration_days)),
        }
    }

    /// Borrow a book for the acting user
    pub async fn borrow(&self, actor: &Identity, book_id: i64) -> AppResult<LoanDetails> {
        let mut tx = self.repository.loans.begin().await?;

        let book = tx
            .lock_book(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))?;

        if !book.is_available {
            tracing::debug!("Borrow rejected: book {} is not available", book_id);
            return Err(LoanConflict::BookUnavailable.into());
        }

        if !tx.lock_borrower(actor.user_id).await? {
            return Err(AppError::NotFound("User not found.".to_string()));
        }

        if tx.has_active_loan(actor.user_id, book_id).await? {
            tracing::debug!("Borrow rejected: user {} already has book {}", actor.user_id, book_id);
            return Err(LoanConflict::AlreadyBorrowed.into());
        }

        if tx.active_loan_count(actor.user_id).await? >= MAX_ACTIVE_LOANS_PER_USER {
            tracing::debug!("Borrow rejected: user {} is at the loan limit", actor.user_id);
            return Err(LoanConflict::LimitReached {
                limit: MAX_ACTIVE_LOANS_PER_USER,
            }
            .into());
        }

        let now = Utc::now();
        let loan = tx
            .insert_loan(&NewLoan {
                book_id,
                user_id: actor.user_id,
                borrowed_at: now,
                due_date: now + self.duration,
            })
            .await?;
        tx.set_book_available(book_id, false).await?;
        tx.commit().await?;

        tracing::info!(
            "Loan {} created: book {} borrowed by user {}, due {}",
            loan.id, book_id, actor.user_id, loan.due_date
        );

        self.repository.loans.get(loan.id).await
    }

    /// Return a loan (administrators only)
    pub async fn return_loan(&self, actor: &Identity, loan_id: i64) -> AppResult<LoanDetails> {
        actor.require_admin()?;

        let mut tx = self.repository.loans.begin().await?;

        let loan = tx
            .lock_loan(loan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Loan not found.".to_string()))?;

        if !loan.is_active() {
            tracing::debug!("Return rejected: loan {} already returned", loan_id);
            return Err(LoanConflict::AlreadyReturned.into());
        }

        tx.lock_book(loan.book_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))?;

        tx.mark_returned(loan_id, Utc::now()).await?;
        tx.set_book_available(loan.book_id, true).await?;
        tx.commit().await?;

        tracing::info!(
            "Loan {} returned: book {} is available again",
            loan_id, loan.book_id
        );

        self.repository.loans.get(loan_id).await
    }

    /// Loan by id; members only see their own
    pub async fn get_loan(&self, actor: &Identity, loan_id: i64) -> AppResult<LoanDetails> {
        let loan = self.repository.loans.get(loan_id).await?;
        if !actor.is_admin() && loan.user_id != actor.user_id {
            return Err(AppError::NotFound(format!("Loan with id {} not found", loan_id)));
        }
        Ok(loan)
    }

    /// Administrators see every loan, members their own
    pub async fn list_loans(&self, actor: &Identity) -> AppResult<Vec<LoanDetails>> {
        let filter = LoanFilter {
            user_id: (!actor.is_admin()).then_some(actor.user_id),
            ..Default::default()
        };
        self.repository.loans.list(&filter).await
    }

    /// Active loans; members only see their own
    pub async fn active_loans(&self, actor: &Identity) -> AppResult<Vec<LoanDetails>> {
        let filter = LoanFilter {
            user_id: (!actor.is_admin()).then_some(actor.user_id),
            active_only: true,
            ..Default::default()
        };
        self.repository.loans.list(&filter).await
    }

    /// The acting user's full loan history
    pub async fn my_loans(&self, actor: &Identity) -> AppResult<Vec<LoanDetails>> {
        let filter = LoanFilter {
            user_id: Some(actor.user_id),
            ..Default::default()
        };
        self.repository.loans.list(&filter).await
    }

    pub async fn all_loans(&self, actor: &Identity) -> AppResult<Vec<LoanDetails>> {
        actor.require_admin()?;
        self.repository.loans.list(&LoanFilter::default()).await
    }

    /// Active loans past their due date, latest due date first
    pub async fn overdue_loans(&self, actor: &Identity) -> AppResult<Vec<LoanDetails>> {
        actor.require_admin()?;
        let filter = LoanFilter {
            overdue_at: Some(Utc::now()),
            ..Default::default()
        };
        self.repository.loans.list(&filter).await
    }
}
