//! Repository layer: store traits and their backends
//!
//! Every store has a PostgreSQL implementation (`books`, `loans`, `users`,
//! `reviews`) and an in-process one (`memory`). Services only see the
//! traits, gathered in [`Repository`].

pub mod books;
pub mod loans;
pub mod memory;
pub mod reviews;
pub mod users;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookLock, CatalogQuery, CreateBook, UpdateBook},
        loan::{Loan, LoanDetails, LoanFilter, NewLoan},
        review::{NewReview, Review, ReviewFilter, UpdateReview},
        user::{NewUser, User, UserChanges},
    },
};

/// Catalog store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn get(&self, id: i64) -> AppResult<Book>;

    /// Filter, search, order and paginate; returns the page and the total
    async fn search(&self, query: &CatalogQuery) -> AppResult<(Vec<Book>, i64)>;

    async fn create(&self, book: &CreateBook) -> AppResult<Book>;

    async fn update(&self, id: i64, changes: &UpdateBook) -> AppResult<Book>;

    /// Fails with `Conflict` while any loan references the book
    async fn delete(&self, id: i64) -> AppResult<()>;
}

/// Loan ledger: read side plus transactions for the borrowing engine
#[async_trait]
pub trait LoanLedger: Send + Sync {
    /// Start a transaction; dropping it without `commit` rolls it back
    async fn begin(&self) -> AppResult<Box<dyn LedgerTransaction>>;

    async fn get(&self, id: i64) -> AppResult<LoanDetails>;

    async fn list(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>>;
}

/// Primitives the borrowing engine composes inside one transaction.
///
/// `lock_*` calls hold the row until commit or rollback and fail with
/// `LockTimeout` when the lock cannot be taken in time.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<BookLock>>;

    /// Returns false when the user does not exist
    async fn lock_borrower(&mut self, user_id: i64) -> AppResult<bool>;

    async fn lock_loan(&mut self, loan_id: i64) -> AppResult<Option<Loan>>;

    async fn has_active_loan(&mut self, user_id: i64, book_id: i64) -> AppResult<bool>;

    async fn active_loan_count(&mut self, user_id: i64) -> AppResult<i64>;

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan>;

    async fn mark_returned(&mut self, loan_id: i64, at: DateTime<Utc>) -> AppResult<Loan>;

    async fn set_book_available(&mut self, book_id: i64, available: bool) -> AppResult<()>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}

/// User store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get(&self, id: i64) -> AppResult<User>;

    /// Emails are stored lowercased
    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>>;

    async fn list(&self) -> AppResult<Vec<User>>;

    async fn create(&self, user: &NewUser) -> AppResult<User>;

    async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<User>;
}

/// Review store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn get(&self, id: i64) -> AppResult<Review>;

    async fn list(&self, filter: &ReviewFilter) -> AppResult<Vec<Review>>;

    async fn create(&self, review: &NewReview) -> AppResult<Review>;

    async fn update(&self, id: i64, changes: &UpdateReview) -> AppResult<Review>;

    async fn delete(&self, id: i64) -> AppResult<()>;
}

/// Main repository struct holding every store
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookStore>,
    pub loans: Arc<dyn LoanLedger>,
    pub users: Arc<dyn UserStore>,
    pub reviews: Arc<dyn ReviewStore>,
    pool: Option<Pool<Postgres>>,
}

impl Repository {
    /// PostgreSQL-backed repository
    pub fn postgres(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self {
            books: Arc::new(books::BooksRepository::new(pool.clone())),
            loans: Arc::new(loans::LoansRepository::new(pool.clone(), lock_timeout)),
            users: Arc::new(users::UsersRepository::new(pool.clone())),
            reviews: Arc::new(reviews::ReviewsRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// In-process repository; all stores share one state
    pub fn in_memory(lock_timeout: Duration) -> Self {
        let store = memory::MemoryStore::new(lock_timeout);
        Self {
            books: Arc::new(store.clone()),
            loans: Arc::new(store.clone()),
            users: Arc::new(store.clone()),
            reviews: Arc::new(store),
            pool: None,
        }
    }

    /// Repository over explicit stores
    pub fn from_stores(
        books: Arc<dyn BookStore>,
        loans: Arc<dyn LoanLedger>,
        users: Arc<dyn UserStore>,
        reviews: Arc<dyn ReviewStore>,
    ) -> Self {
        Self {
            books,
            loans,
            users,
            reviews,
            pool: None,
        }
    }

    /// Check that the backing store answers
    pub async fn ping(&self) -> AppResult<()> {
        if let Some(pool) = &self.pool {
            sqlx::query("SELECT 1").execute(pool).await?;
        }
        Ok(())
    }
}
