//! Loans repository for database operations

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookLock, BookShort},
        loan::{Loan, LoanDetails, LoanFilter, NewLoan},
    },
};

use super::{LedgerTransaction, LoanLedger};

const LOAN_COLUMNS: &str = "id, book_id, user_id, borrowed_at, due_date, returned_at";

/// Loan joined with its book summary and borrower email
#[derive(Debug, FromRow)]
struct LoanRow {
    id: i64,
    book_id: i64,
    user_id: i64,
    borrowed_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
    returned_at: Option<DateTime<Utc>>,
    user_email: String,
    title: String,
    author: String,
    isbn: String,
    genre: String,
    is_available: bool,
}

impl LoanRow {
    fn into_details(self, now: DateTime<Utc>) -> LoanDetails {
        let loan = Loan {
            id: self.id,
            book_id: self.book_id,
            user_id: self.user_id,
            borrowed_at: self.borrowed_at,
            due_date: self.due_date,
            returned_at: self.returned_at,
        };
        let book = BookShort {
            id: self.book_id,
            title: self.title,
            author: self.author,
            isbn: self.isbn,
            genre: self.genre,
            is_available: self.is_available,
        };
        LoanDetails::new(&loan, book, self.user_email, now)
    }
}

const DETAILS_SELECT: &str = r#"
    SELECT l.id, l.book_id, l.user_id, l.borrowed_at, l.due_date, l.returned_at,
           u.email AS user_email,
           b.title, b.author, b.isbn, b.genre, b.is_available
    FROM loans l
    JOIN books b ON b.id = l.book_id
    JOIN users u ON u.id = l.user_id
"#;

#[derive(Clone)]
pub struct LoansRepository {
    pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl LoansRepository {
    pub fn new(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl LoanLedger for LoansRepository {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTransaction>> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters
        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;
        Ok(Box::new(PgLedgerTransaction { tx }))
    }

    async fn get(&self, id: i64) -> AppResult<LoanDetails> {
        let row = sqlx::query_as::<_, LoanRow>(&format!("{} WHERE l.id = $1", DETAILS_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;

        Ok(row.into_details(Utc::now()))
    }

    async fn list(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>> {
        let mut qb = QueryBuilder::<Postgres>::new(DETAILS_SELECT);
        qb.push(" WHERE TRUE");
        if let Some(user_id) = filter.user_id {
            qb.push(" AND l.user_id = ").push_bind(user_id);
        }
        if filter.active_only {
            qb.push(" AND l.returned_at IS NULL");
        }
        if let Some(at) = filter.overdue_at {
            qb.push(" AND l.returned_at IS NULL AND l.due_date < ")
                .push_bind(at)
                .push(" ORDER BY l.due_date DESC, l.id DESC");
        } else {
            qb.push(" ORDER BY l.borrowed_at DESC, l.id DESC");
        }

        let rows = qb.build_query_as::<LoanRow>().fetch_all(&self.pool).await?;
        let now = Utc::now();
        Ok(rows.into_iter().map(|row| row.into_details(now)).collect())
    }
}

/// Ledger transaction over a PostgreSQL transaction; row locks are `FOR UPDATE`
pub struct PgLedgerTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PgLedgerTransaction {
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<BookLock>> {
        let lock = sqlx::query_as::<_, BookLock>(
            "SELECT id, is_available FROM books WHERE id = $1 FOR UPDATE",
        )
        .bind(book_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(lock)
    }

    async fn lock_borrower(&mut self, user_id: i64) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(found.is_some())
    }

    async fn lock_loan(&mut self, loan_id: i64) -> AppResult<Option<Loan>> {
        let loan = sqlx::query_as::<_, Loan>(&format!(
            "SELECT {} FROM loans WHERE id = $1 FOR UPDATE",
            LOAN_COLUMNS
        ))
        .bind(loan_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(loan)
    }

    async fn has_active_loan(&mut self, user_id: i64, book_id: i64) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM loans WHERE user_id = $1 AND book_id = $2 AND returned_at IS NULL)",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn active_loan_count(&mut self, user_id: i64) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loans WHERE user_id = $1 AND returned_at IS NULL",
        )
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(count)
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        let created = sqlx::query_as::<_, Loan>(&format!(
            r#"
            INSERT INTO loans (book_id, user_id, borrowed_at, due_date)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            LOAN_COLUMNS
        ))
        .bind(loan.book_id)
        .bind(loan.user_id)
        .bind(loan.borrowed_at)
        .bind(loan.due_date)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(created)
    }

    async fn mark_returned(&mut self, loan_id: i64, at: DateTime<Utc>) -> AppResult<Loan> {
        sqlx::query_as::<_, Loan>(&format!(
            "UPDATE loans SET returned_at = $2 WHERE id = $1 AND returned_at IS NULL RETURNING {}",
            LOAN_COLUMNS
        ))
        .bind(loan_id)
        .bind(at)
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Active loan with id {} not found", loan_id)))
    }

    async fn set_book_available(&mut self, book_id: i64, available: bool) -> AppResult<()> {
        sqlx::query("UPDATE books SET is_available = $2, updated_at = NOW() WHERE id = $1")
            .bind(book_id)
            .bind(available)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        this.tx.commit().await?;
        Ok(())
    }
}
