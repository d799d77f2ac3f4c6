//! In-process backend implementing every store
//!
//! All stores share one `State` behind a std mutex that is never held
//! across an await. Row locks for ledger transactions are per-key tokio
//! mutexes, taken with the configured lock timeout and released when the
//! transaction is committed or dropped. Transaction writes are staged and
//! only reach `State` on commit.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use crate::{
    error::{unique_violation, AppError, AppResult},
    models::{
        book::{Book, BookLock, BookShort, CatalogQuery, CreateBook, UpdateBook},
        loan::{Loan, LoanDetails, LoanFilter, NewLoan},
        review::{NewReview, Review, ReviewFilter, UpdateReview},
        user::{NewUser, User, UserChanges},
    },
    search::run_catalog_query,
};

use super::{BookStore, LedgerTransaction, LoanLedger, ReviewStore, UserStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Book(i64),
    User(i64),
    Loan(i64),
}

#[derive(Debug, Clone)]
struct StoredReview {
    id: i64,
    user_id: i64,
    book_id: i64,
    rating: i32,
    text: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct State {
    books: BTreeMap<i64, Book>,
    loans: BTreeMap<i64, Loan>,
    users: BTreeMap<i64, User>,
    reviews: BTreeMap<i64, StoredReview>,
    book_seq: i64,
    loan_seq: i64,
    user_seq: i64,
    review_seq: i64,
}

fn next_id(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

impl State {
    fn loan_details(&self, loan: &Loan, now: DateTime<Utc>) -> AppResult<LoanDetails> {
        let book = self
            .books
            .get(&loan.book_id)
            .ok_or_else(|| AppError::Internal(format!("Loan {} references a missing book", loan.id)))?;
        let email = self
            .users
            .get(&loan.user_id)
            .map(|u| u.email.clone())
            .unwrap_or_default();
        Ok(LoanDetails::new(loan, BookShort::from(book), email, now))
    }

    fn review_view(&self, review: &StoredReview) -> Review {
        Review {
            id: review.id,
            user_id: review.user_id,
            user_email: self
                .users
                .get(&review.user_id)
                .map(|u| u.email.clone())
                .unwrap_or_default(),
            book_id: review.book_id,
            book_title: self
                .books
                .get(&review.book_id)
                .map(|b| b.title.clone())
                .unwrap_or_default(),
            rating: review.rating,
            text: review.text.clone(),
            created_at: review.created_at,
            updated_at: review.updated_at,
        }
    }
}

/// In-memory store; clones share the same data
#[derive(Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    locks: Arc<Mutex<HashMap<LockKey, Arc<tokio::sync::Mutex<()>>>>>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            locks: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(&self, key: LockKey) -> AppResult<OwnedMutexGuard<()>> {
        let mutex = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries referenced only by the map are neither held nor awaited
            locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
            locks.entry(key).or_default().clone()
        };
        tokio::time::timeout(self.lock_timeout, mutex.lock_owned())
            .await
            .map_err(|_| {
                tracing::debug!(?key, "Row lock wait timed out");
                AppError::LockTimeout("Another request is using this record, try again".to_string())
            })
    }
}

#[async_trait]
impl BookStore for MemoryStore {
    async fn get(&self, id: i64) -> AppResult<Book> {
        self.state()
            .books
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))
    }

    async fn search(&self, query: &CatalogQuery) -> AppResult<(Vec<Book>, i64)> {
        let books: Vec<Book> = self.state().books.values().cloned().collect();
        Ok(run_catalog_query(books, query))
    }

    async fn create(&self, book: &CreateBook) -> AppResult<Book> {
        let mut state = self.state();
        if state.books.values().any(|b| b.isbn == book.isbn) {
            return Err(unique_violation(Some("books_isbn_key")));
        }
        let now = Utc::now();
        let id = next_id(&mut state.book_seq);
        let created = Book {
            id,
            title: book.title.clone(),
            author: book.author.clone(),
            isbn: book.isbn.clone(),
            description: book.description.clone(),
            page_count: book.page_count,
            genre: book.genre.clone(),
            published_date: book.published_date,
            is_available: true,
            created_at: now,
            updated_at: now,
        };
        state.books.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, changes: &UpdateBook) -> AppResult<Book> {
        let mut state = self.state();
        if let Some(ref isbn) = changes.isbn {
            if state.books.values().any(|b| b.id != id && &b.isbn == isbn) {
                return Err(unique_violation(Some("books_isbn_key")));
            }
        }
        let book = state
            .books
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Book with id {} not found", id)))?;
        if let Some(ref v) = changes.title {
            book.title = v.clone();
        }
        if let Some(ref v) = changes.author {
            book.author = v.clone();
        }
        if let Some(ref v) = changes.isbn {
            book.isbn = v.clone();
        }
        if let Some(ref v) = changes.description {
            book.description = v.clone();
        }
        if let Some(v) = changes.page_count {
            book.page_count = Some(v);
        }
        if let Some(ref v) = changes.genre {
            book.genre = v.clone();
        }
        if let Some(v) = changes.published_date {
            book.published_date = Some(v);
        }
        book.updated_at = Utc::now();
        Ok(book.clone())
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        // Serialize with borrows of this book
        let _guard = self.acquire(LockKey::Book(id)).await?;
        let mut state = self.state();
        if !state.books.contains_key(&id) {
            return Err(AppError::NotFound(format!("Book with id {} not found", id)));
        }
        if state.loans.values().any(|l| l.book_id == id) {
            return Err(AppError::Conflict(
                "This book has loan history and cannot be deleted.".to_string(),
            ));
        }
        state.books.remove(&id);
        state.reviews.retain(|_, r| r.book_id != id);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get(&self, id: i64) -> AppResult<User> {
        self.state()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self
            .state()
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let mut users: Vec<User> = self.state().users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(users)
    }

    async fn create(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(unique_violation(Some("users_email_key")));
        }
        if state.users.values().any(|u| u.username == user.username) {
            return Err(unique_violation(Some("users_username_key")));
        }
        let now = Utc::now();
        let id = next_id(&mut state.user_seq);
        let created = User {
            id,
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            role: user.role,
            is_active: true,
            password_hash: user.password_hash.clone(),
            created_at: now,
            updated_at: now,
        };
        state.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update(&self, id: i64, changes: &UserChanges) -> AppResult<User> {
        let mut state = self.state();
        if let Some(ref username) = changes.username {
            if state.users.values().any(|u| u.id != id && &u.username == username) {
                return Err(unique_violation(Some("users_username_key")));
            }
        }
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("User with id {} not found", id)))?;
        changes.clone().apply(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn get(&self, id: i64) -> AppResult<Review> {
        let state = self.state();
        state
            .reviews
            .get(&id)
            .map(|r| state.review_view(r))
            .ok_or_else(|| AppError::NotFound(format!("Review with id {} not found", id)))
    }

    async fn list(&self, filter: &ReviewFilter) -> AppResult<Vec<Review>> {
        let state = self.state();
        let mut reviews: Vec<Review> = state
            .reviews
            .values()
            .filter(|r| filter.book_id.map(|b| r.book_id == b).unwrap_or(true))
            .filter(|r| filter.user_id.map(|u| r.user_id == u).unwrap_or(true))
            .map(|r| state.review_view(r))
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(reviews)
    }

    async fn create(&self, review: &NewReview) -> AppResult<Review> {
        let mut state = self.state();
        if !state.books.contains_key(&review.book_id) {
            return Err(AppError::NotFound(format!(
                "Book with id {} not found",
                review.book_id
            )));
        }
        if state
            .reviews
            .values()
            .any(|r| r.user_id == review.user_id && r.book_id == review.book_id)
        {
            return Err(unique_violation(Some("reviews_user_id_book_id_key")));
        }
        let now = Utc::now();
        let stored = StoredReview {
            id: next_id(&mut state.review_seq),
            user_id: review.user_id,
            book_id: review.book_id,
            rating: review.rating,
            text: review.text.clone(),
            created_at: now,
            updated_at: now,
        };
        state.reviews.insert(stored.id, stored.clone());
        Ok(state.review_view(&stored))
    }

    async fn update(&self, id: i64, changes: &UpdateReview) -> AppResult<Review> {
        let mut state = self.state();
        let review = state
            .reviews
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Review with id {} not found", id)))?;
        if let Some(rating) = changes.rating {
            review.rating = rating;
        }
        if let Some(ref text) = changes.text {
            review.text = text.clone();
        }
        review.updated_at = Utc::now();
        let review = review.clone();
        Ok(state.review_view(&review))
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        self.state()
            .reviews
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("Review with id {} not found", id)))
    }
}

#[async_trait]
impl LoanLedger for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn LedgerTransaction>> {
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            guards: HashMap::new(),
            loans: BTreeMap::new(),
            availability: BTreeMap::new(),
        }))
    }

    async fn get(&self, id: i64) -> AppResult<LoanDetails> {
        let state = self.state();
        let loan = state
            .loans
            .get(&id)
            .ok_or_else(|| AppError::NotFound(format!("Loan with id {} not found", id)))?;
        state.loan_details(loan, Utc::now())
    }

    async fn list(&self, filter: &LoanFilter) -> AppResult<Vec<LoanDetails>> {
        let state = self.state();
        let mut loans: Vec<&Loan> = state.loans.values().filter(|l| filter.matches(l)).collect();
        if filter.overdue_at.is_some() {
            loans.sort_by(|a, b| b.due_date.cmp(&a.due_date).then_with(|| b.id.cmp(&a.id)));
        } else {
            loans.sort_by(|a, b| b.borrowed_at.cmp(&a.borrowed_at).then_with(|| b.id.cmp(&a.id)));
        }
        let now = Utc::now();
        loans
            .into_iter()
            .map(|loan| state.loan_details(loan, now))
            .collect()
    }
}

/// Ledger transaction over the in-memory state
pub struct MemoryTransaction {
    store: MemoryStore,
    guards: HashMap<LockKey, OwnedMutexGuard<()>>,
    /// Inserted or modified loans, written to the state on commit
    loans: BTreeMap<i64, Loan>,
    availability: BTreeMap<i64, bool>,
}

impl MemoryTransaction {
    async fn lock(&mut self, key: LockKey) -> AppResult<()> {
        if !self.guards.contains_key(&key) {
            let guard = self.store.acquire(key).await?;
            self.guards.insert(key, guard);
        }
        Ok(())
    }

    /// Committed loans overlaid with this transaction's writes
    fn visible_loans<'a>(&'a self, state: &'a State) -> impl Iterator<Item = &'a Loan> + 'a {
        state
            .loans
            .values()
            .filter(move |l| !self.loans.contains_key(&l.id))
            .chain(self.loans.values())
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn lock_book(&mut self, book_id: i64) -> AppResult<Option<BookLock>> {
        self.lock(LockKey::Book(book_id)).await?;
        let state = self.store.state();
        Ok(state.books.get(&book_id).map(|book| BookLock {
            id: book.id,
            is_available: self
                .availability
                .get(&book_id)
                .copied()
                .unwrap_or(book.is_available),
        }))
    }

    async fn lock_borrower(&mut self, user_id: i64) -> AppResult<bool> {
        self.lock(LockKey::User(user_id)).await?;
        Ok(self.store.state().users.contains_key(&user_id))
    }

    async fn lock_loan(&mut self, loan_id: i64) -> AppResult<Option<Loan>> {
        self.lock(LockKey::Loan(loan_id)).await?;
        if let Some(staged) = self.loans.get(&loan_id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.store.state().loans.get(&loan_id).cloned())
    }

    async fn has_active_loan(&mut self, user_id: i64, book_id: i64) -> AppResult<bool> {
        let state = self.store.state();
        let found = self
            .visible_loans(&state)
            .any(|l| l.is_active() && l.user_id == user_id && l.book_id == book_id);
        Ok(found)
    }

    async fn active_loan_count(&mut self, user_id: i64) -> AppResult<i64> {
        let state = self.store.state();
        let count = self
            .visible_loans(&state)
            .filter(|l| l.is_active() && l.user_id == user_id)
            .count();
        Ok(count as i64)
    }

    async fn insert_loan(&mut self, loan: &NewLoan) -> AppResult<Loan> {
        let id = next_id(&mut self.store.state().loan_seq);
        let created = Loan {
            id,
            book_id: loan.book_id,
            user_id: loan.user_id,
            borrowed_at: loan.borrowed_at,
            due_date: loan.due_date,
            returned_at: None,
        };
        self.loans.insert(id, created.clone());
        Ok(created)
    }

    async fn mark_returned(&mut self, loan_id: i64, at: DateTime<Utc>) -> AppResult<Loan> {
        let current = match self.loans.get(&loan_id) {
            Some(staged) => Some(staged.clone()),
            None => self.store.state().loans.get(&loan_id).cloned(),
        };
        let mut loan = current
            .filter(Loan::is_active)
            .ok_or_else(|| AppError::NotFound(format!("Active loan with id {} not found", loan_id)))?;
        loan.returned_at = Some(at);
        self.loans.insert(loan_id, loan.clone());
        Ok(loan)
    }

    async fn set_book_available(&mut self, book_id: i64, available: bool) -> AppResult<()> {
        self.availability.insert(book_id, available);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        let this = *self;
        let mut state = this.store.state();

        // Same guarantees as the partial unique indexes on the loans table
        for loan in this.loans.values().filter(|l| l.is_active()) {
            let others = state
                .loans
                .values()
                .filter(|l| l.is_active() && l.id != loan.id && !this.loans.contains_key(&l.id));
            for other in others {
                if other.book_id == loan.book_id {
                    return Err(unique_violation(Some("loans_one_active_per_book")));
                }
                if other.user_id == loan.user_id {
                    return Err(unique_violation(Some("loans_one_active_per_user")));
                }
            }
        }

        let now = Utc::now();
        for (id, loan) in &this.loans {
            state.loans.insert(*id, loan.clone());
        }
        for (book_id, available) in &this.availability {
            if let Some(book) = state.books.get_mut(book_id) {
                book.is_available = *available;
                book.updated_at = now;
            }
        }
        Ok(())
    }
}
