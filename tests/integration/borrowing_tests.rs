//! Borrowing engine properties, including concurrent borrows

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use tokio::task::JoinSet;

use libris_server::{
    error::{AppError, LoanConflict},
    models::{loan::NewLoan, user::Identity},
    repository::Repository,
};

use crate::common::{spawn_app, with_repository, TestApp};

/// `is_available` must match "no active loan" for every book
async fn assert_availability_invariant(app: &TestApp) {
    let books = app
        .state
        .services
        .catalog
        .list_books(libris_server::models::book::BookQuery {
            page_size: Some(100),
            ..Default::default()
        })
        .await
        .unwrap();
    let active = app.state.services.loans.active_loans(&app.admin).await.unwrap();

    for book in books.items {
        let on_loan = active.iter().any(|loan| loan.book.id == book.id);
        assert_eq!(book.is_available, !on_loan, "book {} out of sync", book.id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_of_one_book() {
    let app = Arc::new(spawn_app().await);
    let book = app.add_book("Contested", "Someone", "9781000000001").await;

    let mut members = Vec::new();
    for i in 0..8 {
        let (_, identity) = app.add_member(&format!("racer{}", i)).await;
        members.push(identity);
    }

    let mut tasks = JoinSet::new();
    for member in members {
        let app = app.clone();
        tasks.spawn(async move { app.state.services.loans.borrow(&member, book.id).await });
    }

    let mut successes = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Loan(LoanConflict::BookUnavailable)) | Err(AppError::LockTimeout(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    let stored = app.state.services.catalog.get_book(book.id).await.unwrap();
    assert!(!stored.is_available);
    assert_eq!(app.state.services.loans.active_loans(&app.admin).await.unwrap().len(), 1);
    assert_availability_invariant(&app).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_borrows_by_one_member() {
    let app = Arc::new(spawn_app().await);
    let (_, member) = app.add_member("greedy").await;

    let mut book_ids = Vec::new();
    for i in 0..5 {
        let book = app
            .add_book(&format!("Book {}", i), "Author", &format!("978200000000{}", i))
            .await;
        book_ids.push(book.id);
    }

    let mut tasks = JoinSet::new();
    for book_id in book_ids {
        let app = app.clone();
        tasks.spawn(async move { app.state.services.loans.borrow(&member, book_id).await });
    }

    let mut successes = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Loan(LoanConflict::LimitReached { limit })) => assert_eq!(limit, 1),
            Err(AppError::LockTimeout(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert_eq!(app.state.services.loans.my_loans(&member).await.unwrap().len(), 1);
    assert_availability_invariant(&app).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_returns_of_one_loan() {
    let app = Arc::new(spawn_app().await);
    let book = app.add_book("Returned", "Twice", "9783000000001").await;
    let (_, member) = app.add_member("returner").await;
    let loan = app.state.services.loans.borrow(&member, book.id).await.unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..4 {
        let app = app.clone();
        let admin = app.admin;
        tasks.spawn(async move { app.state.services.loans.return_loan(&admin, loan.id).await });
    }

    let mut successes = 0;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(_) => successes += 1,
            Err(AppError::Loan(LoanConflict::AlreadyReturned)) | Err(AppError::LockTimeout(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(successes, 1);
    assert!(app.state.services.catalog.get_book(book.id).await.unwrap().is_available);
}

#[tokio::test]
async fn test_borrow_return_round_trip() {
    let app = spawn_app().await;
    let book = app.add_book("Round Trip", "Traveller", "9784000000001").await;
    let (_, member) = app.add_member("traveller").await;
    let loans = &app.state.services.loans;

    let loan = loans.borrow(&member, book.id).await.unwrap();
    assert!(loan.is_active);
    assert!(!loan.is_overdue);
    assert_eq!(loan.due_date - loan.borrowed_at, chrono::Duration::days(14));
    assert_availability_invariant(&app).await;

    let err = loans.borrow(&member, book.id).await.unwrap_err();
    assert!(matches!(err, AppError::Loan(LoanConflict::BookUnavailable)));

    let returned = loans.return_loan(&app.admin, loan.id).await.unwrap();
    assert!(!returned.is_active);
    assert_availability_invariant(&app).await;

    let err = loans.return_loan(&app.admin, loan.id).await.unwrap_err();
    assert!(matches!(err, AppError::Loan(LoanConflict::AlreadyReturned)));

    let again = loans.borrow(&member, book.id).await.unwrap();
    assert_ne!(again.id, loan.id);
}

#[tokio::test]
async fn test_overdue_query() {
    let app = spawn_app().await;
    let late_book = app.add_book("Late", "Tardy", "9785000000001").await;
    let fresh_book = app.add_book("Fresh", "Prompt", "9785000000002").await;
    let old_book = app.add_book("Old", "History", "9785000000003").await;
    let (_, late) = app.add_member("late").await;
    let (_, fresh) = app.add_member("fresh").await;
    let (_, done) = app.add_member("done").await;

    let ledger = &app.state.services.repository().loans;
    let now = Utc::now();
    let seed = |book_id: i64, user: Identity, days_ago: i64| NewLoan {
        book_id,
        user_id: user.user_id,
        borrowed_at: now - chrono::Duration::days(days_ago),
        due_date: now - chrono::Duration::days(days_ago) + chrono::Duration::days(14),
    };

    // Active and past due
    let mut tx = ledger.begin().await.unwrap();
    tx.insert_loan(&seed(late_book.id, late, 20)).await.unwrap();
    tx.set_book_available(late_book.id, false).await.unwrap();
    tx.commit().await.unwrap();

    // Past due but already returned
    let mut tx = ledger.begin().await.unwrap();
    let returned = tx.insert_loan(&seed(old_book.id, done, 30)).await.unwrap();
    tx.mark_returned(returned.id, now - chrono::Duration::days(1)).await.unwrap();
    tx.commit().await.unwrap();

    app.state.services.loans.borrow(&fresh, fresh_book.id).await.unwrap();

    let overdue = app.state.services.loans.overdue_loans(&app.admin).await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].book.id, late_book.id);
    assert!(overdue[0].is_overdue);
    assert_availability_invariant(&app).await;

    let err = app.state.services.loans.overdue_loans(&fresh).await.unwrap_err();
    assert!(matches!(err, AppError::Authorization(_)));
}

#[tokio::test]
async fn test_lock_timeout_is_reported() {
    let app = with_repository(Repository::in_memory(Duration::from_millis(50))).await;
    let book = app.add_book("Held", "Locker", "9786000000001").await;
    let (_, member) = app.add_member("waiter").await;

    let ledger = &app.state.services.repository().loans;
    let mut holder = ledger.begin().await.unwrap();
    holder.lock_book(book.id).await.unwrap();

    let err = app.state.services.loans.borrow(&member, book.id).await.unwrap_err();
    assert!(matches!(err, AppError::LockTimeout(_)));
    assert!(err.is_retryable());

    drop(holder);
    app.state.services.loans.borrow(&member, book.id).await.unwrap();
}

/// Runs against a real database: `DATABASE_URL=... cargo test -- --ignored`
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_postgres_concurrent_borrows() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let app = Arc::new(with_repository(Repository::postgres(pool, Duration::from_secs(5))).await);
    let suffix = Utc::now().timestamp_micros().rem_euclid(1_000_000_000);
    let book = app
        .add_book("Postgres Race", "Someone", &format!("9{:012}", suffix))
        .await;

    let mut members = Vec::new();
    for i in 0..6 {
        let (_, identity) = app.add_member(&format!("pg{}_{}", suffix, i)).await;
        members.push(identity);
    }

    let mut tasks = JoinSet::new();
    for member in members {
        let app = app.clone();
        tasks.spawn(async move { app.state.services.loans.borrow(&member, book.id).await });
    }

    let mut successes = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap().is_ok() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1);
    assert!(!app.state.services.catalog.get_book(book.id).await.unwrap().is_available);
}
