//! Catalog search, ordering and pagination through the HTTP surface

use axum::http::{Method, StatusCode};
use serde_json::Value;

use crate::common::{spawn_app, TestApp};

async fn seed_catalog(app: &TestApp) {
    app.add_book("The Great Gatsby", "F. Scott Fitzgerald", "9780743273565").await;
    app.add_book("To Kill a Mockingbird", "Harper Lee", "9780061120084").await;
}

fn titles(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|book| book["title"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_search_gatsby() {
    let app = spawn_app().await;
    seed_catalog(&app).await;

    let (status, body) = app.send(Method::GET, "/api/books?search=Gatsby", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(titles(&body), vec!["The Great Gatsby"]);
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn test_search_tolerates_typos() {
    let app = spawn_app().await;
    seed_catalog(&app).await;

    let (_, body) = app.send(Method::GET, "/api/books?search=Mockingbrd", None, None).await;
    assert_eq!(titles(&body)[0], "To Kill a Mockingbird");
}

#[tokio::test]
async fn test_search_by_isbn_fragment() {
    let app = spawn_app().await;
    seed_catalog(&app).await;

    let (_, body) = app.send(Method::GET, "/api/books?search=0061120", None, None).await;
    assert_eq!(titles(&body), vec!["To Kill a Mockingbird"]);
}

#[tokio::test]
async fn test_blank_search_lists_newest_first() {
    let app = spawn_app().await;
    seed_catalog(&app).await;

    let (_, body) = app.send(Method::GET, "/api/books?search=%20%20", None, None).await;
    assert_eq!(
        titles(&body),
        vec!["To Kill a Mockingbird", "The Great Gatsby"]
    );
}

#[tokio::test]
async fn test_explicit_ordering_and_filters() {
    let app = spawn_app().await;
    seed_catalog(&app).await;
    app.add_book("Gatsby Revisited", "A. Critic", "9780000000099").await;

    let (_, body) = app
        .send(Method::GET, "/api/books?search=gatsby&ordering=title", None, None)
        .await;
    assert_eq!(titles(&body), vec!["Gatsby Revisited", "The Great Gatsby"]);

    let (_, body) = app
        .send(Method::GET, "/api/books?ordering=-title", None, None)
        .await;
    assert_eq!(titles(&body)[0], "To Kill a Mockingbird");

    let (_, body) = app
        .send(Method::GET, "/api/books?author=lee", None, None)
        .await;
    assert_eq!(titles(&body), vec!["To Kill a Mockingbird"]);

    let (_, body) = app
        .send(Method::GET, "/api/books?isbn=9780743273565", None, None)
        .await;
    assert_eq!(titles(&body), vec!["The Great Gatsby"]);
}

#[tokio::test]
async fn test_title_ordering_ignores_case() {
    let app = spawn_app().await;
    app.add_book("Zebra Crossings", "Anon", "9780000000021").await;
    app.add_book("apple orchards", "Anon", "9780000000022").await;
    app.add_book("Mango Season", "Anon", "9780000000023").await;

    let (_, body) = app
        .send(Method::GET, "/api/books?ordering=title", None, None)
        .await;
    assert_eq!(
        titles(&body),
        vec!["apple orchards", "Mango Season", "Zebra Crossings"]
    );
}

#[tokio::test]
async fn test_availability_filter_follows_loans() {
    let app = spawn_app().await;
    seed_catalog(&app).await;
    let (_, member) = app.add_member("filterer").await;

    let (_, body) = app.send(Method::GET, "/api/books?search=Gatsby", None, None).await;
    let gatsby_id = body["items"][0]["id"].as_i64().unwrap();
    app.state.services.loans.borrow(&member, gatsby_id).await.unwrap();

    let (_, body) = app
        .send(Method::GET, "/api/books?is_available=true", None, None)
        .await;
    assert_eq!(titles(&body), vec!["To Kill a Mockingbird"]);

    let (_, body) = app
        .send(Method::GET, "/api/books?is_available=false", None, None)
        .await;
    assert_eq!(titles(&body), vec!["The Great Gatsby"]);
}

#[tokio::test]
async fn test_pagination() {
    let app = spawn_app().await;
    for i in 0..12 {
        app.add_book(&format!("Volume {:02}", i), "Serial", &format!("97810000000{:02}", i))
            .await;
    }

    let (_, first) = app.send(Method::GET, "/api/books", None, None).await;
    assert_eq!(first["total"], 12);
    assert_eq!(first["per_page"], 10);
    assert_eq!(first["items"].as_array().unwrap().len(), 10);

    let (_, second) = app
        .send(Method::GET, "/api/books?page=2&ordering=title", None, None)
        .await;
    assert_eq!(second["page"], 2);
    assert_eq!(titles(&second), vec!["Volume 10", "Volume 11"]);

    let (_, capped) = app
        .send(Method::GET, "/api/books?page_size=1000", None, None)
        .await;
    assert_eq!(capped["per_page"], 100);
}

#[tokio::test]
async fn test_huge_page_number_returns_empty_page() {
    let app = spawn_app().await;
    app.add_book("Dune", "Frank Herbert", "9780441172719").await;

    let (status, body) = app
        .send(
            Method::GET,
            "/api/books?page=9223372036854775807&page_size=100",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["page"], i64::MAX);
    assert!(body["items"].as_array().unwrap().is_empty());
}
