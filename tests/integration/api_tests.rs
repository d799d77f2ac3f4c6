//! HTTP-level tests driving the router on the in-memory backend

use axum::http::{Method, StatusCode};
use serde_json::json;

use crate::common::{spawn_app, MEMBER_PASSWORD};

#[tokio::test]
async fn test_health_check() {
    let app = spawn_app().await;

    let (status, body) = app.send(Method::GET, "/api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = app.send(Method::GET, "/api/ready", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_register_login_and_profile() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "Reader@Libris.test",
                "username": "reader",
                "password": MEMBER_PASSWORD,
                "password_confirm": MEMBER_PASSWORD,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully");
    assert_eq!(body["user"]["role"], "member");
    assert_eq!(body["user"]["email"], "reader@libris.test");
    assert!(body["user"].get("password_hash").is_none());

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "reader@libris.test", "password": MEMBER_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "Bearer");
    let access = body["access"].as_str().unwrap().to_string();
    let refresh = body["refresh"].as_str().unwrap().to_string();

    let (status, body) = app.send(Method::GET, "/api/auth/me", Some(&access), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["username"], "reader");

    // Refresh tokens cannot be used as access tokens
    let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&refresh), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/token/refresh",
            None,
            Some(json!({ "refresh": refresh })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["access"].is_string());
}

#[tokio::test]
async fn test_register_rejects_mismatched_passwords() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "email": "reader@libris.test",
                "username": "reader",
                "password": MEMBER_PASSWORD,
                "password_confirm": "something-else",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadValue");
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let app = spawn_app().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "admin@libris.test", "password": "wrong" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "No active account found with the given credentials");
}

#[tokio::test]
async fn test_missing_and_bare_tokens() {
    let app = spawn_app().await;

    let (status, _) = app.send(Method::GET, "/api/loans/my_loans", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let token = app.admin_token().await;
    let request = axum::http::Request::builder()
        .method(Method::GET)
        .uri("/api/auth/me")
        .header(axum::http::header::AUTHORIZATION, token)
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(libris_server::api::router(app.state.clone()), request)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_member_cannot_manage_catalog() {
    let app = spawn_app().await;
    app.add_member("member").await;
    let token = app.token("member@libris.test", MEMBER_PASSWORD).await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/books",
            Some(&token),
            Some(json!({ "title": "T", "author": "A", "isbn": "9780743273565" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, "/api/loans/overdue", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send(Method::GET, "/api/auth/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_book_validation_and_duplicates() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/books",
            Some(&token),
            Some(json!({ "title": "Dune", "author": "Frank Herbert", "isbn": "978-0-441-17271-9" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["isbn"], "9780441172719");
    assert_eq!(body["is_available"], true);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/books",
            Some(&token),
            Some(json!({ "title": "Dune", "author": "Frank Herbert", "isbn": "9780441172719" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "A book with this ISBN already exists.");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/books",
            Some(&token),
            Some(json!({ "title": "Dune", "author": "Frank Herbert", "isbn": "12345" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("10 or 13"));

    let (status, _) = app
        .send(Method::POST, "/api/books", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_member_admin_borrowing_scenario() {
    let app = spawn_app().await;
    let book_a = app.add_book("Book A", "Author A", "9780000000001").await;
    let book_b = app.add_book("Book B", "Author B", "9780000000002").await;
    app.add_member("m").await;
    let member = app.token("m@libris.test", MEMBER_PASSWORD).await;
    let admin = app.admin_token().await;

    let (status, loan) = app
        .send(
            Method::POST,
            "/api/loans/borrow",
            Some(&member),
            Some(json!({ "book_id": book_a.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(loan["is_active"], true);
    assert_eq!(loan["book"]["is_available"], false);

    let (_, book) = app
        .send(Method::GET, &format!("/api/books/{}", book_a.id), None, None)
        .await;
    assert_eq!(book["is_available"], false);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/loans/borrow",
            Some(&member),
            Some(json!({ "book_id": book_b.id })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You can only borrow 1 book at a time.");

    // Members cannot return books
    let return_uri = format!("/api/loans/{}/return", loan["id"]);
    let (status, _) = app.send(Method::POST, &return_uri, Some(&member), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, returned) = app.send(Method::POST, &return_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["is_active"], false);
    assert!(returned["returned_at"].is_string());

    let (_, book) = app
        .send(Method::GET, &format!("/api/books/{}", book_a.id), None, None)
        .await;
    assert_eq!(book["is_available"], true);

    let (status, body) = app.send(Method::POST, &return_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Book already returned.");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/loans/borrow",
            Some(&member),
            Some(json!({ "book_id": book_b.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, history) = app.send(Method::GET, "/api/loans/my_loans", Some(&member), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 2);

    let (_, active) = app.send(Method::GET, "/api/loans/active", Some(&member), None).await;
    assert_eq!(active.as_array().unwrap().len(), 1);
    assert_eq!(active[0]["book"]["id"], book_b.id);

    // Book A has loan history and cannot be deleted
    let (status, _) = app
        .send(Method::DELETE, &format!("/api/books/{}", book_a.id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_borrow_unknown_book() {
    let app = spawn_app().await;
    let token = app.admin_token().await;

    let (status, body) = app
        .send(Method::POST, "/api/loans/borrow", Some(&token), Some(json!({ "book_id": 999 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NoSuchEntity");
}

#[tokio::test]
async fn test_loans_are_private_to_their_borrower() {
    let app = spawn_app().await;
    let book = app.add_book("Private", "Reader", "9780000000003").await;
    let (_, owner) = app.add_member("owner").await;
    app.add_member("other").await;
    let other = app.token("other@libris.test", MEMBER_PASSWORD).await;

    let loan = app
        .state
        .services
        .loans
        .borrow(&owner, book.id)
        .await
        .unwrap();

    let (status, _) = app
        .send(Method::GET, &format!("/api/loans/{}", loan.id), Some(&other), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, visible) = app.send(Method::GET, "/api/loans", Some(&other), None).await;
    assert!(visible.as_array().unwrap().is_empty());

    let admin = app.admin_token().await;
    let (_, all) = app.send(Method::GET, "/api/loans/all", Some(&admin), None).await;
    assert_eq!(all.as_array().unwrap().len(), 1);
    assert_eq!(all[0]["user_email"], "owner@libris.test");
}

#[tokio::test]
async fn test_review_lifecycle() {
    let app = spawn_app().await;
    let book = app.add_book("Reviewed", "Critic", "9780000000004").await;
    app.add_member("writer").await;
    app.add_member("stranger").await;
    let writer = app.token("writer@libris.test", MEMBER_PASSWORD).await;
    let stranger = app.token("stranger@libris.test", MEMBER_PASSWORD).await;

    let (status, review) = app
        .send(
            Method::POST,
            "/api/reviews",
            Some(&writer),
            Some(json!({ "book_id": book.id, "rating": 4, "text": "Solid." })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(review["book_title"], "Reviewed");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/reviews",
            Some(&writer),
            Some(json!({ "book_id": book.id, "rating": 5 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "You have already reviewed this book.");

    let (status, _) = app
        .send(
            Method::POST,
            "/api/reviews",
            Some(&stranger),
            Some(json!({ "book_id": book.id, "rating": 9 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let review_uri = format!("/api/reviews/{}", review["id"]);
    let (status, _) = app
        .send(Method::PATCH, &review_uri, Some(&stranger), Some(json!({ "rating": 1 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, updated) = app
        .send(Method::PATCH, &review_uri, Some(&writer), Some(json!({ "rating": 5 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["rating"], 5);

    let (_, listed) = app
        .send(Method::GET, &format!("/api/reviews?book_id={}", book.id), None, None)
        .await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = app.send(Method::DELETE, &review_uri, Some(&writer), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, mine) = app.send(Method::GET, "/api/reviews/my_reviews", Some(&writer), None).await;
    assert!(mine.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_user_management() {
    let app = spawn_app().await;
    let (member, _) = app.add_member("managed").await;
    let admin = app.admin_token().await;

    let (status, users) = app.send(Method::GET, "/api/auth/users", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 2);

    let (status, updated) = app
        .send(
            Method::PATCH,
            &format!("/api/auth/users/{}", member.id),
            Some(&admin),
            Some(json!({ "role": "administrator" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["role"], "administrator");

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/auth/users/{}", member.id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Deactivated accounts can no longer log in
    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "email": "managed@libris.test", "password": MEMBER_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deactivated_account_token_is_rejected() {
    let app = spawn_app().await;
    let book = app.add_book("Late Return", "Reader", "9780000000011").await;
    let (member, _) = app.add_member("leaver").await;
    let token = app.token("leaver@libris.test", MEMBER_PASSWORD).await;
    let admin = app.admin_token().await;

    let (status, _) = app
        .send(Method::DELETE, &format!("/api/auth/users/{}", member.id), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = app
        .send(
            Method::POST,
            "/api/loans/borrow",
            Some(&token),
            Some(json!({ "book_id": book.id })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::GET, "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (_, stored) = app
        .send(Method::GET, &format!("/api/books/{}", book.id), None, None)
        .await;
    assert_eq!(stored["is_available"], true);
}

#[tokio::test]
async fn test_demoted_administrator_loses_admin_rights() {
    let app = spawn_app().await;
    let book = app.add_book("Demotion", "Reader", "9780000000012").await;
    let (staff, _) = app.add_member("staff").await;
    let admin = app.admin_token().await;

    let user_uri = format!("/api/auth/users/{}", staff.id);
    let (status, _) = app
        .send(Method::PATCH, &user_uri, Some(&admin), Some(json!({ "role": "administrator" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let staff_token = app.token("staff@libris.test", MEMBER_PASSWORD).await;

    let (status, loan) = app
        .send(
            Method::POST,
            "/api/loans/borrow",
            Some(&admin),
            Some(json!({ "book_id": book.id })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send(Method::PATCH, &user_uri, Some(&admin), Some(json!({ "role": "member" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    // The token still says administrator; the stored role decides
    let return_uri = format!("/api/loans/{}/return", loan["id"]);
    let (status, _) = app.send(Method::POST, &return_uri, Some(&staff_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, still_out) = app
        .send(Method::GET, &format!("/api/books/{}", book.id), None, None)
        .await;
    assert_eq!(still_out["is_available"], false);
}
