//! API handlers for Libris REST endpoints

pub mod auth;
pub mod books;
pub mod health;
pub mod loans;
pub mod reviews;
pub mod users;

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    error::AppError,
    models::user::{Identity, TokenType, User, UserClaims},
    AppState,
};

/// Extractor for the authenticated account behind a JWT access token.
///
/// The account is reloaded on every request, so deactivation and role
/// changes apply before the token expires.
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn identity(&self) -> Identity {
        self.0.identity()
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                AppError::Authentication("Authentication credentials were not provided.".to_string())
            })?;

        // "Bearer <token>" or a bare token
        let token = auth_header
            .strip_prefix("Bearer ")
            .unwrap_or(auth_header)
            .trim();
        if token.is_empty() {
            return Err(AppError::Authentication(
                "Authentication credentials were not provided.".to_string(),
            ));
        }

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(format!("Token is invalid or expired: {}", e)))?;

        if claims.token_type != TokenType::Access {
            return Err(AppError::Authentication(
                "Token has wrong type".to_string(),
            ));
        }

        let user = state.services.users.resolve_access(&claims).await?;
        Ok(AuthenticatedUser(user))
    }
}

/// JSON body whose parse failures are reported as `AppError::BadRequest`
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// Create the application router with all routes
pub fn router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Health check
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Authentication and profile
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/token/refresh", post(auth::refresh))
        .route("/auth/me", get(auth::me).put(auth::update_me).patch(auth::update_me))
        // User administration
        .route("/auth/users", get(users::list_users).post(users::create_user))
        .route(
            "/auth/users/:id",
            get(users::get_user)
                .put(users::update_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        // Books (catalog)
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .patch(books::update_book)
                .delete(books::delete_book),
        )
        // Loans
        .route("/loans", get(loans::list_loans))
        .route("/loans/borrow", post(loans::borrow))
        .route("/loans/active", get(loans::active_loans))
        .route("/loans/my_loans", get(loans::my_loans))
        .route("/loans/overdue", get(loans::overdue_loans))
        .route("/loans/all", get(loans::all_loans))
        .route("/loans/:id", get(loans::get_loan))
        .route("/loans/:id/return", post(loans::return_loan))
        // Reviews
        .route("/reviews", get(reviews::list_reviews).post(reviews::create_review))
        .route("/reviews/my_reviews", get(reviews::my_reviews))
        .route(
            "/reviews/:id",
            get(reviews::get_review)
                .put(reviews::update_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
