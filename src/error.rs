//! Error types for Libris server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::loan::MAX_ACTIVE_LOANS_PER_USER;

/// Stable application error codes returned in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthenticated = 2,
    NotAuthorized = 3,
    DbFailure = 4,
    NoSuchEntity = 5,
    BadValue = 6,
    Duplicate = 7,
    BookNotAvailable = 8,
    AlreadyBorrowed = 9,
    MaxBorrowsReached = 10,
    AlreadyReturned = 11,
    LockTimeout = 12,
}

/// Borrowing rule violations detected by the loans engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoanConflict {
    #[error("Book is not available.")]
    BookUnavailable,

    #[error("You already have this book.")]
    AlreadyBorrowed,

    #[error("You can only borrow {limit} book at a time.")]
    LimitReached { limit: i64 },

    #[error("Book already returned.")]
    AlreadyReturned,
}

impl LoanConflict {
    fn code(&self) -> ErrorCode {
        match self {
            LoanConflict::BookUnavailable => ErrorCode::BookNotAvailable,
            LoanConflict::AlreadyBorrowed => ErrorCode::AlreadyBorrowed,
            LoanConflict::LimitReached { .. } => ErrorCode::MaxBorrowsReached,
            LoanConflict::AlreadyReturned => ErrorCode::AlreadyReturned,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Loan(#[from] LoanConflict),

    /// Lock contention; the caller may retry the whole operation
    #[error("Lock timeout: {0}")]
    LockTimeout(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::LockTimeout(_))
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            match db_err.code().as_deref() {
                // lock_not_available, serialization_failure, deadlock_detected
                Some("55P03") | Some("40001") | Some("40P01") => {
                    return AppError::LockTimeout(
                        "Another request is using this record, try again".to_string(),
                    );
                }
                Some("23505") => {
                    return unique_violation(db_err.constraint());
                }
                // foreign_key_violation: a loan still references the row
                Some("23503") => {
                    return AppError::Conflict(
                        "This record is referenced by loan history and cannot be deleted."
                            .to_string(),
                    );
                }
                _ => {}
            }
        }
        AppError::Database(err)
    }
}

/// Maps a unique-constraint name from the schema onto the matching business error
pub(crate) fn unique_violation(constraint: Option<&str>) -> AppError {
    match constraint {
        Some("loans_one_active_per_book") => LoanConflict::BookUnavailable.into(),
        Some("loans_one_active_per_user") => LoanConflict::LimitReached {
            limit: MAX_ACTIVE_LOANS_PER_USER,
        }
        .into(),
        Some("books_isbn_key") => {
            AppError::Conflict("A book with this ISBN already exists.".to_string())
        }
        Some("users_email_key") => {
            AppError::Conflict("A user with this email already exists.".to_string())
        }
        Some("users_username_key") => {
            AppError::Conflict("A user with this username already exists.".to_string())
        }
        Some("reviews_user_id_book_id_key") => {
            AppError::Conflict("You have already reviewed this book.".to_string())
        }
        _ => AppError::Conflict("Duplicate record".to_string()),
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(msg) => format!("{}: {}", field, msg),
                    None => format!("{}: invalid value ({})", field, e.code),
                })
            })
            .collect();
        messages.sort();
        AppError::Validation(messages.join("; "))
    }
}

/// Error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, ErrorCode) {
        match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthenticated),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NoSuchEntity),
            AppError::Validation(_) | AppError::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue)
            }
            AppError::Conflict(_) => (StatusCode::BAD_REQUEST, ErrorCode::Duplicate),
            AppError::Loan(conflict) => (StatusCode::BAD_REQUEST, conflict.code()),
            AppError::LockTimeout(_) => (StatusCode::CONFLICT, ErrorCode::LockTimeout),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let message = match &self {
            AppError::Authentication(msg)
            | AppError::Authorization(msg)
            | AppError::NotFound(msg)
            | AppError::Validation(msg)
            | AppError::Conflict(msg)
            | AppError::LockTimeout(msg)
            | AppError::BadRequest(msg) => msg.clone(),
            AppError::Loan(conflict) => conflict.to_string(),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            retryable: self.is_retryable(),
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
