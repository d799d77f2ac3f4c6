//! Book review model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Review with author and book labels
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Review {
    pub id: i64,
    pub user_id: i64,
    pub user_email: String,
    pub book_id: i64,
    pub book_title: String,
    pub rating: i32,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create review request
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateReview {
    pub book_id: i64,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5."))]
    pub rating: i32,
    #[serde(default)]
    pub text: String,
}

/// Update review request
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateReview {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5."))]
    pub rating: Option<i32>,
    pub text: Option<String>,
}

/// Review to insert
#[derive(Debug, Clone)]
pub struct NewReview {
    pub user_id: i64,
    pub book_id: i64,
    pub rating: i32,
    pub text: String,
}

/// Review list query parameters
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ReviewFilter {
    pub book_id: Option<i64>,
    pub user_id: Option<i64>,
}
