//! Reviews repository for database operations

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::review::{NewReview, Review, ReviewFilter, UpdateReview},
};

use super::ReviewStore;

const REVIEW_SELECT: &str = r#"
    SELECT r.id, r.user_id, u.email AS user_email, r.book_id, b.title AS book_title,
           r.rating, r.text, r.created_at, r.updated_at
    FROM reviews r
    JOIN users u ON u.id = r.user_id
    JOIN books b ON b.id = r.book_id
"#;

#[derive(Clone)]
pub struct ReviewsRepository {
    pool: Pool<Postgres>,
}

impl ReviewsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for ReviewsRepository {
    async fn get(&self, id: i64) -> AppResult<Review> {
        sqlx::query_as::<_, Review>(&format!("{} WHERE r.id = $1", REVIEW_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Review with id {} not found", id)))
    }

    async fn list(&self, filter: &ReviewFilter) -> AppResult<Vec<Review>> {
        let mut qb = QueryBuilder::<Postgres>::new(REVIEW_SELECT);
        qb.push(" WHERE TRUE");
        if let Some(book_id) = filter.book_id {
            qb.push(" AND r.book_id = ").push_bind(book_id);
        }
        if let Some(user_id) = filter.user_id {
            qb.push(" AND r.user_id = ").push_bind(user_id);
        }
        qb.push(" ORDER BY r.created_at DESC, r.id DESC");

        let reviews = qb.build_query_as::<Review>().fetch_all(&self.pool).await?;
        Ok(reviews)
    }

    async fn create(&self, review: &NewReview) -> AppResult<Review> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO reviews (user_id, book_id, rating, text)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(review.user_id)
        .bind(review.book_id)
        .bind(review.rating)
        .bind(&review.text)
        .fetch_one(&self.pool)
        .await?;

        self.get(id).await
    }

    async fn update(&self, id: i64, changes: &UpdateReview) -> AppResult<Review> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE reviews SET updated_at = NOW()");
        if let Some(rating) = changes.rating {
            qb.push(", rating = ").push_bind(rating);
        }
        if let Some(ref text) = changes.text {
            qb.push(", text = ").push_bind(text.clone());
        }
        qb.push(" WHERE id = ").push_bind(id);

        let result = qb.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Review with id {} not found", id)));
        }

        self.get(id).await
    }

    async fn delete(&self, id: i64) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Review with id {} not found", id)));
        }

        Ok(())
    }
}
