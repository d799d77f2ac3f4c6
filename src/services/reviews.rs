//! Book reviews service

use validator::Validate;

use crate::{
    error::AppResult,
    models::{
        review::{CreateReview, NewReview, Review, ReviewFilter, UpdateReview},
        user::Identity,
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct ReviewsService {
    repository: Repository,
}

impl ReviewsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self, filter: &ReviewFilter) -> AppResult<Vec<Review>> {
        self.repository.reviews.list(filter).await
    }

    pub async fn get(&self, id: i64) -> AppResult<Review> {
        self.repository.reviews.get(id).await
    }

    pub async fn my_reviews(&self, actor: &Identity) -> AppResult<Vec<Review>> {
        let filter = ReviewFilter {
            user_id: Some(actor.user_id),
            ..Default::default()
        };
        self.repository.reviews.list(&filter).await
    }

    /// One review per user and book; the book must exist
    pub async fn create(&self, actor: &Identity, request: CreateReview) -> AppResult<Review> {
        request.validate()?;
        self.repository.books.get(request.book_id).await?;

        self.repository
            .reviews
            .create(&NewReview {
                user_id: actor.user_id,
                book_id: request.book_id,
                rating: request.rating,
                text: request.text,
            })
            .await
    }

    /// Owner or administrator
    pub async fn update(&self, actor: &Identity, id: i64, changes: UpdateReview) -> AppResult<Review> {
        changes.validate()?;
        let review = self.repository.reviews.get(id).await?;
        actor.require_owner(review.user_id)?;
        self.repository.reviews.update(id, &changes).await
    }

    /// Owner or administrator
    pub async fn delete(&self, actor: &Identity, id: i64) -> AppResult<()> {
        let review = self.repository.reviews.get(id).await?;
        actor.require_owner(review.user_id)?;
        self.repository.reviews.delete(id).await
    }
}
