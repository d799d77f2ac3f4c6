//! Book review endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::review::{CreateReview, Review, ReviewFilter, UpdateReview},
};

use super::{AuthenticatedUser, JsonBody};

/// List reviews, optionally for one book (`?book_id=`)
pub async fn list_reviews(
    State(state): State<crate::AppState>,
    Query(filter): Query<ReviewFilter>,
) -> AppResult<Json<Vec<Review>>> {
    let reviews = state.services.reviews.list(&filter).await?;
    Ok(Json(reviews))
}

pub async fn get_review(
    State(state): State<crate::AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Review>> {
    let review = state.services.reviews.get(id).await?;
    Ok(Json(review))
}

pub async fn my_reviews(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<Review>>> {
    let reviews = state.services.reviews.my_reviews(&auth.identity()).await?;
    Ok(Json(reviews))
}

pub async fn create_review(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    JsonBody(request): JsonBody<CreateReview>,
) -> AppResult<(StatusCode, Json<Review>)> {
    let review = state
        .services
        .reviews
        .create(&auth.identity(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

pub async fn update_review(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<UpdateReview>,
) -> AppResult<Json<Review>> {
    let review = state
        .services
        .reviews
        .update(&auth.identity(), id, changes)
        .await?;
    Ok(Json(review))
}

pub async fn delete_review(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state
        .services
        .reviews
        .delete(&auth.identity(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
