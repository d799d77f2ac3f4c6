//! User administration endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::user::{CreateUser, UpdateUser, User},
};

use super::{AuthenticatedUser, JsonBody};

/// List all users
pub async fn list_users(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<User>>> {
    let users = state.services.users.list_users(&auth.identity()).await?;
    Ok(Json(users))
}

/// Get user by ID
pub async fn get_user(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_user(&auth.identity(), id).await?;
    Ok(Json(user))
}

/// Create a new user with any role
pub async fn create_user(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    JsonBody(request): JsonBody<CreateUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    let user = state
        .services
        .users
        .create_user(&auth.identity(), request)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Update names, role or active flag
pub async fn update_user(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    JsonBody(request): JsonBody<UpdateUser>,
) -> AppResult<Json<User>> {
    let user = state
        .services
        .users
        .update_user(&auth.identity(), id, request)
        .await?;
    Ok(Json(user))
}

/// Deactivate a user
pub async fn delete_user(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state
        .services
        .users
        .deactivate_user(&auth.identity(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
