//! Authentication and profile endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use validator::Validate;

use crate::{
    error::AppResult,
    models::user::{LoginRequest, RefreshRequest, RegisterUser, TokenPair, UpdateProfile, User},
};

use super::{AuthenticatedUser, JsonBody};

#[derive(Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: User,
}

#[derive(Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

/// Register a new member account
pub async fn register(
    State(state): State<crate::AppState>,
    JsonBody(request): JsonBody<RegisterUser>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let user = state.services.users.register(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            user,
        }),
    ))
}

/// Login with email and password
pub async fn login(
    State(state): State<crate::AppState>,
    JsonBody(request): JsonBody<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    request.validate()?;
    let (tokens, user) = state
        .services
        .users
        .authenticate(&request.email, &request.password)
        .await?;
    Ok(Json(LoginResponse { tokens, user }))
}

/// Exchange a refresh token for a new access token
pub async fn refresh(
    State(state): State<crate::AppState>,
    JsonBody(request): JsonBody<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let tokens = state.services.users.refresh(&request.refresh).await?;
    Ok(Json(tokens))
}

/// Get current user's profile
pub async fn me(AuthenticatedUser(user): AuthenticatedUser) -> AppResult<Json<User>> {
    Ok(Json(user))
}

/// Update current user's profile
pub async fn update_me(
    State(state): State<crate::AppState>,
    AuthenticatedUser(current): AuthenticatedUser,
    JsonBody(profile): JsonBody<UpdateProfile>,
) -> AppResult<Json<User>> {
    let user = state
        .services
        .users
        .update_profile(current.id, profile)
        .await?;
    Ok(Json(user))
}
