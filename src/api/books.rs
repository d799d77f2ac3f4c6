//! Book catalog endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookQuery, CreateBook, UpdateBook},
        PaginatedResponse,
    },
};

use super::{AuthenticatedUser, JsonBody};

/// List books with search, filters, ordering and pagination
pub async fn list_books(
    State(state): State<crate::AppState>,
    Query(query): Query<BookQuery>,
) -> AppResult<Json<PaginatedResponse<Book>>> {
    let page = state.services.catalog.list_books(query).await?;
    Ok(Json(page))
}

/// Get book by ID
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(id).await?;
    Ok(Json(book))
}

/// Create a new book
pub async fn create_book(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    JsonBody(book): JsonBody<CreateBook>,
) -> AppResult<(StatusCode, Json<Book>)> {
    let created = state
        .services
        .catalog
        .create_book(&auth.identity(), book)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Update a book (PUT and PATCH both apply partial changes)
pub async fn update_book(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
    JsonBody(changes): JsonBody<UpdateBook>,
) -> AppResult<Json<Book>> {
    let updated = state
        .services
        .catalog
        .update_book(&auth.identity(), id, changes)
        .await?;
    Ok(Json(updated))
}

/// Delete a book without loan history
pub async fn delete_book(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state
        .services
        .catalog
        .delete_book(&auth.identity(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
