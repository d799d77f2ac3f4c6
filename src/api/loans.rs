//! Loan management endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::{
    error::AppResult,
    models::loan::{BorrowRequest, LoanDetails},
};

use super::{AuthenticatedUser, JsonBody};

/// Borrow a book
pub async fn borrow(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    JsonBody(request): JsonBody<BorrowRequest>,
) -> AppResult<(StatusCode, Json<LoanDetails>)> {
    let loan = state
        .services
        .loans
        .borrow(&auth.identity(), request.book_id)
        .await?;
    Ok((StatusCode::CREATED, Json(loan)))
}

/// Return a borrowed book (administrators only)
pub async fn return_loan(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state
        .services
        .loans
        .return_loan(&auth.identity(), id)
        .await?;
    Ok(Json(loan))
}

/// Get a loan
pub async fn get_loan(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
    Path(id): Path<i64>,
) -> AppResult<Json<LoanDetails>> {
    let loan = state.services.loans.get_loan(&auth.identity(), id).await?;
    Ok(Json(loan))
}

/// All loans for administrators, own loans for members
pub async fn list_loans(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.list_loans(&auth.identity()).await?;
    Ok(Json(loans))
}

pub async fn active_loans(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.active_loans(&auth.identity()).await?;
    Ok(Json(loans))
}

pub async fn my_loans(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.my_loans(&auth.identity()).await?;
    Ok(Json(loans))
}

pub async fn overdue_loans(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.overdue_loans(&auth.identity()).await?;
    Ok(Json(loans))
}

pub async fn all_loans(
    State(state): State<crate::AppState>,
    auth: AuthenticatedUser,
) -> AppResult<Json<Vec<LoanDetails>>> {
    let loans = state.services.loans.all_loans(&auth.identity()).await?;
    Ok(Json(loans))
}
