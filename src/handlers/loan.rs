//! Loan read handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::models::ApiResponse;
use crate::schedule::ScheduleLine;
use crate::state::AppState;

/// Amortization schedule of a loan, oldest due first
pub async fn get_loan_schedule(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<ScheduleLine>>>> {
    let lines = app_state
        .repayment_service
        .schedule(&user.actor(), loan_id)
        .await?;
    Ok(Json(ApiResponse::ok(lines)))
}
