//! Repayment API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::models::ApiResponse;
use crate::repayment::{
    CreateRepaymentRequest, CreateRepaymentResponse, PreviewResponse, QueueRepaymentsRequest,
    QueueRepaymentsResponse, ReasonRequest, Repayment, StatusResponse, VoidResponse,
};
use crate::state::AppState;

/// Record a repayment and apply it immediately
pub async fn create_repayment(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
    Json(request): Json<CreateRepaymentRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<CreateRepaymentResponse>>)> {
    let response = app_state
        .repayment_service
        .create_repayment(&user.actor(), loan_id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(response))))
}

/// Show how a payment would be allocated
pub async fn preview_repayment(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
    Json(request): Json<CreateRepaymentRequest>,
) -> ApiResult<Json<ApiResponse<PreviewResponse>>> {
    let preview = app_state
        .repayment_service
        .preview(&user.actor(), loan_id, request)
        .await?;

    Ok(Json(ApiResponse::ok(preview)))
}

/// Queue repayments for later approval
pub async fn queue_repayments(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<QueueRepaymentsRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<QueueRepaymentsResponse>>)> {
    let response = app_state
        .repayment_service
        .queue_batch(&user.actor(), request)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(ApiResponse::ok(response))))
}

pub async fn get_repayment(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Repayment>>> {
    let repayment = app_state.repayment_service.get(&user.actor(), id).await?;
    Ok(Json(ApiResponse::ok(repayment)))
}

pub async fn list_loan_repayments(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<Repayment>>>> {
    let repayments = app_state
        .repayment_service
        .list_for_loan(&user.actor(), loan_id)
        .await?;
    Ok(Json(ApiResponse::ok(repayments)))
}

pub async fn approve_repayment(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<StatusResponse>>> {
    let response = app_state
        .repayment_service
        .approve(&user.actor(), id)
        .await?;
    Ok(Json(ApiResponse::ok(response)))
}

/// Reject a pending repayment. The body is optional.
pub async fn reject_repayment(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    request: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ApiResponse<StatusResponse>>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let response = app_state
        .repayment_service
        .reject(&user.actor(), id, request)
        .await?;
    Ok(Json(ApiResponse::ok(response)))
}

/// Void a repayment. The body is optional.
pub async fn void_repayment(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<Uuid>,
    request: Option<Json<ReasonRequest>>,
) -> ApiResult<Json<ApiResponse<VoidResponse>>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let response = app_state
        .repayment_service
        .void(&user.actor(), id, request)
        .await?;
    Ok(Json(ApiResponse::ok(response)))
}
