//! Payment gateway webhook

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::error::{ApiError, ApiResult};
use crate::gateway::{parse_delivery, GatewayProvider, SIGNATURE_HEADER};
use crate::models::WebhookAck;
use crate::repayment::{IngestOutcome, RepaymentError};
use crate::state::AppState;

/// Receive a payment confirmation from a gateway.
///
/// The signature covers the raw body, so the payload is parsed only after
/// verification.
pub async fn gateway_callback(
    State(app_state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let provider: GatewayProvider = provider
        .parse()
        .map_err(|e| ApiError::from(RepaymentError::from(e)))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|h| h.to_str().ok());

    let payment = parse_delivery(provider, &app_state.gateways, &body, signature).map_err(|e| {
        tracing::warn!(gateway = %provider, error = %e, "Gateway delivery refused");
        ApiError::from(RepaymentError::from(e))
    })?;

    match app_state
        .repayment_service
        .ingest_gateway_payment(payment)
        .await?
    {
        IngestOutcome::Recorded(_) => Ok(Json(WebhookAck::recorded())),
        IngestOutcome::Duplicate => Ok(Json(WebhookAck::duplicate())),
    }
}
