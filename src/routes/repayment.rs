//! Repayment route definitions

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

pub fn repayment_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/loans/:loan_id/repayments",
            post(create_repayment).get(list_loan_repayments),
        )
        .route(
            "/api/loans/:loan_id/repayments/preview",
            post(preview_repayment),
        )
        .route("/api/repayments/batch", post(queue_repayments))
        .route("/api/repayments/:id", get(get_repayment))
        .route("/api/repayments/:id/approve", post(approve_repayment))
        .route("/api/repayments/:id/reject", post(reject_repayment))
        .route("/api/repayments/:id/void", post(void_repayment))
}
