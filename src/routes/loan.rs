//! Loan route definitions

use axum::{routing::get, Router};

use crate::handlers::get_loan_schedule;
use crate::state::AppState;

pub fn loan_routes() -> Router<AppState> {
    Router::new().route("/api/loans/:loan_id/schedule", get(get_loan_schedule))
}
