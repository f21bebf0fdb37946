//! Gateway webhook routes. These are authenticated by signature, not JWT.

use axum::{routing::post, Router};

use crate::handlers::gateway_callback;
use crate::state::AppState;

pub fn gateway_routes() -> Router<AppState> {
    Router::new().route("/api/gateways/:provider/callback", post(gateway_callback))
}
