//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use sqlx::PgPool;

use crate::auth::AuthService;
use crate::config::GatewayConfig;
use crate::repayment::RepaymentService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub repayment_service: Arc<RepaymentService>,
    pub auth_service: Arc<AuthService>,
    pub gateways: Arc<GatewayConfig>,
    pub db_pool: PgPool,
}

impl AppState {
    pub fn new(
        repayment_service: Arc<RepaymentService>,
        auth_service: Arc<AuthService>,
        gateways: Arc<GatewayConfig>,
        db_pool: PgPool,
    ) -> Self {
        Self {
            repayment_service,
            auth_service,
            gateways,
            db_pool,
        }
    }
}

impl FromRef<AppState> for Arc<RepaymentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.repayment_service.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<GatewayConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.gateways.clone()
    }
}
