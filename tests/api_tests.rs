//! Router tests for the checks that run before any database access.
//!
//! The pool is lazy and points nowhere, so a test reaching the database
//! would fail with a server error.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tower::ServiceExt;

use microlend_server::app::build_router;
use microlend_server::auth::{generate_access_token, AuthService, Role};
use microlend_server::config::{Config, EngineConfig, Environment, GatewayConfig};
use microlend_server::gateway::sign;
use microlend_server::repayment::RepaymentService;
use microlend_server::side_effects::{PgSavingsMirror, TracingNotifier};
use microlend_server::state::AppState;

const JWT_SECRET: &str = "api-test-secret";
const LOAN_ID: &str = "7b0c3c52-41a5-4a1f-9a53-0d9f1d6c2f10";

fn test_config() -> Config {
    Config {
        database_url: "postgres://nobody@127.0.0.1:1/none".to_string(),
        environment: Environment::Development,
        port: 0,
        db_max_connections: 1,
        db_lock_timeout_ms: 500,
        cors_allowed_origins: None,
        log_level: "warn".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        engine: EngineConfig::default(),
        gateways: GatewayConfig {
            mobile_secret: Some("mobile-secret".to_string()),
            bank_secret: None,
            mobile_currency: "KES".to_string(),
        },
    }
}

fn app() -> Router {
    let config = test_config();
    let pool = PgPoolOptions::new()
        .acquire_timeout(std::time::Duration::from_millis(200))
        .connect_lazy(&config.database_url)
        .unwrap();

    let service = Arc::new(RepaymentService::new(
        pool.clone(),
        Arc::new(config.engine.clone()),
        Arc::new(TracingNotifier),
        Arc::new(PgSavingsMirror::new(pool.clone())),
    ));
    let state = AppState::new(
        service,
        Arc::new(AuthService::new(config.jwt_secret.clone())),
        Arc::new(config.gateways.clone()),
        pool,
    );
    build_router(state, &config)
}

fn bearer(role: Role) -> String {
    let token = generate_access_token("staff-1", role, JWT_SECRET, 300).unwrap();
    format!("Bearer {}", token)
}

fn create_body() -> Body {
    Body::from(r#"{"amount": 150, "date": "2024-04-02", "method": "cash"}"#)
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = app()
        .oneshot(
            Request::post(format!("/api/loans/{}/repayments", LOAN_ID))
                .header(header::CONTENT_TYPE, "application/json")
                .body(create_body())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_unauthorized() {
    let token = generate_access_token("staff-1", Role::Admin, "other", 300).unwrap();
    let response = app()
        .oneshot(
            Request::get(format!("/api/loans/{}/repayments", LOAN_ID))
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_viewer_cannot_record_repayments() {
    let response = app()
        .oneshot(
            Request::post(format!("/api/loans/{}/repayments", LOAN_ID))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(Role::Viewer))
                .body(create_body())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_loan_officer_cannot_void() {
    let response = app()
        .oneshot(
            Request::post(format!("/api/repayments/{}/void", LOAN_ID))
                .header(header::AUTHORIZATION, bearer(Role::LoanOfficer))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_non_positive_amount_is_a_validation_error() {
    let response = app()
        .oneshot(
            Request::post(format!("/api/loans/{}/repayments", LOAN_ID))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(Role::LoanOfficer))
                .body(Body::from(
                    r#"{"amount": 0, "date": "2024-04-02", "method": "cash"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_custom_strategy_without_order_is_rejected() {
    let response = app()
        .oneshot(
            Request::post(format!("/api/loans/{}/repayments/preview", LOAN_ID))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, bearer(Role::LoanOfficer))
                .body(Body::from(
                    r#"{"amount": 10, "date": "2024-04-02", "method": "cash", "strategy": "custom"}"#,
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_with_bad_signature_is_refused() {
    let body = r#"{"TransID":"QK1","TransAmount":"10","BillRefNumber":"LN-1","TransTime":"20240402093015"}"#;
    let response = app()
        .oneshot(
            Request::post("/api/gateways/mobile/callback")
                .header("x-gateway-signature", "00ff")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_fails_closed_without_secret() {
    let body = r#"{"transaction_id":"BT-1","amount":10,"currency":"KES","account_reference":"LN-1","value_date":"2024-04-02"}"#;
    let signature = sign("anything", body.as_bytes()).unwrap();
    let response = app()
        .oneshot(
            Request::post("/api/gateways/bank/callback")
                .header("x-gateway-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_webhook_signed_but_malformed_is_a_validation_error() {
    let body = r#"{"TransID":"QK1","TransAmount":"-4","BillRefNumber":"LN-1","TransTime":"20240402093015"}"#;
    let signature = sign("mobile-secret", body.as_bytes()).unwrap();
    let response = app()
        .oneshot(
            Request::post("/api/gateways/mobile/callback")
                .header("x-gateway-signature", signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_gateway_is_not_found() {
    let response = app()
        .oneshot(
            Request::post("/api/gateways/carrier-pigeon/callback")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_responses_carry_request_id_and_security_headers() {
    let response = app()
        .oneshot(
            Request::get(format!("/api/loans/{}/schedule", LOAN_ID))
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["cache-control"], "no-store");
}
