//! Microlend repayment server
//!
//! HTTP API for recording, approving and voiding loan repayments, plus the
//! payment gateway webhooks.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use microlend_server::app::build_router;
use microlend_server::auth::AuthService;
use microlend_server::config::Config;
use microlend_server::db;
use microlend_server::repayment::RepaymentService;
use microlend_server::side_effects::{PgSavingsMirror, TracingNotifier};
use microlend_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(
        environment = config.environment.as_str(),
        strategy = %config.engine.default_strategy,
        overpayment = ?config.engine.overpayment_policy,
        legacy_fallback = config.engine.legacy_schedule_fallback,
        "Starting repayment server"
    );

    if config.gateways.mobile_secret.is_none() || config.gateways.bank_secret.is_none() {
        tracing::warn!("A gateway secret is not configured; its webhook will refuse all deliveries");
    }

    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    let repayment_service = Arc::new(RepaymentService::new(
        db_pool.clone(),
        Arc::new(config.engine.clone()),
        Arc::new(TracingNotifier),
        Arc::new(PgSavingsMirror::new(db_pool.clone())),
    ));
    let auth_service = Arc::new(AuthService::new(config.jwt_secret.clone()));

    let app_state = AppState::new(
        repayment_service,
        auth_service,
        Arc::new(config.gateways.clone()),
        db_pool,
    );

    let app = build_router(app_state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
