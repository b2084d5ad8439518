mod app_state;
mod audit;
mod cards;
mod config;
mod crypto;
mod db;
mod delivery;
mod error;
mod handlers;
mod inventory;
mod rate_limit;
mod session;
mod verification;

use clap::Parser;
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use app_state::AppState;
use config::Config;
use db::init_pool;
use delivery::LogNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardvault_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse configuration
    let config = Arc::new(Config::parse());
    if config.admin_phone.is_empty() && config.admin_email.is_empty() {
        tracing::warn!("neither ADMIN_PHONE nor ADMIN_EMAIL is set, verification codes cannot be delivered");
    }

    // Initialize database
    let pool = init_pool(&config.database_url, config.acquire_timeout()).await?;

    // Notifiers write to the log until a gateway is configured
    let state = AppState::new(
        pool,
        config.clone(),
        Arc::new(LogNotifier::sms()),
        Arc::new(LogNotifier::email()),
    );

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(cleanup_state.config.cleanup_interval());
        loop {
            interval.tick().await;
            cleanup_state.cleanup().await;
        }
    });

    let app = handlers::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.socket_addr()).await?;
    tracing::info!("Server running on {}", config.socket_addr());

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutting down");
}
