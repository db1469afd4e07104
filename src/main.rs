//! Shop API - E-commerce REST backend

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{extract::Request, ServiceExt};
use secrecy::ExposeSecret;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shop_api::{config::AppConfig, messaging::EventPublisher, state::AppState, store::PgStore};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "shop_api=info,tower_http=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    let store = PgStore::connect(config.database_url.expose_secret(), config.database_max_connections).await?;
    store.migrate().await?;
    let events = EventPublisher::connect(config.nats_url.as_deref()).await;

    let addr = config.socket_addr();
    let state = AppState::new(Arc::new(store), config, events)?;
    if state.stripe.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not set, checkout is disabled");
    }
    tracing::info!(publishing = state.events.is_enabled(), "Domain events");
    let app = shop_api::app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Shop API listening on {}", addr);
    axum::serve(listener, ServiceExt::<Request>::into_make_service(app))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("Shop API stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
