use std::sync::Arc;

use anyhow::Context;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tenantdb::api::{app, AppState};
use tenantdb::config;
use tenantdb::database::{driver_from_config, ConnectionSupervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL and friends
    let _ = dotenvy::dotenv();

    let config = config::config();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting tenantdb in {:?} mode", config.environment);

    let driver = driver_from_config(&config.database);
    let supervisor = Arc::new(ConnectionSupervisor::new(driver, config.database.connect_timeout()));

    // Fail fast when storage is unreachable at startup
    supervisor
        .ensure_connected()
        .await
        .context("failed to connect to the storage cluster")?;

    let state = AppState::new(supervisor.clone());

    if config.api.seed_on_startup {
        let seeder = state.seeder.clone();
        tokio::spawn(async move {
            if let Err(e) = seeder.initialize().await {
                tracing::error!(error = %e, "fixture seeding failed");
            }
        });
    }

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("tenantdb listening on http://{}", bind_addr);

    let service = if config.api.enable_request_logging {
        app(state).layer(TraceLayer::new_for_http())
    } else {
        app(state)
    };

    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    supervisor.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for shutdown signal: {}", e);
    }
}
