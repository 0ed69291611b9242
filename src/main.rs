// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use anyhow::Context;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::application::dashboard_service::DashboardService;
use crate::infrastructure::channel_sink::ChannelSink;
use crate::infrastructure::config::load_app_config;
use crate::infrastructure::settings_file::TomlSettingsFile;
use crate::infrastructure::websocket_transport::WebSocketTransport;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    activity_log, clear_activity_log, clear_history, connect, disconnect, export_history,
    get_snapshot, health_check, set_limit, set_server_url, stream_events,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_app_config().context("Failed to load configuration")?;

    // Adapters (infrastructure layer)
    let transport = Arc::new(WebSocketTransport::new());
    let settings_repository = Arc::new(TomlSettingsFile::new(&config.storage.settings_path));
    let sink = Arc::new(ChannelSink::new(config.log.activity_entries));

    // Dashboard event loop (application layer)
    let service = DashboardService::new(
        transport,
        settings_repository,
        sink.clone(),
        config.default_client_settings(),
        config.reconnect_policy(),
        config.snapshot_options(),
    )
    .await;
    let (dashboard, service_task) = service.spawn();

    if config.feed.auto_connect {
        dashboard.connect(None).await?;
    }

    let state = Arc::new(AppState {
        dashboard: dashboard.clone(),
        sink,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/events", get(stream_events))
        .route("/api/connect", post(connect))
        .route("/api/disconnect", post(disconnect))
        .route("/api/settings/server", put(set_server_url))
        .route("/api/settings/limit", put(set_limit))
        .route("/api/history", delete(clear_history))
        .route("/api/export", get(export_history))
        .route("/api/log", get(activity_log).delete(clear_activity_log))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config
        .http
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.http.bind_addr))?;
    tracing::info!("Starting weight-telemetry dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    dashboard.shutdown().await?;
    service_task.await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
