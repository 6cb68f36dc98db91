// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use crate::application::chart_registry::ChartRegistry;
use crate::application::control_service::ControlService;
use crate::application::dashboard_service::DashboardService;
use crate::application::poll_scheduler::{PollScheduler, SchedulerSettings};
use crate::infrastructure::backend_client::BackendClient;
use crate::infrastructure::config::load_service_config;
use crate::infrastructure::neo_repository::NeoRepository;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;
use tracing_subscriber::EnvFilter;

// Single-threaded runtime: one event loop drives every panel's timers and fetches.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_service_config()?;

    // Create repositories (infrastructure layer)
    let store = Arc::new(NeoRepository::new(config.store.base_url.clone(), config.store.timeout())?);
    let backend = Arc::new(BackendClient::new(
        config.backend.base_url.clone(),
        config.backend.token.clone(),
        config.backend.timeout(),
    )?);

    // Create services (application layer)
    let settings = SchedulerSettings {
        request_timeout: config.store.timeout(),
        debounce: Duration::from_millis(config.view.refresh_debounce_ms),
    };
    let scheduler = Arc::new(PollScheduler::new(store, Arc::new(ChartRegistry::new()), settings));
    let dashboard_service = Arc::new(DashboardService::new(
        scheduler,
        backend.clone(),
        config.panels.clone(),
        &config.view.range,
    ));
    dashboard_service.reload().await;

    // Create application state
    let state = Arc::new(AppState {
        dashboard_service: dashboard_service.clone(),
        control_service: ControlService::new(backend),
    });

    // Build router (presentation layer)
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server.listen.parse()?;
    tracing::info!("Starting glance-telemetry service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    dashboard_service.shutdown();
    tracing::info!("Stopped polling, bye");
    Ok(())
}
