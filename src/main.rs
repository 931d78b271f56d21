//! Roomgate - Room access & presence coordinator
//!
//! Main entry point for the roomgate server.

use roomgate::{
    detector::{VisionClient, VisionConfig},
    web_api, AppConfig, AppState,
};
use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roomgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting roomgate v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        device_base_url = %config.device_base_url,
        vision_url = ?config.vision_url,
        policy_mode = ?config.policy_mode,
        acceptance_distance = config.acceptance_distance,
        "Configuration loaded"
    );

    // Create database pool
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await?;

    tracing::info!("Database connected");

    let state = AppState::assemble(config, Some(pool))?;

    // Load or create the singleton room record up front
    let room = state.room.read().await?;
    tracing::info!(
        people_count = room.people_count(),
        last_rfid = %room.last_rfid,
        "RoomState loaded"
    );

    // Detector
    if let Some(ref url) = state.config.vision_url {
        let client = VisionClient::new(VisionConfig {
            base_url: url.clone(),
            capture_device: state.config.capture_device.clone(),
            person_confidence: state.config.person_confidence,
            request_timeout: state.config.capture_timeout,
        })?;

        // A backend that is not ready yet still gets attached; captures
        // report it as unavailable until it comes up
        if let Err(e) = client.open().await {
            tracing::warn!(error = %e, "Vision backend could not open the camera");
        }
        state.detector.init(Arc::new(client)).await;
    } else {
        tracing::warn!("VISION_URL not set - detector stays uninitialized, access checks will be denied");
    }

    // Periodic presence ticks
    if let Some(period) = state.config.presence_tick {
        state.presence.start(period).await;
    }

    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = state.config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        })
        .await?;

    // Teardown
    state.presence.stop().await;
    state.detector.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}
