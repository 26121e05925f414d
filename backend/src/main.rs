//! LPR Gateway - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use lpr_gateway_backend::{
    api,
    config::Config,
    db,
    error::Result,
    services::{clock::SystemClock, metrics_service},
    storage::{LprStore, MemoryStore, PgStore},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration, then tracing at the configured level
    let config = Config::from_env()?;
    telemetry::init_tracing(&config.log_level, config.log_format);
    tracing::info!(?config, "Starting LPR gateway");

    let store: Arc<dyn LprStore> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store, state is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let db_pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
        tracing::info!("Connected to database");

        db::run_migrations(&db_pool).await?;
        tracing::info!("Database migrations complete");
        Arc::new(PgStore::new(db_pool))
    };

    // Initialize Prometheus metrics recorder
    let metrics_handle = metrics_service::init_metrics()?;
    tracing::info!("Prometheus metrics recorder initialized");

    let mut app_state = api::AppState::new(config.clone(), store, Arc::new(SystemClock));
    app_state.set_metrics_handle(metrics_handle);
    let state = Arc::new(app_state);

    // Build router
    let app = Router::new()
        .merge(api::routes::create_router(state))
        .layer(axum::middleware::from_fn(metrics_service::metrics_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
