//! # credmate-api: Binary Entry Point
//!
//! Starts the Axum HTTP server and the daily re-evaluation sweep.
//! Binds to configurable port (default 8080).

use credmate_api::state::{AppConfig, AppState, LogFormat};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;

    // Initialize structured tracing.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }

    // Initialize database pool (absent means in-memory only).
    let db_pool = credmate_api::db::init_pool(config.database_url.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Database initialization failed: {e}");
            e
        })?;

    if config.verification_feed_url.is_none() {
        tracing::warn!(
            "VERIFICATION_FEED_URL not set. Feed-backed verification requests will return 503."
        );
    }

    let port = config.port;
    let state = AppState::with_config(config, db_pool);

    // Hydrate, install rulepacks, catch up.
    credmate_api::bootstrap::bootstrap(&state).await.map_err(|e| {
        tracing::error!("Bootstrap failed: {e}");
        e
    })?;

    let _sweep = credmate_api::bootstrap::spawn_sweep(&state);
    let app = credmate_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("CredentialMate API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
