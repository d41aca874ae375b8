use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newswire::config::Config;
use newswire::db::Database;
use newswire::fetcher::{start_background_refresh, Fetcher};
use newswire::realtime::Hub;
use newswire::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newswire=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load_or_default("newswire.toml")?.with_env_overrides();
    info!(
        "Loaded configuration with {} categories",
        config.categories.len()
    );
    if config.provider.api_key.is_none() {
        warn!("No provider API key configured, only cached news will be served");
    }

    // Initialize database
    let db = Database::new(&config.database_url).await?;
    db.initialize().await?;
    info!("Database initialized");

    let db = Arc::new(db);

    let fetcher = Arc::new(Fetcher::new(db.clone(), config.provider.clone())?);
    let hub = Hub::new();

    // Start background refresh task
    tokio::spawn(start_background_refresh(
        fetcher.clone(),
        hub.clone(),
        config.refresh_interval,
    ));

    let state = Arc::new(AppState {
        db,
        fetcher,
        hub,
        categories: config.categories.clone(),
    });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server starting on http://{}", config.bind);

    axum::serve(listener, app).await?;

    Ok(())
}
