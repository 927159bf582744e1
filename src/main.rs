use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use newsdesk::aggregator::{start_background_refresh, Aggregator};
use newsdesk::config::{Config, FeedRegistry};
use newsdesk::db::Database;
use newsdesk::fetcher::Fetcher;
use newsdesk::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "newsdesk=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path =
        std::env::var("NEWSDESK_CONFIG").unwrap_or_else(|_| "feeds.toml".to_string());
    let config = Config::load(&config_path)?;
    info!(
        "loaded {} feed registration(s) from {config_path}",
        config.feeds.len()
    );

    // Initialize database
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:newsdesk.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    info!("database initialized");

    let db = Arc::new(db);
    let fetcher = Arc::new(Fetcher::new());
    let registry = Arc::new(FeedRegistry::new(&config_path, config.clone()));
    let aggregator = Arc::new(Aggregator::new(db.clone(), fetcher, registry, &config));

    // Start background refresh task
    let bg_aggregator = aggregator.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        start_background_refresh(bg_aggregator, refresh_interval).await;
    });

    // Build router
    let state = Arc::new(AppState { aggregator });
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Server starting on http://localhost:3000");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Flush pending writes before exit
    db.close().await;
    info!("database closed, shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
