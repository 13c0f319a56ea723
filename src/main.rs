use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bookcache::config::Config;
use bookcache::infrastructure::{AppState, HttpCatalogClient, LocalStore, WsRealtimeFeed};
use bookcache::server::{build_router, find_available_port};
use bookcache::sync::RealtimeSupervisor;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bookcache=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    // --profile overrides PROFILE
    let args: Vec<String> = std::env::args().collect();
    let profile = args
        .iter()
        .position(|arg| arg == "--profile")
        .and_then(|pos| args.get(pos + 1))
        .cloned();

    let config = Config::from_env_with_profile(profile);
    tracing::info!("Starting bookcache (profile: {})", config.profile);

    let store = LocalStore::open(&config.database_url)
        .await
        .expect("Failed to initialize database");

    let catalog = HttpCatalogClient::new(&config.catalog_base_url, config.catalog_timeout)
        .expect("Invalid catalog configuration");
    tracing::info!("Catalog at {}", config.catalog_base_url);

    let state = AppState::new(store, Arc::new(catalog))
        .await
        .expect("Failed to open book view");

    // Initial catalog pull; the server still starts if the catalog is down
    match state.coordinator.bootstrap_sync().await {
        Ok(merged) => tracing::info!("Bootstrap merged {} records", merged),
        Err(e) => tracing::warn!("Bootstrap sync failed: {}", e),
    }

    let realtime = config.realtime_url.as_ref().map(|url| {
        tracing::info!("Realtime feed at {}", url);
        RealtimeSupervisor::start(
            Arc::new(WsRealtimeFeed::new(url.clone(), config.realtime_buffer)),
            state.coordinator.clone(),
            config.realtime_collection.clone(),
            config.realtime_resubscribe_delay,
        )
    });
    if realtime.is_none() {
        tracing::info!("REALTIME_URL not set, realtime sync disabled");
    }

    let app = build_router(state, &config.cors_allowed_origins);

    // Find available port
    let port = find_available_port(config.port).expect("Failed to find available port");
    if port != config.port {
        tracing::warn!(
            "Preferred port {} was not available, using port {} instead",
            config.port,
            port
        );
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("bookcache listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await
        .expect("Failed to start server");

    if let Some(supervisor) = realtime {
        supervisor.stop().await;
    }
}
