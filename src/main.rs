use std::{sync::Arc, time::Duration};

use tracing_subscriber::EnvFilter;

use lakbai_api::{
    config::Config,
    routes::{create_router, AppState},
    services::{engine_from_config, HttpClassifier, RouteClassifier},
    store::{load_pois, load_visits},
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lakbai_api=info,tower_http=info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Server exited with error");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let store = load_pois(&config.pois_path, config.delimiter())?;
    tracing::info!(path = %config.pois_path, count = store.len(), "Loaded POIs");

    let visits = load_visits(&config.visits_path, config.delimiter()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load visit log, continuing without visit data");
        Vec::new()
    });

    let engine = engine_from_config(&config)?;

    let classifier: Option<Arc<dyn RouteClassifier>> = match &config.classifier_url {
        Some(url) => {
            let timeout = Duration::from_secs(config.routing_timeout_secs);
            Some(Arc::new(HttpClassifier::new(url.as_str(), timeout)?))
        }
        None => None,
    };

    let addr = config.bind_address();
    let state = AppState::build(config, store, visits, engine, classifier).await;
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
