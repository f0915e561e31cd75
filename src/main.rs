mod backend;
mod config;
mod download;
mod error;
mod generation;
mod relay;
mod routes;
mod speech;
mod state;
mod websocket;

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use backend::BackendClient;
use config::Config;
use generation::GenerationClient;
use speech::CloudSpeechBackend;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "voxdoc_backend=debug,tower_http=info".to_string()),
        )
        .init();

    let config_paths: Vec<String> = vec![
        std::env::var("CONFIG_PATH").ok(),
        Some("conf.yaml".to_string()),
        Some("config/conf.yaml".to_string()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut config = None;
    let mut loaded_path = String::new();
    for path in &config_paths {
        match Config::load(path) {
            Ok(cfg) => {
                config = Some(cfg);
                loaded_path = path.clone();
                break;
            }
            Err(e) => {
                tracing::debug!("Failed to load config from {}: {}", path, e);
                continue;
            }
        }
    }
    let config = config.ok_or_else(|| {
        anyhow::anyhow!("Could not find config file. Tried: {:?}", config_paths)
    })?;
    info!("Loaded configuration from: {}", loaded_path);

    // Upstream clients are built here and injected; their lifecycle is
    // owned by the process entry point
    let speech = Arc::new(CloudSpeechBackend::new(config.speech.clone()));
    let generation = Arc::new(GenerationClient::new(config.generation.clone()));
    let backend = Arc::new(BackendClient::new(config.datastore.clone()));

    let app_state = AppState::new(config.clone(), speech, generation, backend);

    let app = Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", config.system.host, config.system.port).parse()?;
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
