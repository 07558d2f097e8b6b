//! redline server — serves the engine over HTTP.
//!
//! Configuration comes from the environment:
//! - `REDLINE_ADDR`    listen address (default `127.0.0.1:8700`)
//! - `REDLINE_DB`      SQLite store path (default `redline.db`)
//! - `REDLINE_CONFIG`  optional path to an `EngineConfig` JSON file
//! - `REDLINE_SCHEMA`  optional path to a `DocumentContext` JSON file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use redline::api::{build_router, ApiContext};
use redline::chain::backends::{HttpBackend, RuleBasedBackend, RULES_BACKEND_NAME};
use redline::chain::PredictionBackend;
use redline::{DocumentContext, Engine, EngineConfig, VersionStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let addr = std::env::var("REDLINE_ADDR").unwrap_or_else(|_| "127.0.0.1:8700".into());
    let db_path = PathBuf::from(std::env::var("REDLINE_DB").unwrap_or_else(|_| "redline.db".into()));

    let config = match std::env::var("REDLINE_CONFIG") {
        Ok(path) => load_json::<EngineConfig>(Path::new(&path))?,
        Err(_) => EngineConfig::default(),
    };
    let context = match std::env::var("REDLINE_SCHEMA") {
        Ok(path) => load_json::<DocumentContext>(Path::new(&path))?,
        Err(_) => DocumentContext::default(),
    };

    let backends = build_backends(&config)?;
    let store = VersionStore::open(&db_path)?;
    let engine = Arc::new(Engine::new(config, backends, context, store)?);

    tracing::info!(%addr, db = %db_path.display(), "redline listening");

    let router = build_router(ApiContext::new(engine.clone()));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    engine.shutdown();
    Ok(())
}

/// Instantiate a backend per configured spec: specs with an endpoint get
/// the HTTP adapter; the free local extractor covers the rest.
fn build_backends(
    config: &EngineConfig,
) -> Result<Vec<Box<dyn PredictionBackend>>, Box<dyn std::error::Error>> {
    let mut backends: Vec<Box<dyn PredictionBackend>> = Vec::new();
    for spec in &config.backends {
        match &spec.endpoint {
            Some(endpoint) => {
                backends.push(Box::new(HttpBackend::new(
                    spec.name.clone(),
                    endpoint.clone(),
                    spec.timeout(),
                )?));
            }
            None if spec.name == RULES_BACKEND_NAME => {
                backends.push(Box::new(RuleBasedBackend::new()));
            }
            None => {
                return Err(format!(
                    "backend {} has no endpoint and is not the built-in {RULES_BACKEND_NAME} extractor",
                    spec.name
                )
                .into());
            }
        }
    }
    Ok(backends)
}

fn load_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {e}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .map_err(|e| format!("cannot parse {}: {e}", path.display()))?;
    Ok(parsed)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install shutdown signal handler");
    }
    tracing::info!("Shutdown signal received");
}
