//! Model loading and listener lifecycle

use crate::config::ServiceConfig;
use crate::server::{build_router, AppState};
use crate::ServiceError;
use anyhow::{Context, Result};
use penguin_ai_core::{resolve, ArtifactLoader, GcsObjectStore, LoadedModel, SourceDescriptor};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, instrument, warn};

/// Resolve the configured source and load a validated model
#[instrument(skip(config))]
pub async fn load_model(config: &ServiceConfig) -> Result<LoadedModel, ServiceError> {
    let source = resolve(&config.artifacts)?;
    info!(%source, "Resolved model source");

    let mut loader = ArtifactLoader::new(config.loading.clone());
    if matches!(source, SourceDescriptor::Remote(_)) {
        let store = GcsObjectStore::new(&config.storage)?;
        loader = loader.with_store(Arc::new(store));
    }

    Ok(loader.load(&source).await?)
}

/// Load the model and build handler state.
///
/// A load failure is returned unless `serve_when_unready` is set, in which
/// case the state carries no model.
pub async fn prepare_state(config: &ServiceConfig) -> Result<AppState, ServiceError> {
    let model = match load_model(config).await {
        Ok(model) => Some(Arc::new(model)),
        Err(ServiceError::Startup(err))
            if err.is_startup_fatal() && config.server.serve_when_unready =>
        {
            error!(error = %err, "Model failed to load; serving without a model");
            None
        }
        Err(err) => return Err(err),
    };
    Ok(AppState::new(model, config.prediction.confidence_decimals))
}

/// Load, bind and serve until ctrl-c
pub async fn run(config: ServiceConfig) -> Result<()> {
    let state = prepare_state(&config)
        .await
        .context("model startup failed")?;
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = bind_listener(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server terminated unexpectedly")?;

    info!("Service shutdown complete");
    Ok(())
}

pub async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind listener on {addr}"))
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(err) => warn!("Unable to listen for shutdown signal: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn missing_local() -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.artifacts.local_model_path = Some(PathBuf::from("/nonexistent/model.json"));
        config.artifacts.local_metadata_path =
            Some(PathBuf::from("/nonexistent/model_metadata.json"));
        config
    }

    #[tokio::test]
    async fn missing_artifacts_fail_startup() {
        let err = prepare_state(&missing_local()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Startup(_)), "{err:?}");
    }

    #[tokio::test]
    async fn serve_when_unready_keeps_going() {
        let mut config = missing_local();
        config.server.serve_when_unready = true;
        let state = prepare_state(&config).await.unwrap();
        assert!(state.model.is_none());
    }

    #[tokio::test]
    async fn bind_listener_accepts_ephemeral_port() {
        let listener = bind_listener("127.0.0.1:0").await.unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }
}
