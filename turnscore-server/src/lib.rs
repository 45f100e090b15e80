// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Live-request adapter for the turnscore engine
//!
//! Exposes `GET /health` and `POST /api/v1/evaluate/combined` over axum.
//! Evaluation runs on tokio's blocking pool so embedding backends that do
//! network I/O never stall the request executor.

pub mod api;
pub mod config;
pub mod persist;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turnscore_evals::{Engine, HeuristicTokenCounter, TokenCounter};

use api::{evaluate_combined, health_check, AppState};
use config::{HttpServerConfig, LogFormat, ServerConfig};

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str =
    "turnscore=info,turnscore_core=info,turnscore_evals=info,turnscore_server=info,tower_http=info";

/// Install the global tracing subscriber, writing to stderr
///
/// Called once by each binary; libraries only emit events. `RUST_LOG`
/// takes precedence over `default_filter`.
pub fn init_tracing(format: LogFormat, default_filter: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    installed.context("failed to install tracing subscriber")
}

/// Build shared state: embedding backend, token counter and default engine
pub fn build_state(config: &ServerConfig) -> Result<AppState> {
    let embedder = config.embedding.build()?;
    let token_counter: Arc<dyn TokenCounter> = Arc::new(HeuristicTokenCounter::new());
    let engine = Engine::new(
        config.evaluation.clone(),
        embedder.clone(),
        token_counter.clone(),
    )
    .context("invalid evaluation configuration")?;

    let output_dir = config
        .persistence
        .enabled
        .then(|| config.persistence.output_dir.clone());

    Ok(AppState::new(engine, embedder, token_counter, output_dir))
}

/// Application router with body limit, timeout, CORS and request tracing
pub fn build_router(state: AppState, http: &HttpServerConfig) -> Router {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/evaluate/combined", post(evaluate_combined))
        .with_state(state)
        .layer(DefaultBodyLimit::max(http.max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(http.request_timeout_secs)));

    let app = if http.enable_cors {
        tracing::warn!("CORS: Allowing all origins");
        app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        app
    };

    app.layer(TraceLayer::new_for_http())
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing::info!("Starting Turnscore Server");
    config.validate()?;
    tracing::debug!("Configuration: {:#?}", config);

    let state = build_state(&config)?;
    tracing::info!(
        embedding_backend = state.engine.embedding_backend(),
        persistence = ?state.output_dir,
        "Engine ready"
    );

    let app = build_router(state, &config.server);
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_build_state_respects_persistence_switch() {
        let mut config = ServerConfig::default();
        assert!(build_state(&config).unwrap().output_dir.is_some());

        config.persistence.enabled = false;
        assert!(build_state(&config).unwrap().output_dir.is_none());
    }
}
