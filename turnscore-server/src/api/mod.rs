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

//! HTTP API handlers

pub mod evaluate;
pub mod health;

pub use evaluate::{evaluate_combined, CombinedRequest, CombinedResponse};
pub use health::{health_check, HealthResponse};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use turnscore_core::EvalError;
use turnscore_evals::{EmbeddingClient, Engine, TokenCounter};

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Well-formed request carrying an invalid evaluation configuration
    #[error("Invalid configuration: {0}")]
    Unprocessable(String),

    /// The embedding or token-counting backend failed
    #[error("Upstream capability failed: {0}")]
    Capability(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Capability(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

impl From<EvalError> for ApiError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::MalformedInput { .. } => ApiError::BadRequest(e.to_string()),
            EvalError::Configuration(_) => ApiError::Unprocessable(e.to_string()),
            EvalError::Capability { .. } => ApiError::Capability(e.to_string()),
            EvalError::Internal(_) => ApiError::Internal(e.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Engine built from the server's evaluation defaults
    pub engine: Arc<Engine>,
    /// Capabilities reused by engines built for per-request overrides
    pub embedder: Arc<dyn EmbeddingClient>,
    pub token_counter: Arc<dyn TokenCounter>,
    /// Where `save: true` requests write; `None` disables persistence
    pub output_dir: Option<PathBuf>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        engine: Engine,
        embedder: Arc<dyn EmbeddingClient>,
        token_counter: Arc<dyn TokenCounter>,
        output_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            embedder,
            token_counter,
            output_dir,
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnscore_core::CapabilityKind;

    #[derive(Debug, Error)]
    #[error("model offline")]
    struct Offline;

    #[test]
    fn test_eval_errors_map_to_status() {
        let cases = [
            (EvalError::malformed("conversation", "not a list"), StatusCode::BAD_REQUEST),
            (EvalError::Configuration("weak >= medium".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (
                EvalError::capability_for_pair(CapabilityKind::Embedding, 2, Offline),
                StatusCode::BAD_GATEWAY,
            ),
            (EvalError::Internal("join".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}
