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

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;
use turnscore_evals::CacheStats;

use crate::api::AppState;

/// Health check response structure
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub embedding_backend: String,
    /// Present when embeddings go through the in-memory cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_cache: Option<CacheStats>,
    pub token_counter: String,
    pub completeness_rule: String,
    pub persistence_enabled: bool,
    pub uptime_seconds: u64,
    pub time: String,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        embedding_backend: state.engine.embedding_backend().to_string(),
        embedding_cache: state.embedder.cache_stats(),
        token_counter: state.token_counter.name().to_string(),
        completeness_rule: state.engine.completeness_rule().to_string(),
        persistence_enabled: state.output_dir.is_some(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        time: chrono::Utc::now().to_rfc3339(),
    })
}
