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

//! Combined evaluation endpoint
//!
//! Runs the same engine as the batch CLI, so the returned `combined` and
//! `clean` reports are byte-identical to the files the CLI writes for the
//! same payloads and configuration.

use super::{ApiError, AppState};
use crate::persist::{sanitize_basename, write_reports, SavedPaths, DEFAULT_BASENAME};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;
use turnscore_core::EvalConfig;
use turnscore_evals::{CleanReport, Engine, FullReport};

/// POST body of `/api/v1/evaluate/combined`
#[derive(Debug, Default, Deserialize)]
pub struct CombinedRequest {
    /// Conversation payload, or a JSON string holding it
    pub conversation: Option<Value>,
    /// Evidence payload, or a JSON string holding it
    #[serde(alias = "evidence")]
    pub context: Option<Value>,
    /// Partial evaluation configuration merged over the server defaults
    #[serde(default)]
    pub config: Option<Value>,
    /// Shorthand for `hallucination_thresholds.weak`
    #[serde(default)]
    pub hallucination_threshold: Option<f64>,
    #[serde(default)]
    pub top_k: Option<usize>,
    /// Shorthand for `input_per_1k_tokens_usd`
    #[serde(default)]
    pub input_price: Option<f64>,
    /// Shorthand for `output_per_1k_tokens_usd`
    #[serde(default)]
    pub output_price: Option<f64>,
    /// Persist the reports on the server
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub save_basename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CombinedResponse {
    pub combined: FullReport,
    pub clean: CleanReport,
    pub saved_paths: Option<SavedPaths>,
    pub generated_at: String,
}

impl CombinedRequest {
    fn has_overrides(&self) -> bool {
        self.config.is_some()
            || self.hallucination_threshold.is_some()
            || self.top_k.is_some()
            || self.input_price.is_some()
            || self.output_price.is_some()
    }

    /// Server defaults with this request's overrides applied
    fn effective_config(&self, base: &EvalConfig) -> Result<EvalConfig, ApiError> {
        let mut merged = serde_json::to_value(base)
            .map_err(|e| ApiError::Internal(format!("cannot serialize config: {}", e)))?;

        if let Some(patch) = &self.config {
            if !patch.is_object() {
                return Err(ApiError::BadRequest("config must be a JSON object".to_string()));
            }
            merge_json(&mut merged, patch);
        }

        let mut shorthand = Map::new();
        if let Some(weak) = self.hallucination_threshold {
            shorthand.insert(
                "hallucination_thresholds".to_string(),
                serde_json::json!({ "weak": weak }),
            );
        }
        if let Some(top_k) = self.top_k {
            shorthand.insert("top_k".to_string(), top_k.into());
        }
        if let Some(price) = self.input_price {
            shorthand.insert("input_per_1k_tokens_usd".to_string(), price.into());
        }
        if let Some(price) = self.output_price {
            shorthand.insert("output_per_1k_tokens_usd".to_string(), price.into());
        }
        merge_json(&mut merged, &Value::Object(shorthand));

        serde_json::from_value(merged).map_err(|e| ApiError::Unprocessable(e.to_string()))
    }
}

/// Recursively overlay `patch` onto `target`; non-object values replace
fn merge_json(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

/// Accept either an embedded JSON value or a string containing JSON
fn decode_payload(name: &str, value: Option<Value>) -> Result<Value, ApiError> {
    match value {
        None | Some(Value::Null) => Err(ApiError::BadRequest(format!(
            "Payload must include '{}'",
            name
        ))),
        Some(Value::String(raw)) => serde_json::from_str(&raw)
            .map_err(|e| ApiError::BadRequest(format!("'{}' is not valid JSON: {}", name, e))),
        Some(value) => Ok(value),
    }
}

/// POST /api/v1/evaluate/combined
pub async fn evaluate_combined(
    State(state): State<AppState>,
    Json(req): Json<CombinedRequest>,
) -> Result<Json<CombinedResponse>, ApiError> {
    let start = Instant::now();

    let conversation = decode_payload("conversation", req.conversation.clone())?;
    let evidence = decode_payload("context", req.context.clone())?;

    // Resolve the target before evaluating so a bad name fails fast
    let save_target = if req.save {
        let dir = state.output_dir.clone().ok_or_else(|| {
            ApiError::BadRequest("Report persistence is disabled on this server".to_string())
        })?;
        let stem = sanitize_basename(req.save_basename.as_deref().unwrap_or(DEFAULT_BASENAME))
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        Some((dir, stem))
    } else {
        None
    };

    let evaluation = if req.has_overrides() {
        let config = req.effective_config(state.engine.config())?;
        let engine = Engine::new(config, state.embedder.clone(), state.token_counter.clone())?;
        engine.evaluate_parallel(&conversation, &evidence).await?
    } else {
        state.engine.evaluate_parallel(&conversation, &evidence).await?
    };

    let saved_paths = match save_target {
        Some((dir, stem)) => {
            let full = evaluation.full.clone();
            let clean = evaluation.clean.clone();
            let paths = tokio::task::spawn_blocking(move || write_reports(&dir, &stem, &full, &clean))
                .await
                .map_err(|e| ApiError::Internal(format!("save task failed: {}", e)))?
                .map_err(|e| ApiError::Internal(format!("Failed to save reports: {}", e)))?;
            Some(paths)
        }
        None => None,
    };

    tracing::info!(
        pairs = evaluation.result.aggregates.pair_count,
        flagged = evaluation.result.manual_review_flags.len(),
        saved = saved_paths.is_some(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Served combined evaluation"
    );

    Ok(Json(CombinedResponse {
        combined: evaluation.full,
        clean: evaluation.clean,
        saved_paths,
        generated_at: chrono::Utc::now().to_rfc3339(),
    }))
}
