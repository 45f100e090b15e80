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

//! Embedding backends and vector similarity

use crate::capability::{EmbedError, EmbeddingClient};
use crate::text;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use std::time::Duration;

/// Default dimensionality of the hashing embedder
pub const DEFAULT_HASHING_DIMENSIONS: usize = 256;

/// Cosine similarity in [-1, 1]
///
/// Zero-norm vectors and vectors of different lengths have no measurable
/// similarity and score 0.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f64 = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| x * x).sum::<f64>().sqrt();

    if norm_a < 1e-9 || norm_b < 1e-9 {
        return 0.0;
    }

    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

/// Cosine similarity clamped to [0, 1], as used for support scores
pub fn support_score(a: &[f64], b: &[f64]) -> f64 {
    cosine_similarity(a, b).clamp(0.0, 1.0)
}

/// Deterministic bag-of-words embedder using signed feature hashing
///
/// Each content word is hashed with SHA-256 into one of `dimensions`
/// buckets; the result is L2-normalised. Needs no model and no network, so
/// it is the default backend and gives stable scores across runs and hosts.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_HASHING_DIMENSIONS)
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn bucket(&self, token: &str) -> (usize, f64) {
        let digest = Sha256::digest(token.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(head) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }
}

impl EmbeddingClient for HashingEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        let mut vector = vec![0.0; self.dimensions];
        for token in text::tokens(text) {
            let (bucket, sign) = self.bucket(&token);
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > 0.0 {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> Option<usize> {
        Some(self.dimensions)
    }

    fn backend_name(&self) -> &str {
        "hashing"
    }
}

/// OpenAI-compatible `/embeddings` client
///
/// Uses a blocking HTTP client, created on first use so construction is
/// cheap and safe from async contexts. Failures are returned as-is; the
/// engine does not retry.
pub struct OpenAIEmbeddingClient {
    api_key: String,
    model: String,
    base_url: String,
    dimensions: Option<usize>,
    timeout: Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl OpenAIEmbeddingClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            dimensions: None,
            timeout: Duration::from_secs(30),
            client: OnceLock::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Declare the model's output size so precomputed vectors can be checked up front
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = Some(dimensions);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn client(&self) -> Result<&reqwest::blocking::Client, EmbedError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        Ok(self.client.get_or_init(|| client))
    }
}

impl EmbeddingClient for OpenAIEmbeddingClient {
    fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        let embeddings = self.embed_batch(&[text.to_string()])?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::ApiError("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        let request = serde_json::json!({
            "model": self.model,
            "input": texts
        });

        let response = self
            .client()?
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text()?;
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(EmbedError::RateLimitExceeded);
            }
            return Err(EmbedError::ApiError(error_text));
        }

        let response_data: serde_json::Value = response.json()?;
        let embeddings = parse_embeddings_response(&response_data);

        if embeddings.len() != texts.len() {
            return Err(EmbedError::ApiError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                embeddings.len()
            )));
        }
        if let Some(expected) = self.dimensions {
            if let Some(bad) = embeddings.iter().find(|v| v.len() != expected) {
                return Err(EmbedError::Dimensions {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    fn backend_name(&self) -> &str {
        "openai"
    }
}

/// Extract `data[].embedding` arrays in response order
fn parse_embeddings_response(response: &serde_json::Value) -> Vec<Vec<f64>> {
    let mut embeddings = Vec::new();
    if let Some(data) = response["data"].as_array() {
        for item in data {
            if let Some(embedding_vec) = item["embedding"].as_array() {
                let vec: Vec<f64> = embedding_vec.iter().filter_map(|v| v.as_f64()).collect();
                embeddings.push(vec);
            }
        }
    }
    embeddings
}
