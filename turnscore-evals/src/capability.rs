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

//! Injected capabilities
//!
//! The engine depends only on these traits. Concrete implementations are
//! built by the outermost caller and handed in, so the engine itself has no
//! startup cost and can be driven by stubs in tests. Calls are synchronous;
//! any retry or timeout policy belongs to the implementation.

use crate::cache::CacheStats;
use thiserror::Error;
use turnscore_core::TokenCalculator;

/// Errors from embedding clients
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Unexpected embedding dimensions: expected {expected}, got {actual}")]
    Dimensions { expected: usize, actual: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Text embedding capability
///
/// Implementations must be deterministic for identical text and return
/// vectors of one fixed length within a run.
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text string
    fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError>;

    /// Embed a batch of texts
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Output dimensionality, when known without embedding anything
    fn dimensions(&self) -> Option<usize> {
        None
    }

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &str;

    /// Hit/miss counters when the client caches vectors
    fn cache_stats(&self) -> Option<CacheStats> {
        None
    }
}

/// Errors from token counters
#[derive(Debug, Error)]
pub enum TokenCountError {
    #[error("Tokenizer unavailable: {0}")]
    Unavailable(String),
}

/// Token counting capability
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> Result<usize, TokenCountError>;

    /// Whether counts are approximations rather than a real tokenizer's output
    fn is_estimate(&self) -> bool {
        true
    }

    fn name(&self) -> &str;
}

/// Character-ratio token estimator; never fails
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicTokenCounter {
    calculator: TokenCalculator,
}

impl HeuristicTokenCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ratio(chars_per_token: f64) -> Self {
        Self {
            calculator: TokenCalculator::with_ratio(chars_per_token),
        }
    }
}

impl TokenCounter for HeuristicTokenCounter {
    fn count(&self, text: &str) -> Result<usize, TokenCountError> {
        Ok(self.calculator.estimate(text))
    }

    fn name(&self) -> &str {
        "heuristic"
    }
}
