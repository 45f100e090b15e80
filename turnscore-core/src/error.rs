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

//! Evaluation error types

use std::fmt;
use thiserror::Error;

/// Result type for evaluation operations
pub type Result<T> = std::result::Result<T, EvalError>;

/// Boxed source error raised by an injected capability
pub type CapabilitySource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which injected capability failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityKind {
    Embedding,
    TokenCounting,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Embedding => write!(f, "embedding"),
            CapabilityKind::TokenCounting => write!(f, "token counting"),
        }
    }
}

/// Errors that abort an evaluation run
///
/// Per-record problems (one bad evidence chunk, one unreadable turn) are not
/// errors; they are recorded as [`crate::Diagnostic`]s and the record is excluded.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Input could not be interpreted at all
    #[error("Malformed {what}: {reason}")]
    MalformedInput { what: String, reason: String },

    /// Invalid configuration (e.g. threshold ordering)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An injected capability raised; never retried by the engine
    #[error("{capability} capability failed for {context}: {source}")]
    Capability {
        capability: CapabilityKind,
        pair_index: Option<usize>,
        context: String,
        #[source]
        source: CapabilitySource,
    },

    /// Worker failure (join error, panic in a scoring task)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EvalError {
    pub fn malformed(what: impl Into<String>, reason: impl Into<String>) -> Self {
        EvalError::MalformedInput {
            what: what.into(),
            reason: reason.into(),
        }
    }

    /// Capability failure attributed to a specific pair
    pub fn capability_for_pair<E>(capability: CapabilityKind, pair_index: usize, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EvalError::Capability {
            capability,
            pair_index: Some(pair_index),
            context: format!("pair {}", pair_index),
            source: Box::new(source),
        }
    }

    /// Capability failure attributed to an evidence chunk
    pub fn capability_for_chunk<E>(capability: CapabilityKind, chunk_id: &str, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        EvalError::Capability {
            capability,
            pair_index: None,
            context: format!("evidence chunk '{}'", chunk_id),
            source: Box::new(source),
        }
    }

    /// Offending pair, when the failure is tied to one
    pub fn pair_index(&self) -> Option<usize> {
        match self {
            EvalError::Capability { pair_index, .. } => *pair_index,
            _ => None,
        }
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(e: serde_json::Error) -> Self {
        EvalError::malformed("JSON payload", e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("model offline")]
    struct Offline;

    #[test]
    fn test_capability_error_names_pair() {
        let err = EvalError::capability_for_pair(CapabilityKind::Embedding, 3, Offline);
        assert_eq!(err.pair_index(), Some(3));
        assert_eq!(
            err.to_string(),
            "embedding capability failed for pair 3: model offline"
        );
    }

    #[test]
    fn test_capability_error_names_chunk() {
        let err = EvalError::capability_for_chunk(CapabilityKind::Embedding, "e1", Offline);
        assert_eq!(err.pair_index(), None);
        assert!(err.to_string().contains("evidence chunk 'e1'"));
    }
}
