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

//! Evaluation configuration
//!
//! Every option has a default and callers may override any subset: a TOML
//! file, a JSON request body and CLI flags all deserialize into the same
//! [`EvalConfig`]. The configuration is read-only input to the engine and
//! must be identical across the batch and live call paths for reports to be
//! comparable.

use crate::error::{EvalError, Result};
use crate::pricing::TokenPricing;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default lower bound for the `strong` evidence tier
pub const DEFAULT_STRONG_THRESHOLD: f64 = 0.55;

/// Default lower bound for the `medium` evidence tier
pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.35;

/// Default lower bound for the `weak` evidence tier; below it a claim is `none`
pub const DEFAULT_WEAK_THRESHOLD: f64 = 0.28;

/// Default number of evidence chunks in the top-K estimate
pub const DEFAULT_TOP_K: usize = 5;

/// Default cap on pairs scored at once by the concurrent engine path
pub const DEFAULT_MAX_PARALLEL_PAIRS: usize = 8;

/// Default input price in USD per 1K tokens
pub const DEFAULT_INPUT_PER_1K_USD: f64 = 0.03;

/// Default output price in USD per 1K tokens
pub const DEFAULT_OUTPUT_PER_1K_USD: f64 = 0.06;

/// Rule used to split a user query into sub-requirements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubquestionRule {
    /// The whole query is a single requirement
    WholeQuery,
    /// Split on sentence/question boundaries and enumerated items
    Sentences,
    /// Additionally split on conjunctions joining sub-asks
    #[default]
    Conjunctions,
}

/// How a sub-requirement is tested against the reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Share of the sub-requirement's content words present in the reply
    #[default]
    Lexical,
    /// Best embedding similarity against any reply sentence
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessMatch {
    pub mode: MatchMode,
    /// Minimum overlap (lexical) or similarity (semantic) to count as addressed
    pub threshold: f64,
}

impl Default for CompletenessMatch {
    fn default() -> Self {
        Self {
            mode: MatchMode::Lexical,
            threshold: 0.5,
        }
    }
}

/// Lower bounds of the evidence confidence tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HallucinationThresholds {
    pub strong: f64,
    pub medium: f64,
    pub weak: f64,
}

impl Default for HallucinationThresholds {
    fn default() -> Self {
        Self {
            strong: DEFAULT_STRONG_THRESHOLD,
            medium: DEFAULT_MEDIUM_THRESHOLD,
            weak: DEFAULT_WEAK_THRESHOLD,
        }
    }
}

/// Risk cutoffs that flag a pair for manual review
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewThresholds {
    /// Flag when the hallucination ratio is above this
    pub max_hallucination_ratio: f64,
    /// Flag when completeness is below this
    pub min_completeness: f64,
    /// Flag when relevance is below this
    pub min_relevance: f64,
    /// Flag when any claim is supported only at medium/weak confidence
    pub flag_unverified_claims: bool,
}

impl Default for ReviewThresholds {
    fn default() -> Self {
        Self {
            max_hallucination_ratio: 0.25,
            min_completeness: 0.6,
            min_relevance: 0.3,
            flag_unverified_claims: true,
        }
    }
}

/// Configuration of one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    /// A pair is marked relevant when its relevance score reaches this
    pub relevance_threshold: f64,
    pub completeness_subquestion_rule: SubquestionRule,
    pub completeness_match: CompletenessMatch,
    pub hallucination_thresholds: HallucinationThresholds,
    /// Evidence chunks kept for the top-K cost estimate
    pub top_k: usize,
    pub input_per_1k_tokens_usd: f64,
    pub output_per_1k_tokens_usd: f64,
    pub manual_review_thresholds: ReviewThresholds,
    /// Evaluate only the first N pairs (conversation prefix)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_pairs: Option<usize>,
    /// Maximum characters of an evidence snippet carried into reports
    pub evidence_snippet_chars: usize,
    /// Pairs scored at once by the concurrent path; results do not depend on it
    pub max_parallel_pairs: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.5,
            completeness_subquestion_rule: SubquestionRule::default(),
            completeness_match: CompletenessMatch::default(),
            hallucination_thresholds: HallucinationThresholds::default(),
            top_k: DEFAULT_TOP_K,
            input_per_1k_tokens_usd: DEFAULT_INPUT_PER_1K_USD,
            output_per_1k_tokens_usd: DEFAULT_OUTPUT_PER_1K_USD,
            manual_review_thresholds: ReviewThresholds::default(),
            max_pairs: None,
            evidence_snippet_chars: 800,
            max_parallel_pairs: DEFAULT_MAX_PARALLEL_PAIRS,
        }
    }
}

impl EvalConfig {
    /// Parse a (possibly partial) TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| EvalError::Configuration(e.to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            EvalError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "Loaded evaluation config");
        Self::from_toml_str(&content)
    }

    /// Token pricing derived from the configured rates
    pub fn pricing(&self) -> TokenPricing {
        TokenPricing {
            input_per_1k_tokens_usd: self.input_per_1k_tokens_usd,
            output_per_1k_tokens_usd: self.output_per_1k_tokens_usd,
        }
    }

    /// Validate configuration
    ///
    /// Invalid settings are rejected, never corrected.
    pub fn validate(&self) -> Result<()> {
        let t = &self.hallucination_thresholds;
        for (name, value) in [("strong", t.strong), ("medium", t.medium), ("weak", t.weak)] {
            check_unit(&format!("hallucination_thresholds.{}", name), value)?;
        }
        if t.weak >= t.medium {
            return Err(EvalError::Configuration(format!(
                "hallucination_thresholds.weak ({}) must be below medium ({})",
                t.weak, t.medium
            )));
        }
        if t.medium >= t.strong {
            return Err(EvalError::Configuration(format!(
                "hallucination_thresholds.medium ({}) must be below strong ({})",
                t.medium, t.strong
            )));
        }

        check_unit("relevance_threshold", self.relevance_threshold)?;
        check_unit("completeness_match.threshold", self.completeness_match.threshold)?;

        let r = &self.manual_review_thresholds;
        check_unit(
            "manual_review_thresholds.max_hallucination_ratio",
            r.max_hallucination_ratio,
        )?;
        check_unit("manual_review_thresholds.min_completeness", r.min_completeness)?;
        check_unit("manual_review_thresholds.min_relevance", r.min_relevance)?;

        if self.top_k == 0 {
            return Err(EvalError::Configuration(
                "top_k must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("input_per_1k_tokens_usd", self.input_per_1k_tokens_usd),
            ("output_per_1k_tokens_usd", self.output_per_1k_tokens_usd),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EvalError::Configuration(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.evidence_snippet_chars == 0 {
            return Err(EvalError::Configuration(
                "evidence_snippet_chars must be at least 1".to_string(),
            ));
        }
        if self.max_parallel_pairs == 0 {
            return Err(EvalError::Configuration(
                "max_parallel_pairs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EvalError::Configuration(format!(
            "{} must be within [0, 1], got {}",
            name, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EvalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert_eq!(config.hallucination_thresholds.strong, DEFAULT_STRONG_THRESHOLD);
        assert_eq!(
            config.completeness_subquestion_rule,
            SubquestionRule::Conjunctions
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EvalConfig::from_toml_str(
            r#"
            top_k = 3

            [hallucination_thresholds]
            weak = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.hallucination_thresholds.weak, 0.2);
        assert_eq!(config.hallucination_thresholds.medium, DEFAULT_MEDIUM_THRESHOLD);
        assert_eq!(config.input_per_1k_tokens_usd, DEFAULT_INPUT_PER_1K_USD);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EvalConfig = serde_json::from_str(
            r#"{"manual_review_thresholds": {"min_completeness": 0.4}, "completeness_subquestion_rule": "sentences"}"#,
        )
        .unwrap();
        assert_eq!(config.manual_review_thresholds.min_completeness, 0.4);
        assert_eq!(config.manual_review_thresholds.min_relevance, 0.3);
        assert_eq!(config.completeness_subquestion_rule, SubquestionRule::Sentences);
    }

    #[test]
    fn test_weak_above_medium_rejected() {
        let mut config = EvalConfig::default();
        config.hallucination_thresholds.weak = 0.4;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EvalError::Configuration(_)));
        assert!(err.to_string().contains("weak"));
        // Not corrected in place
        assert_eq!(config.hallucination_thresholds.weak, 0.4);
    }

    #[test]
    fn test_equal_medium_and_strong_rejected() {
        let mut config = EvalConfig::default();
        config.hallucination_thresholds.medium = 0.55;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let config = EvalConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = EvalConfig {
            max_parallel_pairs: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_parallel_pairs"));
        assert_eq!(
            EvalConfig::from_toml_str("max_parallel_pairs = 2").unwrap().max_parallel_pairs,
            2
        );
    }

    #[test]
    fn test_negative_price_rejected() {
        let config = EvalConfig {
            output_per_1k_tokens_usd: -0.01,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_review_threshold_rejected() {
        let mut config = EvalConfig::default();
        config.manual_review_thresholds.min_relevance = 1.5;
        assert!(config.validate().is_err());
    }
}
