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

//! Evaluation results
//!
//! Per-pair and per-conversation outcomes. Everything here is produced fresh
//! per evaluation run and never mutated after construction; ordered
//! collections (`Vec`, `BTreeMap`, `BTreeSet`) keep serialized output
//! byte-identical across runs.

use crate::config::EvalConfig;
use crate::diagnostics::Diagnostic;
use crate::evidence::EvidenceSnippet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Coarse category of a claim, to help reviewers triage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Url,
    Numeric,
    Recommendation,
    Assertion,
}

/// An atomic factual assertion extracted from a reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub pair_index: usize,
    pub claim_type: ClaimType,
}

/// How well a claim is supported by its best-matching evidence
///
/// Variants are ordered from weakest to strongest support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceConfidence {
    None,
    Weak,
    Medium,
    Strong,
}

impl EvidenceConfidence {
    /// Weak or unsupported claims count toward the hallucination ratio
    pub fn is_hallucination_candidate(&self) -> bool {
        matches!(self, EvidenceConfidence::Weak | EvidenceConfidence::None)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EvidenceConfidence::None => "none",
            EvidenceConfidence::Weak => "weak",
            EvidenceConfidence::Medium => "medium",
            EvidenceConfidence::Strong => "strong",
        }
    }
}

/// One supporting chunk for a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub id: String,
    pub source: String,
    pub snippet: String,
    pub score: f64,
}

/// Best evidence found for a claim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceMatch {
    pub claim: Claim,
    /// `None` only when the evidence set is empty
    pub best_evidence_id: Option<String>,
    /// In [0, 1]
    pub best_support_score: f64,
    pub evidence_confidence: EvidenceConfidence,
    /// Highest-scoring chunks, best first
    #[serde(default)]
    pub top_evidence: Vec<EvidenceRef>,
}

/// Share of claims supported only weakly or not at all
///
/// Zero when there are no claims: nothing was asserted, so nothing is at risk.
pub fn hallucination_ratio(matches: &[EvidenceMatch]) -> f64 {
    let candidates = matches
        .iter()
        .filter(|m| m.evidence_confidence.is_hallucination_candidate())
        .count();
    candidates as f64 / matches.len().max(1) as f64
}

/// Token counts behind the cost estimates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCounts {
    pub query: usize,
    pub evidence_full: usize,
    pub evidence_topk: usize,
    /// Query plus all evidence
    pub input_full: usize,
    /// Query plus the top-K evidence chunks
    pub input_topk: usize,
    /// Reply
    pub output: usize,
    /// Set when any count fell back to the heuristic estimator
    pub estimated: bool,
}

/// Cost of one pair under one context assumption
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub input_usd: f64,
    pub output_usd: f64,
    pub total_usd: f64,
}

/// Scores for one query/reply pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairResult {
    pub pair_index: usize,
    pub query_text: String,
    pub reply_text: String,
    pub relevance_score: f64,
    /// `relevance_score >= relevance_threshold`
    pub relevant: bool,
    /// Scored against an empty evidence set
    pub no_evidence: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub most_relevant_evidence_id: Option<String>,
    pub completeness_score: f64,
    pub sub_requirements: Vec<String>,
    pub missing_subpoints: Vec<String>,
    pub claims: Vec<EvidenceMatch>,
    pub hallucination_ratio: f64,
    pub latency_seconds: Option<f64>,
    pub cost_full: CostEstimate,
    pub cost_topk: CostEstimate,
    pub topk_evidence_ids: Vec<String>,
    pub token_counts: TokenCounts,
}

impl PairResult {
    /// Claims counted as hallucination candidates
    pub fn unsupported_claims(&self) -> usize {
        self.claims
            .iter()
            .filter(|m| m.evidence_confidence.is_hallucination_candidate())
            .count()
    }
}

/// Why a pair was flagged for manual review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReviewReason {
    HighHallucinationRatio {
        ratio: f64,
        max: f64,
        unsupported: usize,
        claims: usize,
    },
    LowCompleteness {
        score: f64,
        min: f64,
        missing: usize,
    },
    LowRelevance {
        score: f64,
        min: f64,
        no_evidence: bool,
    },
    UnverifiedClaims {
        count: usize,
    },
}

impl ReviewReason {
    /// One-line explanation for reviewers
    pub fn describe(&self) -> String {
        match self {
            ReviewReason::HighHallucinationRatio {
                ratio,
                max,
                unsupported,
                claims,
            } => format!(
                "{} of {} claims weakly or not supported by evidence (hallucination ratio {:.2} > {:.2})",
                unsupported, claims, ratio, max
            ),
            ReviewReason::LowCompleteness {
                score,
                min,
                missing,
            } => format!(
                "Reply leaves {} sub-point(s) of the question unaddressed (completeness {:.2} < {:.2})",
                missing, score, min
            ),
            ReviewReason::LowRelevance {
                score,
                min,
                no_evidence: true,
            } => format!(
                "No evidence was available to check the reply (relevance {:.2} < {:.2})",
                score, min
            ),
            ReviewReason::LowRelevance { score, min, .. } => format!(
                "Reply is weakly related to the retrieved evidence (relevance {:.2} < {:.2})",
                score, min
            ),
            ReviewReason::UnverifiedClaims { count } => format!(
                "{} claim(s) only partially supported by evidence",
                count
            ),
        }
    }
}

/// Conversation-level statistics
///
/// Means are `None` when no pair was evaluated; zero would read as a
/// measured low score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregates {
    pub pair_count: usize,
    pub mean_relevance: Option<f64>,
    pub mean_completeness: Option<f64>,
    pub mean_hallucination_ratio: Option<f64>,
    pub total_claims: usize,
    pub unsupported_claims: usize,
    pub total_input_tokens: usize,
    pub total_input_tokens_topk: usize,
    pub total_output_tokens: usize,
    /// Full-context input plus output
    pub total_tokens: usize,
    pub total_cost_full_usd: f64,
    pub total_cost_topk_usd: f64,
    /// Sum over pairs with a known latency
    pub total_latency_seconds: f64,
    pub mean_latency_seconds: Option<f64>,
    pub latency_known_pairs: usize,
    pub flagged_pair_count: usize,
}

/// Shape of the evaluated input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub message_count: usize,
    /// Pairs found in the conversation
    pub pair_count: usize,
    /// Pairs actually scored (fewer when a prefix limit applies)
    pub evaluated_pairs: usize,
    pub orphaned_replies: usize,
    pub dangling_queries: usize,
    pub evidence_chunks: usize,
}

/// Outcome of one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationResult {
    pub config: EvalConfig,
    pub summary: ConversationSummary,
    pub aggregates: Aggregates,
    pub manual_review_flags: BTreeSet<usize>,
    pub review_reasons: BTreeMap<usize, Vec<ReviewReason>>,
    pub per_pair: Vec<PairResult>,
    /// Every evidence chunk referenced by a claim or a relevance score
    pub evidence: Vec<EvidenceSnippet>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ConversationResult {
    pub fn mean_relevance(&self) -> Option<f64> {
        self.aggregates.mean_relevance
    }

    pub fn mean_completeness(&self) -> Option<f64> {
        self.aggregates.mean_completeness
    }

    pub fn mean_hallucination_ratio(&self) -> Option<f64> {
        self.aggregates.mean_hallucination_ratio
    }

    pub fn total_tokens(&self) -> usize {
        self.aggregates.total_tokens
    }

    /// Full-context cost
    pub fn total_cost(&self) -> f64 {
        self.aggregates.total_cost_full_usd
    }

    pub fn is_flagged(&self, pair_index: usize) -> bool {
        self.manual_review_flags.contains(&pair_index)
    }
}
