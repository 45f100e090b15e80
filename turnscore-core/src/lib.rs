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

//! Turnscore Core
//!
//! Data model, configuration and error types for evaluating assistant
//! replies against retrieved evidence.

pub mod config;
pub mod conversation;
pub mod diagnostics;
pub mod error;
pub mod eval_result;
pub mod evidence;
pub mod pricing;
pub mod token_calculator;

pub use config::{
    CompletenessMatch, EvalConfig, HallucinationThresholds, MatchMode, ReviewThresholds,
    SubquestionRule, DEFAULT_INPUT_PER_1K_USD, DEFAULT_MAX_PARALLEL_PAIRS, DEFAULT_MEDIUM_THRESHOLD,
    DEFAULT_OUTPUT_PER_1K_USD, DEFAULT_STRONG_THRESHOLD, DEFAULT_TOP_K, DEFAULT_WEAK_THRESHOLD,
};
pub use conversation::{Message, Pair, Role};
pub use diagnostics::{Diagnostic, DiagnosticCounts, DiagnosticKind};
pub use error::{CapabilityKind, CapabilitySource, EvalError, Result};
pub use eval_result::{
    hallucination_ratio, Aggregates, Claim, ClaimType, ConversationResult, ConversationSummary,
    CostEstimate, EvidenceConfidence, EvidenceMatch, EvidenceRef, PairResult, ReviewReason,
    TokenCounts,
};
pub use evidence::{truncate_chars, EvidenceChunk, EvidenceSnippet};
pub use pricing::{round_usd, TokenPricing, COST_DECIMALS};
pub use token_calculator::{estimate_tokens, TokenCalculator, DEFAULT_CHARS_PER_TOKEN};
