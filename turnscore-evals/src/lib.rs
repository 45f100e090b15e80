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

//! # Turnscore Evaluation Engine
//!
//! Scores the assistant turns of a chat conversation against a set of
//! retrieved evidence chunks.
//!
//! ## Features
//!
//! - **Pairing**: user queries matched to the replies that answer them
//! - **Relevance**: best query/reply similarity against the evidence
//! - **Completeness**: share of the query's sub-points the reply covers
//! - **Hallucination**: per-claim support tiers and unsupported-claim ratio
//! - **Cost and latency**: full-context and top-K input estimates
//! - **Manual review**: risk flags with human-readable reasons
//!
//! Embedding and token counting are injected capabilities, so the engine
//! runs offline with [`HashingEmbedder`] and [`HeuristicTokenCounter`] or
//! against a hosted model with [`OpenAIEmbeddingClient`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use turnscore_evals::Engine;
//! use turnscore_core::EvalConfig;
//! use serde_json::json;
//!
//! let engine = Engine::with_builtin_capabilities(EvalConfig::default())?;
//! let conversation = json!({"conversation_turns": [
//!     {"role": "User", "message": "What is the capital of France?"},
//!     {"role": "AI/Chatbot", "message": "The capital of France is Paris."}
//! ]});
//! let evidence = json!([{"id": "e1", "text": "Paris is the capital of France."}]);
//! let evaluation = engine.evaluate(&conversation, &evidence)?;
//! println!("{}", evaluation.clean.summary);
//! ```

pub mod aggregator;
pub mod cache;
pub mod capability;
pub mod claims;
pub mod completeness;
pub mod cost;
pub mod embeddings;
pub mod engine;
pub mod evidence_matcher;
pub mod normalizer;
pub mod pairs;
pub mod parser;
pub mod relevance;
pub mod render;
pub mod report;
pub mod text;

pub use aggregator::{aggregate, ReviewPolicy};
pub use cache::{CacheStats, CachedEmbedder};
pub use capability::{EmbedError, EmbeddingClient, HeuristicTokenCounter, TokenCountError, TokenCounter};
pub use claims::{classify_claim, ClaimExtractor, ClaimSegmenter, SentenceSegmenter};
pub use completeness::{
    rule_for, CompletenessChecker, CompletenessOutcome, ConjunctionRule, SentenceRule,
    SubRequirementRule, WholeQueryRule,
};
pub use cost::{CostBreakdown, CostEstimator};
pub use embeddings::{cosine_similarity, support_score, HashingEmbedder, OpenAIEmbeddingClient};
pub use engine::{Engine, Evaluation, EvaluationInput};
pub use evidence_matcher::{ConfidenceTable, EvidenceMatcher};
pub use normalizer::{normalize_evidence, EvidenceNormalizer, NormalizedEvidence};
pub use pairs::{extract_pairs, PairExtraction, PairExtractor};
pub use parser::{parse_conversation, ParsedConversation};
pub use relevance::{resolve_evidence, RelevanceOutcome, RelevanceScorer, ResolvedChunk, ResolvedEvidence};
pub use render::render_clean_html;
pub use report::{CleanReport, FlaggedPair, FullReport, MissingSubpoint, PairSummary, ReportBuilder, ReviewEntry};
