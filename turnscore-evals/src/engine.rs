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

//! Evaluation engine
//!
//! A stateless function of (conversation, evidence, configuration). The
//! batch and live adapters both call into this module, so the same inputs
//! and configuration always produce the same result and the same report
//! bytes. Pairs are independent: [`Engine::evaluate`] scores them in order,
//! [`Engine::evaluate_parallel`] fans them out over the blocking pool, a
//! bounded number at a time, and joins before aggregation. Both share every
//! scoring step.

use crate::aggregator::{aggregate, ReviewPolicy};
use crate::capability::{EmbeddingClient, HeuristicTokenCounter, TokenCounter};
use crate::claims::{ClaimExtractor, ClaimSegmenter};
use crate::completeness::{rule_for, CompletenessChecker, SubRequirementRule};
use crate::cost::CostEstimator;
use crate::embeddings::HashingEmbedder;
use crate::evidence_matcher::{ConfidenceTable, EvidenceMatcher};
use crate::normalizer::normalize_evidence;
use crate::pairs::extract_pairs;
use crate::parser::parse_conversation;
use crate::relevance::{resolve_evidence, RelevanceScorer, ResolvedChunk};
use crate::report::{CleanReport, FullReport, ReportBuilder};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use turnscore_core::{
    hallucination_ratio, CapabilityKind, ConversationResult, ConversationSummary, Diagnostic,
    DiagnosticKind, EvalConfig, EvalError, EvidenceChunk, Message, Pair, PairResult, Result,
};

/// Result of one run plus both report views
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub result: ConversationResult,
    pub full: FullReport,
    pub clean: CleanReport,
}

/// Already-parsed engine input
#[derive(Debug, Clone, Default)]
pub struct EvaluationInput {
    pub messages: Vec<Message>,
    pub evidence: Vec<EvidenceChunk>,
    /// Findings from parsing, carried into the result
    pub diagnostics: Vec<Diagnostic>,
}

impl EvaluationInput {
    pub fn new(messages: Vec<Message>, evidence: Vec<EvidenceChunk>) -> Self {
        Self {
            messages,
            evidence,
            diagnostics: Vec::new(),
        }
    }

    /// Parse raw conversation and evidence payloads
    pub fn from_json(conversation: &Value, evidence: &Value) -> Result<Self> {
        let parsed = parse_conversation(conversation)?;
        let normalized = normalize_evidence(evidence);

        let mut diagnostics = parsed.diagnostics;
        diagnostics.extend(normalized.diagnostics);
        Ok(Self {
            messages: parsed.messages,
            evidence: normalized.chunks,
            diagnostics,
        })
    }
}

/// Everything computed before per-pair scoring
struct Prepared {
    pairs: Vec<Pair>,
    evidence: Arc<Vec<ResolvedChunk>>,
    diagnostics: Vec<Diagnostic>,
    summary: ConversationSummary,
}

/// Per-pair scoring output
struct PairOutcome {
    result: PairResult,
    diagnostics: Vec<Diagnostic>,
}

/// Scores one pair; cheap to clone into worker tasks
#[derive(Clone)]
struct PairScorer {
    relevance: RelevanceScorer,
    completeness: CompletenessChecker,
    claims: ClaimExtractor,
    matcher: EvidenceMatcher,
    cost: CostEstimator,
    relevance_threshold: f64,
    top_k: usize,
}

impl PairScorer {
    fn score(&self, pair: &Pair, evidence: &[ResolvedChunk]) -> Result<PairOutcome> {
        let index = pair.index;
        let embedding_failed =
            |e| EvalError::capability_for_pair(CapabilityKind::Embedding, index, e);

        let relevance = self.relevance.score(pair, evidence).map_err(embedding_failed)?;
        let completeness = self.completeness.check(pair).map_err(embedding_failed)?;
        let claims = self.claims.extract(&pair.reply.text, index);
        let matches = self
            .matcher
            .match_claims(&claims, evidence)
            .map_err(embedding_failed)?;
        let cost = self
            .cost
            .estimate(pair, evidence, &relevance.top_k(self.top_k))
            .map_err(|e| EvalError::capability_for_pair(CapabilityKind::TokenCounting, index, e))?;

        let mut diagnostics = Vec::new();
        if cost.token_counts.estimated {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::EstimatedTokens,
                    "token counts estimated with the heuristic counter",
                )
                .for_pair(index),
            );
        }
        let latency_seconds = pair.latency_seconds();
        if latency_seconds.is_none() {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::MissingLatency,
                    "reply has no latency field and no usable timestamps",
                )
                .for_pair(index),
            );
        }

        debug!(
            pair_index = index,
            relevance = relevance.score,
            completeness = completeness.score,
            claims = matches.len(),
            "Scored pair"
        );

        Ok(PairOutcome {
            result: PairResult {
                pair_index: index,
                query_text: pair.query.text.clone(),
                reply_text: pair.reply.text.clone(),
                relevance_score: relevance.score,
                relevant: relevance.score >= self.relevance_threshold,
                no_evidence: relevance.no_evidence,
                most_relevant_evidence_id: relevance.best_evidence_id,
                completeness_score: completeness.score,
                sub_requirements: completeness.sub_requirements,
                missing_subpoints: completeness.missing,
                hallucination_ratio: hallucination_ratio(&matches),
                claims: matches,
                latency_seconds,
                cost_full: cost.full,
                cost_topk: cost.topk,
                topk_evidence_ids: cost.topk_evidence_ids,
                token_counts: cost.token_counts,
            },
            diagnostics,
        })
    }
}

/// The evaluation-and-aggregation engine
#[derive(Clone)]
pub struct Engine {
    config: EvalConfig,
    embedder: Arc<dyn EmbeddingClient>,
    scorer: PairScorer,
    policy: ReviewPolicy,
}

impl Engine {
    /// Build an engine; fails if the configuration is invalid
    pub fn new(
        config: EvalConfig,
        embedder: Arc<dyn EmbeddingClient>,
        token_counter: Arc<dyn TokenCounter>,
    ) -> Result<Self> {
        config.validate()?;

        let scorer = PairScorer {
            relevance: RelevanceScorer::new(embedder.clone()),
            completeness: CompletenessChecker::new(
                rule_for(config.completeness_subquestion_rule),
                config.completeness_match,
                embedder.clone(),
            ),
            claims: ClaimExtractor::default(),
            matcher: EvidenceMatcher::new(
                embedder.clone(),
                ConfidenceTable::from_thresholds(&config.hallucination_thresholds),
                config.evidence_snippet_chars,
            ),
            cost: CostEstimator::new(token_counter, config.pricing(), config.top_k),
            relevance_threshold: config.relevance_threshold,
            top_k: config.top_k,
        };

        Ok(Self {
            policy: ReviewPolicy::new(config.manual_review_thresholds),
            config,
            embedder,
            scorer,
        })
    }

    /// Engine with the built-in hashing embedder and heuristic token counter
    pub fn with_builtin_capabilities(config: EvalConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::new(HashingEmbedder::default()),
            Arc::new(HeuristicTokenCounter::new()),
        )
    }

    /// Replace the query decomposition rule
    pub fn with_sub_requirement_rule(mut self, rule: Arc<dyn SubRequirementRule>) -> Self {
        self.scorer.completeness =
            CompletenessChecker::new(rule, self.config.completeness_match, self.embedder.clone());
        self
    }

    /// Replace the claim segmentation strategy
    pub fn with_claim_segmenter(mut self, segmenter: Arc<dyn ClaimSegmenter>) -> Self {
        self.scorer.claims = ClaimExtractor::new(segmenter);
        self
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    pub fn embedding_backend(&self) -> &str {
        self.embedder.backend_name()
    }

    /// Name of the active query decomposition rule
    pub fn completeness_rule(&self) -> &str {
        self.scorer.completeness.rule_name()
    }

    /// Evaluate raw payloads, scoring pairs in order on the calling thread
    pub fn evaluate(&self, conversation: &Value, evidence: &Value) -> Result<Evaluation> {
        self.evaluate_input(EvaluationInput::from_json(conversation, evidence)?)
    }

    pub fn evaluate_input(&self, input: EvaluationInput) -> Result<Evaluation> {
        let prepared = self.prepare(input)?;
        let outcomes = prepared
            .pairs
            .iter()
            .map(|pair| self.scorer.score(pair, &prepared.evidence))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.finish(prepared, outcomes))
    }

    /// Evaluate raw payloads, scoring pairs concurrently on the blocking pool
    pub async fn evaluate_parallel(&self, conversation: &Value, evidence: &Value) -> Result<Evaluation> {
        let conversation = conversation.clone();
        let evidence = evidence.clone();
        let input = tokio::task::spawn_blocking(move || EvaluationInput::from_json(&conversation, &evidence))
            .await
            .map_err(|e| EvalError::Internal(format!("input parsing task failed: {}", e)))??;
        self.evaluate_input_parallel(input).await
    }

    pub async fn evaluate_input_parallel(&self, input: EvaluationInput) -> Result<Evaluation> {
        let engine = self.clone();
        let prepared = tokio::task::spawn_blocking(move || engine.prepare(input))
            .await
            .map_err(|e| EvalError::Internal(format!("evidence preparation task failed: {}", e)))??;

        // At most `max_parallel_pairs` blocking tasks are in flight; dropping
        // this future stops further pairs from being scheduled.
        let mut scored: Vec<(usize, Result<PairOutcome>)> = stream::iter(prepared.pairs.iter().cloned())
            .map(|pair| {
                let scorer = self.scorer.clone();
                let evidence = prepared.evidence.clone();
                async move {
                    let index = pair.index;
                    let outcome = tokio::task::spawn_blocking(move || scorer.score(&pair, &evidence))
                        .await
                        .unwrap_or_else(|e| {
                            Err(EvalError::Internal(format!(
                                "scoring task for pair {} failed: {}",
                                index, e
                            )))
                        });
                    (index, outcome)
                }
            })
            .buffer_unordered(self.config.max_parallel_pairs)
            .collect()
            .await;

        // Same error as the sequential path: the lowest failing pair wins
        scored.sort_by_key(|(index, _)| *index);
        let outcomes = scored
            .into_iter()
            .map(|(_, outcome)| outcome)
            .collect::<Result<Vec<_>>>()?;

        Ok(self.finish(prepared, outcomes))
    }

    /// Pair the conversation, apply the prefix limit and resolve evidence vectors
    fn prepare(&self, input: EvaluationInput) -> Result<Prepared> {
        let mut diagnostics = input.diagnostics;
        let message_count = input.messages.len();

        let extraction = extract_pairs(&input.messages);
        diagnostics.extend(extraction.diagnostics());
        let pair_count = extraction.pairs.len();
        let mut pairs = extraction.pairs;

        if let Some(limit) = self.config.max_pairs {
            if pairs.len() > limit {
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::TruncatedConversation,
                    format!("evaluated the first {} of {} pairs", limit, pairs.len()),
                ));
                pairs.truncate(limit);
            }
        }

        let resolved = resolve_evidence(input.evidence, self.embedder.as_ref())?;
        diagnostics.extend(resolved.diagnostics);
        if resolved.chunks.is_empty() && !pairs.is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::NoEvidence,
                "no usable evidence; every pair is scored against an empty evidence set",
            ));
        }

        Ok(Prepared {
            summary: ConversationSummary {
                message_count,
                pair_count,
                evaluated_pairs: pairs.len(),
                orphaned_replies: extraction.orphaned_replies.len(),
                dangling_queries: extraction.dangling_queries.len(),
                evidence_chunks: resolved.chunks.len(),
            },
            pairs,
            evidence: Arc::new(resolved.chunks),
            diagnostics,
        })
    }

    /// Join point: aggregate, flag and project into reports
    fn finish(&self, prepared: Prepared, outcomes: Vec<PairOutcome>) -> Evaluation {
        let mut diagnostics = prepared.diagnostics;
        let mut per_pair = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            diagnostics.extend(outcome.diagnostics);
            per_pair.push(outcome.result);
        }

        let aggregates = aggregate(&per_pair, &self.policy);
        let (manual_review_flags, review_reasons) = self.policy.flag(&per_pair);
        let evidence = referenced_evidence(&per_pair, &prepared.evidence, self.config.evidence_snippet_chars);

        info!(
            pairs = aggregates.pair_count,
            flagged = manual_review_flags.len(),
            diagnostics = diagnostics.len(),
            "Evaluation complete"
        );

        let result = ConversationResult {
            config: self.config.clone(),
            summary: prepared.summary,
            aggregates,
            manual_review_flags,
            review_reasons,
            per_pair,
            evidence,
            diagnostics,
        };
        Evaluation {
            full: ReportBuilder::full(&result),
            clean: ReportBuilder::clean(&result),
            result,
        }
    }
}

/// Snippets of every chunk a pair or claim points at, in evidence order
fn referenced_evidence(
    per_pair: &[PairResult],
    evidence: &[ResolvedChunk],
    snippet_chars: usize,
) -> Vec<turnscore_core::EvidenceSnippet> {
    let mut ids: BTreeSet<&str> = BTreeSet::new();
    for pair in per_pair {
        ids.extend(pair.most_relevant_evidence_id.as_deref());
        ids.extend(pair.topk_evidence_ids.iter().map(String::as_str));
        for m in &pair.claims {
            ids.extend(m.best_evidence_id.as_deref());
            ids.extend(m.top_evidence.iter().map(|r| r.id.as_str()));
        }
    }
    evidence
        .iter()
        .filter(|c| ids.contains(c.chunk.id.as_str()))
        .map(|c| c.chunk.to_snippet(snippet_chars))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::EmbedError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct OfflineEmbedder;

    impl EmbeddingClient for OfflineEmbedder {
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f64>, EmbedError> {
            Err(EmbedError::ApiError("model offline".to_string()))
        }

        fn backend_name(&self) -> &str {
            "offline"
        }
    }

    fn engine() -> Engine {
        Engine::with_builtin_capabilities(EvalConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = EvalConfig::default();
        config.hallucination_thresholds.weak = 0.5;
        let err = Engine::with_builtin_capabilities(config).err().unwrap();
        assert!(matches!(err, EvalError::Configuration(_)));
    }

    #[test]
    fn test_prefix_limit_truncates_pairs() {
        let config = EvalConfig {
            max_pairs: Some(1),
            ..Default::default()
        };
        let engine = Engine::with_builtin_capabilities(config).unwrap();
        let conversation = json!([
            {"role": "user", "text": "What is the capital of France?"},
            {"role": "assistant", "text": "The capital of France is Paris."},
            {"role": "user", "text": "And Italy?"},
            {"role": "assistant", "text": "The capital of Italy is Rome."}
        ]);
        let evaluation = engine.evaluate(&conversation, &json!([])).unwrap();
        assert_eq!(evaluation.result.summary.pair_count, 2);
        assert_eq!(evaluation.result.summary.evaluated_pairs, 1);
        assert_eq!(evaluation.result.per_pair.len(), 1);
        assert!(evaluation
            .result
            .diagnostics
            .iter()
            .any(|d| d.kind == DiagnosticKind::TruncatedConversation));
    }

    #[test]
    fn test_capability_failure_names_pair() {
        let engine = Engine::new(
            EvalConfig::default(),
            Arc::new(OfflineEmbedder),
            Arc::new(HeuristicTokenCounter::new()),
        )
        .unwrap();
        let conversation = json!([
            {"role": "user", "text": "hi"},
            {"role": "assistant", "text": "hello"}
        ]);
        // No evidence: relevance skips embedding, semantic completeness is off,
        // and claims are matched without embedding. Nothing to fail.
        assert!(engine.evaluate(&conversation, &json!([])).is_ok());

        // With evidence the chunk is embedded first and fails
        let err = engine
            .evaluate(&conversation, &json!([{"id": "e1", "text": "x"}]))
            .unwrap_err();
        assert!(err.to_string().contains("evidence chunk 'e1'"));

        // With precomputed vectors the reply embedding fails, naming the pair
        let err = engine
            .evaluate(&conversation, &json!([{"id": "e1", "text": "x", "vector": [1.0, 0.0]}]))
            .unwrap_err();
        assert_eq!(err.pair_index(), Some(1));
        assert!(err.to_string().contains("pair 1"));
    }

    struct UndeclaredEmbedder;

    impl EmbeddingClient for UndeclaredEmbedder {
        fn embed(&self, _text: &str) -> std::result::Result<Vec<f64>, EmbedError> {
            Ok(vec![1.0, 0.0])
        }

        fn backend_name(&self) -> &str {
            "undeclared"
        }
    }

    #[test]
    fn test_reply_dimension_mismatch_names_pair() {
        let engine = Engine::new(
            EvalConfig::default(),
            Arc::new(UndeclaredEmbedder),
            Arc::new(HeuristicTokenCounter::new()),
        )
        .unwrap();
        let conversation = json!([
            {"role": "user", "text": "hi"},
            {"role": "assistant", "text": "hello"}
        ]);
        let err = engine
            .evaluate(&conversation, &json!([{"id": "e1", "text": "x", "vector": [1.0, 0.0, 0.0]}]))
            .unwrap_err();
        assert_eq!(err.pair_index(), Some(1));
        assert!(err.to_string().contains("expected 3, got 2"));
    }

    /// Tracks how many embed calls run at once
    struct GaugedEmbedder {
        inner: HashingEmbedder,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl EmbeddingClient for GaugedEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f64>, EmbedError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.inner.embed(text)
        }

        fn dimensions(&self) -> Option<usize> {
            self.inner.dimensions()
        }

        fn backend_name(&self) -> &str {
            "gauged"
        }
    }

    #[tokio::test]
    async fn test_parallel_scoring_is_bounded() {
        let embedder = Arc::new(GaugedEmbedder {
            inner: HashingEmbedder::new(32),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = EvalConfig {
            max_parallel_pairs: 2,
            ..Default::default()
        };
        let engine = Engine::new(config, embedder.clone(), Arc::new(HeuristicTokenCounter::new())).unwrap();

        let mut turns = Vec::new();
        for i in 0..6 {
            turns.push(json!({"role": "user", "text": format!("Where is museum {}?", i)}));
            turns.push(json!({"role": "assistant", "text": format!("Museum {} is in Paris.", i)}));
        }
        let conversation = Value::Array(turns);
        let evidence = json!([{"id": "e1", "text": "Every museum listed is in Paris."}]);

        let parallel = engine.evaluate_parallel(&conversation, &evidence).await.unwrap();
        let peak = embedder.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency {}", peak);

        let sequential = engine.evaluate(&conversation, &evidence).unwrap();
        assert_eq!(
            serde_json::to_string(&parallel.full).unwrap(),
            serde_json::to_string(&sequential.full).unwrap()
        );
    }

    #[test]
    fn test_referenced_evidence_only() {
        let conversation = json!([
            {"role": "user", "text": "What is the capital of France?"},
            {"role": "assistant", "text": "The capital of France is Paris."}
        ]);
        let evidence = json!([
            {"id": "e1", "text": "Paris is the capital of France."},
            {"id": "e2", "text": "Bananas are yellow."}
        ]);
        let config = EvalConfig {
            top_k: 1,
            ..Default::default()
        };
        let engine = Engine::with_builtin_capabilities(config).unwrap();
        let evaluation = engine.evaluate(&conversation, &evidence).unwrap();
        let ids: Vec<_> = evaluation.result.evidence.iter().map(|s| s.id.as_str()).collect();
        // e2 appears in the claim's top-3 list even with zero support
        assert_eq!(ids, vec!["e1", "e2"]);
        assert_eq!(evaluation.result.per_pair[0].topk_evidence_ids, vec!["e1"]);
    }

    #[test]
    fn test_empty_conversation_evaluates() {
        let evaluation = engine().evaluate(&json!({"turns": []}), &json!([])).unwrap();
        assert_eq!(evaluation.result.aggregates.pair_count, 0);
        assert_eq!(evaluation.result.mean_relevance(), None);
        assert!(evaluation.result.manual_review_flags.is_empty());
    }
}
