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

//! Conversation-level aggregation and manual-review policy

use std::collections::{BTreeMap, BTreeSet};
use turnscore_core::{Aggregates, EvidenceConfidence, PairResult, ReviewReason, ReviewThresholds};

/// Risk rules deciding which pairs need a human look
///
/// A pure function of one [`PairResult`]; the same policy always flags the
/// same pairs for the same reasons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReviewPolicy {
    thresholds: ReviewThresholds,
}

impl Default for ReviewPolicy {
    fn default() -> Self {
        Self::new(ReviewThresholds::default())
    }
}

impl ReviewPolicy {
    pub fn new(thresholds: ReviewThresholds) -> Self {
        Self { thresholds }
    }

    /// Every threshold the pair breaches; empty when it needs no review
    pub fn evaluate(&self, result: &PairResult) -> Vec<ReviewReason> {
        let t = &self.thresholds;
        let mut reasons = Vec::new();

        if result.hallucination_ratio > t.max_hallucination_ratio {
            reasons.push(ReviewReason::HighHallucinationRatio {
                ratio: result.hallucination_ratio,
                max: t.max_hallucination_ratio,
                unsupported: result.unsupported_claims(),
                claims: result.claims.len(),
            });
        }
        if result.completeness_score < t.min_completeness {
            reasons.push(ReviewReason::LowCompleteness {
                score: result.completeness_score,
                min: t.min_completeness,
                missing: result.missing_subpoints.len(),
            });
        }
        if result.relevance_score < t.min_relevance {
            reasons.push(ReviewReason::LowRelevance {
                score: result.relevance_score,
                min: t.min_relevance,
                no_evidence: result.no_evidence,
            });
        }
        if t.flag_unverified_claims {
            let count = result
                .claims
                .iter()
                .filter(|m| {
                    matches!(
                        m.evidence_confidence,
                        EvidenceConfidence::Medium | EvidenceConfidence::Weak
                    )
                })
                .count();
            if count > 0 {
                reasons.push(ReviewReason::UnverifiedClaims { count });
            }
        }

        reasons
    }

    /// Flagged pair indices and their reasons
    pub fn flag(&self, results: &[PairResult]) -> (BTreeSet<usize>, BTreeMap<usize, Vec<ReviewReason>>) {
        let mut flags = BTreeSet::new();
        let mut reasons = BTreeMap::new();
        for result in results {
            let breached = self.evaluate(result);
            if !breached.is_empty() {
                flags.insert(result.pair_index);
                reasons.insert(result.pair_index, breached);
            }
        }
        (flags, reasons)
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Fold per-pair results into conversation statistics
///
/// Sums are exact sums of the per-pair figures, taken in pair order.
pub fn aggregate(results: &[PairResult], policy: &ReviewPolicy) -> Aggregates {
    let latencies: Vec<f64> = results.iter().filter_map(|r| r.latency_seconds).collect();
    let total_input_tokens: usize = results.iter().map(|r| r.token_counts.input_full).sum();
    let total_output_tokens: usize = results.iter().map(|r| r.token_counts.output).sum();

    Aggregates {
        pair_count: results.len(),
        mean_relevance: mean(results.iter().map(|r| r.relevance_score)),
        mean_completeness: mean(results.iter().map(|r| r.completeness_score)),
        mean_hallucination_ratio: mean(results.iter().map(|r| r.hallucination_ratio)),
        total_claims: results.iter().map(|r| r.claims.len()).sum(),
        unsupported_claims: results.iter().map(PairResult::unsupported_claims).sum(),
        total_input_tokens,
        total_input_tokens_topk: results.iter().map(|r| r.token_counts.input_topk).sum(),
        total_output_tokens,
        total_tokens: total_input_tokens + total_output_tokens,
        total_cost_full_usd: results.iter().map(|r| r.cost_full.total_usd).sum(),
        total_cost_topk_usd: results.iter().map(|r| r.cost_topk.total_usd).sum(),
        total_latency_seconds: latencies.iter().sum(),
        mean_latency_seconds: mean(latencies.iter().copied()),
        latency_known_pairs: latencies.len(),
        flagged_pair_count: results
            .iter()
            .filter(|r| !policy.evaluate(r).is_empty())
            .count(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnscore_core::{Claim, ClaimType, CostEstimate, EvidenceMatch, TokenCounts};

    fn claim(confidence: EvidenceConfidence) -> EvidenceMatch {
        EvidenceMatch {
            claim: Claim {
                text: "x".to_string(),
                pair_index: 1,
                claim_type: ClaimType::Assertion,
            },
            best_evidence_id: Some("e1".to_string()),
            best_support_score: 0.5,
            evidence_confidence: confidence,
            top_evidence: Vec::new(),
        }
    }

    fn result(index: usize, relevance: f64, completeness: f64, claims: Vec<EvidenceMatch>) -> PairResult {
        let hallucination_ratio = turnscore_core::hallucination_ratio(&claims);
        PairResult {
            pair_index: index,
            query_text: "q".to_string(),
            reply_text: "r".to_string(),
            relevance_score: relevance,
            relevant: relevance >= 0.5,
            no_evidence: false,
            most_relevant_evidence_id: None,
            completeness_score: completeness,
            sub_requirements: Vec::new(),
            missing_subpoints: Vec::new(),
            claims,
            hallucination_ratio,
            latency_seconds: Some(index as f64),
            cost_full: CostEstimate {
                total_usd: 0.1,
                ..Default::default()
            },
            cost_topk: CostEstimate {
                total_usd: 0.2,
                ..Default::default()
            },
            topk_evidence_ids: Vec::new(),
            token_counts: TokenCounts {
                input_full: 100,
                input_topk: 40,
                output: 10,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_clean_pair_is_not_flagged() {
        let policy = ReviewPolicy::default();
        let r = result(1, 0.9, 1.0, vec![claim(EvidenceConfidence::Strong)]);
        assert!(policy.evaluate(&r).is_empty());
    }

    #[test]
    fn test_each_threshold_flags() {
        let policy = ReviewPolicy::default();

        let reasons = policy.evaluate(&result(1, 0.1, 0.5, vec![claim(EvidenceConfidence::None)]));
        assert_eq!(reasons.len(), 3);
        assert!(matches!(reasons[0], ReviewReason::HighHallucinationRatio { unsupported: 1, claims: 1, .. }));
        assert!(matches!(reasons[1], ReviewReason::LowCompleteness { .. }));
        assert!(matches!(reasons[2], ReviewReason::LowRelevance { .. }));

        let reasons = policy.evaluate(&result(2, 0.9, 1.0, vec![
            claim(EvidenceConfidence::Strong),
            claim(EvidenceConfidence::Strong),
            claim(EvidenceConfidence::Strong),
            claim(EvidenceConfidence::Medium),
        ]));
        assert_eq!(reasons, vec![ReviewReason::UnverifiedClaims { count: 1 }]);
    }

    #[test]
    fn test_ratio_at_cutoff_is_not_flagged() {
        let policy = ReviewPolicy::new(ReviewThresholds {
            flag_unverified_claims: false,
            ..Default::default()
        });
        // 1 of 4 unsupported = 0.25, not above the cutoff
        let r = result(1, 0.9, 1.0, vec![
            claim(EvidenceConfidence::Strong),
            claim(EvidenceConfidence::Strong),
            claim(EvidenceConfidence::Strong),
            claim(EvidenceConfidence::Weak),
        ]);
        assert!(policy.evaluate(&r).is_empty());
    }

    #[test]
    fn test_flag_collects_indices() {
        let policy = ReviewPolicy::default();
        let results = vec![
            result(1, 0.9, 1.0, Vec::new()),
            result(2, 0.1, 1.0, Vec::new()),
            result(3, 0.9, 0.2, Vec::new()),
        ];
        let (flags, reasons) = policy.flag(&results);
        assert_eq!(flags.into_iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(reasons.len(), 2);
    }

    #[test]
    fn test_aggregate_means_and_sums() {
        let policy = ReviewPolicy::default();
        let results = vec![
            result(1, 0.8, 1.0, vec![claim(EvidenceConfidence::Strong)]),
            result(2, 0.4, 0.5, vec![claim(EvidenceConfidence::None)]),
        ];
        let agg = aggregate(&results, &policy);
        assert_eq!(agg.pair_count, 2);
        assert!((agg.mean_relevance.unwrap() - 0.6).abs() < 1e-12);
        assert_eq!(agg.mean_completeness, Some(0.75));
        assert_eq!(agg.mean_hallucination_ratio, Some(0.5));
        assert_eq!(agg.total_tokens, 220);
        assert_eq!(agg.total_input_tokens_topk, 80);
        assert!((agg.total_cost_full_usd - 0.2).abs() < 1e-12);
        assert_eq!(agg.total_latency_seconds, 3.0);
        assert_eq!(agg.mean_latency_seconds, Some(1.5));
        assert_eq!(agg.unsupported_claims, 1);
        assert_eq!(agg.flagged_pair_count, 1);
    }

    #[test]
    fn test_empty_conversation_has_undefined_means() {
        let agg = aggregate(&[], &ReviewPolicy::default());
        assert_eq!(agg.pair_count, 0);
        assert_eq!(agg.mean_relevance, None);
        assert_eq!(agg.mean_completeness, None);
        assert_eq!(agg.mean_hallucination_ratio, None);
        assert_eq!(agg.mean_latency_seconds, None);
        assert_eq!(agg.total_cost_full_usd, 0.0);
    }
}
