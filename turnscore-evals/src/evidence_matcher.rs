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

//! Claim-level evidence matching and confidence tiers

use crate::capability::{EmbedError, EmbeddingClient};
use crate::embeddings::support_score;
use crate::relevance::{check_dimensions, ResolvedChunk};
use std::sync::Arc;
use turnscore_core::{Claim, EvidenceConfidence, EvidenceMatch, EvidenceRef, HallucinationThresholds};

/// Supporting chunks kept per claim
pub const TOP_EVIDENCE_PER_CLAIM: usize = 3;

/// Ordered table of `(lower_bound, tier)` rows, highest bound first
///
/// A score takes the tier of the first row whose bound it reaches, so a
/// score exactly on a boundary gets the higher tier. Scores below every
/// bound are `none`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceTable {
    rows: Vec<(f64, EvidenceConfidence)>,
}

impl ConfidenceTable {
    pub fn new(mut rows: Vec<(f64, EvidenceConfidence)>) -> Self {
        rows.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Self { rows }
    }

    pub fn from_thresholds(thresholds: &HallucinationThresholds) -> Self {
        Self::new(vec![
            (thresholds.strong, EvidenceConfidence::Strong),
            (thresholds.medium, EvidenceConfidence::Medium),
            (thresholds.weak, EvidenceConfidence::Weak),
        ])
    }

    pub fn tier(&self, score: f64) -> EvidenceConfidence {
        self.rows
            .iter()
            .find(|(bound, _)| score >= *bound)
            .map(|(_, tier)| *tier)
            .unwrap_or(EvidenceConfidence::None)
    }

    pub fn rows(&self) -> &[(f64, EvidenceConfidence)] {
        &self.rows
    }
}

/// Scores each claim against every evidence chunk
#[derive(Clone)]
pub struct EvidenceMatcher {
    embedder: Arc<dyn EmbeddingClient>,
    table: ConfidenceTable,
    snippet_chars: usize,
}

impl EvidenceMatcher {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, table: ConfidenceTable, snippet_chars: usize) -> Self {
        Self {
            embedder,
            table,
            snippet_chars,
        }
    }

    pub fn match_claims(
        &self,
        claims: &[Claim],
        evidence: &[ResolvedChunk],
    ) -> Result<Vec<EvidenceMatch>, EmbedError> {
        claims
            .iter()
            .map(|claim| self.match_claim(claim, evidence))
            .collect()
    }

    fn match_claim(&self, claim: &Claim, evidence: &[ResolvedChunk]) -> Result<EvidenceMatch, EmbedError> {
        if evidence.is_empty() {
            return Ok(EvidenceMatch {
                claim: claim.clone(),
                best_evidence_id: None,
                best_support_score: 0.0,
                evidence_confidence: EvidenceConfidence::None,
                top_evidence: Vec::new(),
            });
        }

        let vector = self.embedder.embed(&claim.text)?;
        check_dimensions(&vector, evidence)?;
        let mut scored: Vec<(usize, f64)> = evidence
            .iter()
            .enumerate()
            .map(|(i, c)| (i, support_score(&vector, &c.vector)))
            .collect();
        // Stable: equal scores keep evidence order, so the first maximum wins
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let (best_index, best_score) = scored[0];
        let top_evidence = scored
            .iter()
            .take(TOP_EVIDENCE_PER_CLAIM)
            .map(|&(i, score)| {
                let chunk = &evidence[i].chunk;
                EvidenceRef {
                    id: chunk.id.clone(),
                    source: chunk.source.clone(),
                    snippet: chunk.snippet(self.snippet_chars),
                    score,
                }
            })
            .collect();

        Ok(EvidenceMatch {
            claim: claim.clone(),
            best_evidence_id: Some(evidence[best_index].chunk.id.clone()),
            best_support_score: best_score,
            evidence_confidence: self.table.tier(best_score),
            top_evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use turnscore_core::{ClaimType, EvidenceChunk};

    struct StubEmbedder;

    impl EmbeddingClient for StubEmbedder {
        fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
            match text {
                "supported" => Ok(vec![1.0, 0.0]),
                "unsupported" => Ok(vec![0.0, 1.0]),
                _ => Err(EmbedError::ApiError("unknown".to_string())),
            }
        }

        fn backend_name(&self) -> &str {
            "stub"
        }
    }

    fn claim(text: &str) -> Claim {
        Claim {
            text: text.to_string(),
            pair_index: 1,
            claim_type: ClaimType::Assertion,
        }
    }

    fn chunk(id: &str, vector: Vec<f64>) -> ResolvedChunk {
        ResolvedChunk {
            chunk: EvidenceChunk::new(id, format!("text of {}", id)),
            vector,
        }
    }

    fn matcher() -> EvidenceMatcher {
        EvidenceMatcher::new(
            Arc::new(StubEmbedder),
            ConfidenceTable::from_thresholds(&HallucinationThresholds::default()),
            800,
        )
    }

    #[test]
    fn test_default_tiers() {
        let table = ConfidenceTable::from_thresholds(&HallucinationThresholds::default());
        assert_eq!(table.tier(0.9), EvidenceConfidence::Strong);
        assert_eq!(table.tier(0.4), EvidenceConfidence::Medium);
        assert_eq!(table.tier(0.3), EvidenceConfidence::Weak);
        assert_eq!(table.tier(0.1), EvidenceConfidence::None);
    }

    #[test]
    fn test_boundaries_resolve_to_higher_tier() {
        let table = ConfidenceTable::from_thresholds(&HallucinationThresholds::default());
        assert_eq!(table.tier(0.55), EvidenceConfidence::Strong);
        assert_eq!(table.tier(0.35), EvidenceConfidence::Medium);
        assert_eq!(table.tier(0.28), EvidenceConfidence::Weak);
    }

    #[test]
    fn test_rows_are_ordered_regardless_of_input_order() {
        let table = ConfidenceTable::new(vec![
            (0.2, EvidenceConfidence::Weak),
            (0.8, EvidenceConfidence::Strong),
            (0.5, EvidenceConfidence::Medium),
        ]);
        assert_eq!(table.rows()[0].1, EvidenceConfidence::Strong);
        assert_eq!(table.tier(0.6), EvidenceConfidence::Medium);
    }

    #[test]
    fn test_best_match_and_top_evidence() {
        let evidence = vec![
            chunk("e1", vec![0.0, 1.0]),
            chunk("e2", vec![1.0, 0.0]),
            chunk("e3", vec![0.6, 0.8]),
            chunk("e4", vec![1.0, 0.0]),
        ];
        let matches = matcher()
            .match_claims(&[claim("supported")], &evidence)
            .unwrap();
        let m = &matches[0];
        assert_eq!(m.best_evidence_id.as_deref(), Some("e2"));
        assert!((m.best_support_score - 1.0).abs() < 1e-12);
        assert_eq!(m.evidence_confidence, EvidenceConfidence::Strong);
        let top: Vec<_> = m.top_evidence.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(top, vec!["e2", "e4", "e3"]);
        assert_eq!(m.top_evidence[0].snippet, "text of e2");
    }

    #[test]
    fn test_unsupported_claim_is_none() {
        let evidence = vec![chunk("e1", vec![1.0, 0.0])];
        let matches = matcher()
            .match_claims(&[claim("unsupported")], &evidence)
            .unwrap();
        assert_eq!(matches[0].evidence_confidence, EvidenceConfidence::None);
        assert_eq!(matches[0].best_support_score, 0.0);
    }

    #[test]
    fn test_empty_evidence_gives_no_match() {
        let matches = matcher().match_claims(&[claim("never embedded")], &[]).unwrap();
        assert_eq!(matches[0].best_evidence_id, None);
        assert_eq!(matches[0].evidence_confidence, EvidenceConfidence::None);
        assert!(matches[0].top_evidence.is_empty());
    }

    #[test]
    fn test_claim_vector_length_must_match_evidence() {
        let evidence = vec![chunk("e1", vec![1.0, 0.0, 0.0])];
        let err = matcher().match_claims(&[claim("supported")], &evidence).unwrap_err();
        assert!(matches!(err, EmbedError::Dimensions { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_embedding_error_propagates() {
        let evidence = vec![chunk("e1", vec![1.0, 0.0])];
        assert!(matcher().match_claims(&[claim("other")], &evidence).is_err());
    }

    proptest! {
        #[test]
        fn prop_tier_is_monotone(a in 0.0f64..=1.0, b in 0.0f64..=1.0) {
            let table = ConfidenceTable::from_thresholds(&HallucinationThresholds::default());
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(table.tier(lo) <= table.tier(hi));
        }

        #[test]
        fn prop_custom_thresholds_are_monotone(
            weak in 0.0f64..0.3,
            gap1 in 0.01f64..0.3,
            gap2 in 0.01f64..0.3,
            score in 0.0f64..=1.0,
            delta in 0.0f64..0.5,
        ) {
            let thresholds = HallucinationThresholds {
                weak,
                medium: weak + gap1,
                strong: weak + gap1 + gap2,
            };
            let table = ConfidenceTable::from_thresholds(&thresholds);
            prop_assert!(table.tier(score) <= table.tier(score + delta));
            prop_assert_eq!(table.tier(thresholds.medium), EvidenceConfidence::Medium);
        }

        #[test]
        fn prop_ratio_is_bounded(scores in proptest::collection::vec(0.0f64..=1.0, 0..20)) {
            let table = ConfidenceTable::from_thresholds(&HallucinationThresholds::default());
            let matches: Vec<EvidenceMatch> = scores
                .iter()
                .map(|&score| EvidenceMatch {
                    claim: claim("c"),
                    best_evidence_id: Some("e1".to_string()),
                    best_support_score: score,
                    evidence_confidence: table.tier(score),
                    top_evidence: Vec::new(),
                })
                .collect();
            let ratio = turnscore_core::hallucination_ratio(&matches);
            prop_assert!((0.0..=1.0).contains(&ratio));
            let below_medium = scores.iter().filter(|&&s| s < turnscore_core::DEFAULT_MEDIUM_THRESHOLD).count();
            prop_assert_eq!(ratio, below_medium as f64 / scores.len().max(1) as f64);
        }
    }
}
