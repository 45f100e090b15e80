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

//! Evidence vector resolution and reply relevance

use crate::capability::{EmbedError, EmbeddingClient};
use crate::embeddings::support_score;
use std::sync::Arc;
use tracing::{debug, warn};
use turnscore_core::{CapabilityKind, Diagnostic, DiagnosticKind, EvalError, EvidenceChunk, Pair, Result};

/// An evidence chunk with the vector used for scoring
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChunk {
    pub chunk: EvidenceChunk,
    pub vector: Vec<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedEvidence {
    pub chunks: Vec<ResolvedChunk>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Attach a vector to every chunk
///
/// Precomputed vectors are used when their length matches the run's
/// dimensionality: the embedder's declared size, or else the length of the
/// first precomputed vector. Other chunks are embedded from their text, and
/// an embedding of a different length is a capability failure.
pub fn resolve_evidence(
    chunks: Vec<EvidenceChunk>,
    embedder: &dyn EmbeddingClient,
) -> Result<ResolvedEvidence> {
    let mut expected = embedder.dimensions().or_else(|| {
        chunks
            .iter()
            .find_map(|c| c.vector.as_ref().map(Vec::len))
    });

    let mut resolved = ResolvedEvidence::default();
    let mut embedded = 0usize;
    for (position, chunk) in chunks.into_iter().enumerate() {
        let precomputed = match (&chunk.vector, expected) {
            (Some(vector), Some(dims)) if vector.len() == dims => Some(vector.clone()),
            (Some(vector), Some(dims)) => {
                warn!(
                    chunk_id = %chunk.id,
                    expected = dims,
                    actual = vector.len(),
                    "Dropping evidence vector with inconsistent dimensions"
                );
                resolved.diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::InconsistentVector,
                        format!(
                            "evidence '{}' vector has {} dimensions, expected {}; re-embedded from text",
                            chunk.id,
                            vector.len(),
                            dims
                        ),
                    )
                    .at_position(position),
                );
                None
            }
            _ => None,
        };

        let vector = match precomputed {
            Some(vector) => vector,
            None => {
                embedded += 1;
                let vector = embedder.embed(&chunk.text).map_err(|e| {
                    EvalError::capability_for_chunk(CapabilityKind::Embedding, &chunk.id, e)
                })?;
                match expected {
                    Some(dims) if vector.len() != dims => {
                        return Err(EvalError::capability_for_chunk(
                            CapabilityKind::Embedding,
                            &chunk.id,
                            EmbedError::Dimensions {
                                expected: dims,
                                actual: vector.len(),
                            },
                        ));
                    }
                    Some(_) => {}
                    None => expected = Some(vector.len()),
                }
                vector
            }
        };
        resolved.chunks.push(ResolvedChunk { chunk, vector });
    }

    debug!(
        chunks = resolved.chunks.len(),
        embedded,
        "Resolved evidence vectors"
    );
    Ok(resolved)
}

/// Reject a reply or claim vector whose length differs from the evidence vectors
pub(crate) fn check_dimensions(vector: &[f64], evidence: &[ResolvedChunk]) -> std::result::Result<(), EmbedError> {
    match evidence.first() {
        Some(first) if first.vector.len() != vector.len() => Err(EmbedError::Dimensions {
            expected: first.vector.len(),
            actual: vector.len(),
        }),
        _ => Ok(()),
    }
}

/// Relevance of one reply to the evidence set
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceOutcome {
    /// Maximum support across chunks, in [0, 1]
    pub score: f64,
    pub no_evidence: bool,
    pub best_evidence_id: Option<String>,
    /// Support of the reply by each chunk, in evidence order
    pub chunk_scores: Vec<f64>,
}

impl RelevanceOutcome {
    /// Indices of the `k` most relevant chunks, best first; ties keep evidence order
    pub fn top_k(&self, k: usize) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.chunk_scores.len()).collect();
        order.sort_by(|&a, &b| {
            self.chunk_scores[b]
                .partial_cmp(&self.chunk_scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(k);
        order
    }
}

/// Scores a reply by its best cosine similarity to any evidence chunk
#[derive(Clone)]
pub struct RelevanceScorer {
    embedder: Arc<dyn EmbeddingClient>,
}

impl RelevanceScorer {
    pub fn new(embedder: Arc<dyn EmbeddingClient>) -> Self {
        Self { embedder }
    }

    pub fn score(&self, pair: &Pair, evidence: &[ResolvedChunk]) -> std::result::Result<RelevanceOutcome, EmbedError> {
        if evidence.is_empty() {
            return Ok(RelevanceOutcome {
                score: 0.0,
                no_evidence: true,
                best_evidence_id: None,
                chunk_scores: Vec::new(),
            });
        }

        let reply_vector = self.embedder.embed(&pair.reply.text)?;
        check_dimensions(&reply_vector, evidence)?;
        let chunk_scores: Vec<f64> = evidence
            .iter()
            .map(|c| support_score(&reply_vector, &c.vector))
            .collect();

        let mut best = 0usize;
        for (i, score) in chunk_scores.iter().enumerate() {
            if *score > chunk_scores[best] {
                best = i;
            }
        }

        Ok(RelevanceOutcome {
            score: chunk_scores[best],
            no_evidence: false,
            best_evidence_id: Some(evidence[best].chunk.id.clone()),
            chunk_scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use turnscore_core::Message;

    struct StubEmbedder;

    impl EmbeddingClient for StubEmbedder {
        fn embed(&self, text: &str) -> std::result::Result<Vec<f64>, EmbedError> {
            match text {
                "reply" => Ok(vec![1.0, 0.0]),
                "near" => Ok(vec![0.8, 0.6]),
                "far" => Ok(vec![0.0, 1.0]),
                "opposite" => Ok(vec![-1.0, 0.0]),
                _ => Err(EmbedError::ApiError(format!("unknown text '{}'", text))),
            }
        }

        fn backend_name(&self) -> &str {
            "stub"
        }
    }

    fn pair(reply: &str) -> Pair {
        Pair {
            index: 1,
            query: Message::user("question", 0),
            reply: Message::assistant(reply, 1),
        }
    }

    fn resolved(texts: &[(&str, &str)]) -> Vec<ResolvedChunk> {
        let chunks = texts
            .iter()
            .map(|(id, text)| EvidenceChunk::new(*id, *text))
            .collect();
        resolve_evidence(chunks, &StubEmbedder).unwrap().chunks
    }

    #[test]
    fn test_max_similarity_across_chunks() {
        let scorer = RelevanceScorer::new(Arc::new(StubEmbedder));
        let evidence = resolved(&[("e1", "far"), ("e2", "near"), ("e3", "opposite")]);
        let outcome = scorer.score(&pair("reply"), &evidence).unwrap();

        assert!((outcome.score - 0.8).abs() < 1e-12);
        assert_eq!(outcome.best_evidence_id.as_deref(), Some("e2"));
        assert!(!outcome.no_evidence);
        // Negative similarity clamps to zero
        assert_eq!(outcome.chunk_scores[2], 0.0);
        assert_eq!(outcome.top_k(2), vec![1, 0]);
    }

    #[test]
    fn test_reply_vector_length_must_match_evidence() {
        let chunks = vec![EvidenceChunk::new("e1", "unused").with_vector(vec![0.5, 0.5, 0.5])];
        let evidence = resolve_evidence(chunks, &StubEmbedder).unwrap().chunks;
        assert_eq!(evidence[0].vector.len(), 3);

        let scorer = RelevanceScorer::new(Arc::new(StubEmbedder));
        let err = scorer.score(&pair("reply"), &evidence).unwrap_err();
        assert!(matches!(err, EmbedError::Dimensions { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_embedded_chunk_must_match_precomputed_dimensions() {
        let chunks = vec![
            EvidenceChunk::new("e1", "unused").with_vector(vec![0.5, 0.5, 0.5]),
            EvidenceChunk::new("e2", "near"),
        ];
        let err = resolve_evidence(chunks, &StubEmbedder).unwrap_err();
        assert!(err.to_string().contains("evidence chunk 'e2'"));
        assert!(err.to_string().contains("expected 3, got 2"));
    }

    #[test]
    fn test_empty_evidence_is_a_score_not_an_error() {
        let scorer = RelevanceScorer::new(Arc::new(StubEmbedder));
        let outcome = scorer.score(&pair("never embedded"), &[]).unwrap();
        assert_eq!(outcome.score, 0.0);
        assert!(outcome.no_evidence);
        assert!(outcome.best_evidence_id.is_none());
    }

    #[test]
    fn test_top_k_ties_keep_evidence_order() {
        let outcome = RelevanceOutcome {
            score: 0.5,
            no_evidence: false,
            best_evidence_id: Some("a".to_string()),
            chunk_scores: vec![0.5, 0.2, 0.5, 0.2],
        };
        assert_eq!(outcome.top_k(3), vec![0, 2, 1]);
        assert_eq!(outcome.top_k(10).len(), 4);
    }

    #[test]
    fn test_precomputed_vectors_are_used() {
        let chunks = vec![EvidenceChunk::new("e1", "not in stub").with_vector(vec![0.0, 1.0])];
        let resolved = resolve_evidence(chunks, &StubEmbedder).unwrap();
        assert_eq!(resolved.chunks[0].vector, vec![0.0, 1.0]);
        assert!(resolved.diagnostics.is_empty());
    }

    #[test]
    fn test_inconsistent_vector_is_replaced() {
        let embedder = HashingEmbedder::new(8);
        let chunks = vec![
            EvidenceChunk::new("e1", "Paris").with_vector(vec![1.0; 8]),
            EvidenceChunk::new("e2", "France").with_vector(vec![1.0; 3]),
        ];
        let resolved = resolve_evidence(chunks, &embedder).unwrap();
        assert_eq!(resolved.chunks[0].vector, vec![1.0; 8]);
        assert_eq!(resolved.chunks[1].vector.len(), 8);
        assert_eq!(resolved.diagnostics.len(), 1);
        assert_eq!(resolved.diagnostics[0].kind, DiagnosticKind::InconsistentVector);
    }

    #[test]
    fn test_embedding_failure_names_chunk() {
        let chunks = vec![EvidenceChunk::new("e9", "unknown")];
        let err = resolve_evidence(chunks, &StubEmbedder).unwrap_err();
        assert!(err.to_string().contains("evidence chunk 'e9'"));
    }
}
