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

//! Token and cost estimation
//!
//! Two estimates per pair: the full evidence set in the prompt, and only
//! the top-K most relevant chunks, which approximates real serving.

use crate::capability::{TokenCountError, TokenCounter};
use crate::relevance::ResolvedChunk;
use std::sync::Arc;
use turnscore_core::{round_usd, CostEstimate, Pair, TokenCounts, TokenPricing};

/// Token counts and both cost estimates for one pair
#[derive(Debug, Clone, PartialEq)]
pub struct CostBreakdown {
    pub token_counts: TokenCounts,
    pub full: CostEstimate,
    pub topk: CostEstimate,
    pub topk_evidence_ids: Vec<String>,
}

#[derive(Clone)]
pub struct CostEstimator {
    counter: Arc<dyn TokenCounter>,
    pricing: TokenPricing,
    top_k: usize,
}

impl CostEstimator {
    pub fn new(counter: Arc<dyn TokenCounter>, pricing: TokenPricing, top_k: usize) -> Self {
        Self {
            counter,
            pricing,
            top_k,
        }
    }

    /// Estimate costs; `ranking` lists evidence indices from most to least relevant
    pub fn estimate(
        &self,
        pair: &Pair,
        evidence: &[ResolvedChunk],
        ranking: &[usize],
    ) -> Result<CostBreakdown, TokenCountError> {
        let mut estimated = false;

        let query = self.count(&pair.query.text, pair.query.token_count, &mut estimated)?;
        let output = self.count(&pair.reply.text, pair.reply.token_count, &mut estimated)?;

        let mut chunk_tokens = Vec::with_capacity(evidence.len());
        for resolved in evidence {
            let chunk = &resolved.chunk;
            chunk_tokens.push(self.count(&chunk.text, chunk.token_count, &mut estimated)?);
        }
        let evidence_full: usize = chunk_tokens.iter().sum();

        let top: Vec<usize> = ranking
            .iter()
            .copied()
            .filter(|&i| i < evidence.len())
            .take(self.top_k)
            .collect();
        let evidence_topk: usize = top.iter().map(|&i| chunk_tokens[i]).sum();

        let token_counts = TokenCounts {
            query,
            evidence_full,
            evidence_topk,
            input_full: query + evidence_full,
            input_topk: query + evidence_topk,
            output,
            estimated,
        };

        Ok(CostBreakdown {
            full: self.cost(token_counts.input_full, output),
            topk: self.cost(token_counts.input_topk, output),
            topk_evidence_ids: top.iter().map(|&i| evidence[i].chunk.id.clone()).collect(),
            token_counts,
        })
    }

    fn count(
        &self,
        text: &str,
        explicit: Option<usize>,
        estimated: &mut bool,
    ) -> Result<usize, TokenCountError> {
        if let Some(tokens) = explicit {
            return Ok(tokens);
        }
        *estimated |= self.counter.is_estimate();
        self.counter.count(text)
    }

    fn cost(&self, input_tokens: usize, output_tokens: usize) -> CostEstimate {
        CostEstimate {
            input_tokens,
            output_tokens,
            input_usd: round_usd(self.pricing.input_cost(input_tokens)),
            output_usd: round_usd(self.pricing.output_cost(output_tokens)),
            total_usd: self.pricing.calculate_cost(input_tokens, output_tokens),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::HeuristicTokenCounter;
    use turnscore_core::{EvidenceChunk, Message};

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count(&self, text: &str) -> Result<usize, TokenCountError> {
            Ok(text.split_whitespace().count())
        }

        fn is_estimate(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "words"
        }
    }

    struct BrokenCounter;

    impl TokenCounter for BrokenCounter {
        fn count(&self, _text: &str) -> Result<usize, TokenCountError> {
            Err(TokenCountError::Unavailable("no vocabulary".to_string()))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn evidence(texts: &[&str]) -> Vec<ResolvedChunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| ResolvedChunk {
                chunk: EvidenceChunk::new(format!("e{}", i + 1), *t),
                vector: vec![1.0],
            })
            .collect()
    }

    fn pair(query: &str, reply: &str) -> Pair {
        Pair {
            index: 1,
            query: Message::user(query, 0),
            reply: Message::assistant(reply, 1),
        }
    }

    #[test]
    fn test_full_and_topk_inputs() {
        let estimator = CostEstimator::new(Arc::new(WordCounter), TokenPricing::new(0.03, 0.06), 1);
        let evidence = evidence(&["one two three", "four five"]);
        let breakdown = estimator
            .estimate(&pair("a b", "c d e f"), &evidence, &[1, 0])
            .unwrap();

        let counts = &breakdown.token_counts;
        assert_eq!(counts.query, 2);
        assert_eq!(counts.evidence_full, 5);
        assert_eq!(counts.evidence_topk, 2);
        assert_eq!(counts.input_full, 7);
        assert_eq!(counts.input_topk, 4);
        assert_eq!(counts.output, 4);
        assert!(!counts.estimated);
        assert_eq!(breakdown.topk_evidence_ids, vec!["e2"]);

        // 7/1000*0.03 + 4/1000*0.06 = 0.00021 + 0.00024
        assert_eq!(breakdown.full.total_usd, 0.00045);
        assert_eq!(breakdown.full.input_usd, 0.00021);
        assert_eq!(breakdown.topk.total_usd, 0.00036);
    }

    #[test]
    fn test_explicit_counts_win_over_estimator() {
        let estimator = CostEstimator::new(Arc::new(BrokenCounter), TokenPricing::new(0.03, 0.06), 5);
        let mut p = pair("ignored text", "ignored reply");
        p.query.token_count = Some(10);
        p.reply.token_count = Some(20);
        let breakdown = estimator.estimate(&p, &[], &[]).unwrap();
        assert_eq!(breakdown.token_counts.input_full, 10);
        assert_eq!(breakdown.token_counts.output, 20);
        assert!(!breakdown.token_counts.estimated);
    }

    #[test]
    fn test_heuristic_marks_estimated() {
        let estimator =
            CostEstimator::new(Arc::new(HeuristicTokenCounter::new()), TokenPricing::new(0.03, 0.06), 5);
        let breakdown = estimator.estimate(&pair("abcd", "abcdefgh"), &[], &[]).unwrap();
        assert_eq!(breakdown.token_counts.query, 1);
        assert_eq!(breakdown.token_counts.output, 2);
        assert!(breakdown.token_counts.estimated);
        assert_eq!(breakdown.full, breakdown.topk);
    }

    #[test]
    fn test_counter_failure_propagates() {
        let estimator = CostEstimator::new(Arc::new(BrokenCounter), TokenPricing::new(0.03, 0.06), 5);
        assert!(estimator.estimate(&pair("a", "b"), &[], &[]).is_err());
    }

    #[test]
    fn test_repeated_estimates_are_bit_identical() {
        let estimator =
            CostEstimator::new(Arc::new(HeuristicTokenCounter::new()), TokenPricing::new(0.0015, 0.002), 2);
        let evidence = evidence(&["Paris is the capital of France.", "The Louvre is in Paris."]);
        let p = pair("What is the capital of France?", "The capital of France is Paris.");
        let a = estimator.estimate(&p, &evidence, &[0, 1]).unwrap();
        let b = estimator.estimate(&p, &evidence, &[0, 1]).unwrap();
        assert_eq!(a.full.total_usd.to_bits(), b.full.total_usd.to_bits());
        assert_eq!(a.topk.total_usd.to_bits(), b.topk.total_usd.to_bits());
    }
}
