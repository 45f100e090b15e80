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

//! Query decomposition and completeness checking
//!
//! A query is split into sub-requirements by a pluggable rule; each one is
//! then tested against the reply. Unmatched sub-requirements are reported
//! verbatim so reviewers can see exactly what was left out.

use crate::capability::{EmbedError, EmbeddingClient};
use crate::embeddings::support_score;
use crate::text;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use turnscore_core::{CompletenessMatch, MatchMode, Pair, SubquestionRule};

/// Strategy for decomposing a query into sub-requirements
pub trait SubRequirementRule: Send + Sync {
    /// Ordered sub-requirements; empty when the query asks for nothing
    fn split(&self, query: &str) -> Vec<String>;

    fn name(&self) -> &str;
}

/// The whole query is one requirement
#[derive(Debug, Clone, Copy, Default)]
pub struct WholeQueryRule;

impl SubRequirementRule for WholeQueryRule {
    fn split(&self, query: &str) -> Vec<String> {
        finish(vec![query.to_string()])
    }

    fn name(&self) -> &str {
        "whole_query"
    }
}

/// One requirement per sentence, question, clause after `;`, or list item
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceRule;

impl SubRequirementRule for SentenceRule {
    fn split(&self, query: &str) -> Vec<String> {
        finish(sentence_pieces(query))
    }

    fn name(&self) -> &str {
        "sentences"
    }
}

/// Sentence pieces further split where a conjunction joins two asks
#[derive(Debug, Clone, Copy, Default)]
pub struct ConjunctionRule;

impl SubRequirementRule for ConjunctionRule {
    fn split(&self, query: &str) -> Vec<String> {
        let pieces = sentence_pieces(query)
            .into_iter()
            .flat_map(|piece| {
                conjunction_pattern()
                    .split(&piece)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect();
        finish(pieces)
    }

    fn name(&self) -> &str {
        "conjunctions"
    }
}

/// Rule implementing a configured [`SubquestionRule`]
pub fn rule_for(rule: SubquestionRule) -> Arc<dyn SubRequirementRule> {
    match rule {
        SubquestionRule::WholeQuery => Arc::new(WholeQueryRule),
        SubquestionRule::Sentences => Arc::new(SentenceRule),
        SubquestionRule::Conjunctions => Arc::new(ConjunctionRule),
    }
}

fn list_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(?:[-*\u{2022}]|\(?\d{1,2}[.)]|\(?[a-zA-Z]\))\s+").expect("list marker pattern compiles")
    })
}

fn inline_enumeration() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\((?:\d{1,2}|[a-z])\)\s*").expect("enumeration pattern compiles"))
}

fn conjunction_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i),?\s+(?:and|as well as|along with)\s+").expect("conjunction pattern compiles")
    })
}

/// Lines (with list markers removed), then sentences, `;` clauses and inline `(1)` items
fn sentence_pieces(query: &str) -> Vec<String> {
    query
        .lines()
        .map(|line| list_marker().replace(line, "").into_owned())
        .flat_map(|line| text::split_sentences(&line))
        .flat_map(|sentence| {
            sentence
                .split(';')
                .flat_map(|clause| {
                    inline_enumeration()
                        .split(clause)
                        .map(str::to_string)
                        .collect::<Vec<_>>()
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Trim punctuation, drop pieces without content words, dedupe in order
fn finish(pieces: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    pieces
        .iter()
        .map(|p| text::trim_fragment(p))
        .filter(|p| text::has_content(p))
        .filter(|p| seen.insert(p.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Completeness of one reply
#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessOutcome {
    /// `matched / max(1, total)`; 1.0 when nothing was asked
    pub score: f64,
    pub sub_requirements: Vec<String>,
    /// Unmatched sub-requirements, in query order
    pub missing: Vec<String>,
}

/// Tests whether each sub-requirement of the query is addressed by the reply
#[derive(Clone)]
pub struct CompletenessChecker {
    rule: Arc<dyn SubRequirementRule>,
    matching: CompletenessMatch,
    embedder: Arc<dyn EmbeddingClient>,
}

impl CompletenessChecker {
    pub fn new(
        rule: Arc<dyn SubRequirementRule>,
        matching: CompletenessMatch,
        embedder: Arc<dyn EmbeddingClient>,
    ) -> Self {
        Self {
            rule,
            matching,
            embedder,
        }
    }

    pub fn rule_name(&self) -> &str {
        self.rule.name()
    }

    pub fn check(&self, pair: &Pair) -> Result<CompletenessOutcome, EmbedError> {
        let sub_requirements = self.rule.split(&pair.query.text);
        if sub_requirements.is_empty() {
            return Ok(CompletenessOutcome {
                score: 1.0,
                sub_requirements,
                missing: Vec::new(),
            });
        }

        let mut missing = Vec::new();
        match self.matching.mode {
            MatchMode::Lexical => {
                let reply_terms = text::content_terms(&pair.reply.text);
                for requirement in &sub_requirements {
                    let overlap =
                        text::term_overlap(&text::content_terms(requirement), &reply_terms)
                            .unwrap_or(0.0);
                    if overlap < self.matching.threshold {
                        missing.push(requirement.clone());
                    }
                }
            }
            MatchMode::Semantic => {
                let mut segments = text::split_sentences(&pair.reply.text);
                segments.push(pair.reply.text.clone());
                let segment_vectors = segments
                    .iter()
                    .map(|s| self.embedder.embed(s))
                    .collect::<Result<Vec<_>, _>>()?;
                for requirement in &sub_requirements {
                    let vector = self.embedder.embed(requirement)?;
                    let best = segment_vectors
                        .iter()
                        .map(|s| support_score(&vector, s))
                        .fold(0.0, f64::max);
                    if best < self.matching.threshold {
                        missing.push(requirement.clone());
                    }
                }
            }
        }

        let total = sub_requirements.len();
        let matched = total - missing.len();
        Ok(CompletenessOutcome {
            score: matched as f64 / total.max(1) as f64,
            sub_requirements,
            missing,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashingEmbedder;
    use turnscore_core::Message;

    fn pair(query: &str, reply: &str) -> Pair {
        Pair {
            index: 1,
            query: Message::user(query, 0),
            reply: Message::assistant(reply, 1),
        }
    }

    fn checker(rule: SubquestionRule, mode: MatchMode) -> CompletenessChecker {
        CompletenessChecker::new(
            rule_for(rule),
            CompletenessMatch {
                mode,
                threshold: 0.5,
            },
            Arc::new(HashingEmbedder::default()),
        )
    }

    #[test]
    fn test_conjunction_split() {
        assert_eq!(
            ConjunctionRule.split("What is the capital of France and its population?"),
            vec!["What is the capital of France", "its population"]
        );
    }

    #[test]
    fn test_sentence_rule_keeps_conjunctions() {
        assert_eq!(
            SentenceRule.split("What is the capital of France and its population?"),
            vec!["What is the capital of France and its population"]
        );
        assert_eq!(
            SentenceRule.split("Who built it? When was it finished; how tall is it?"),
            vec!["Who built it", "When was it finished", "how tall is it"]
        );
    }

    #[test]
    fn test_enumerated_sub_asks() {
        let query = "Compare these:\n1. battery life\n2. price\n- weight";
        assert_eq!(
            SentenceRule.split(query),
            vec!["Compare these", "battery life", "price", "weight"]
        );
        assert_eq!(
            ConjunctionRule.split("Cover (1) pricing (2) shipping times"),
            vec!["Cover", "pricing", "shipping times"]
        );
    }

    #[test]
    fn test_fragments_without_content_are_dropped() {
        assert_eq!(
            ConjunctionRule.split("Explain the tax rules and why?"),
            vec!["Explain the tax rules"]
        );
        assert!(WholeQueryRule.split("What is it?").is_empty());
    }

    #[test]
    fn test_missing_subpoint_reported_verbatim() {
        let outcome = checker(SubquestionRule::Conjunctions, MatchMode::Lexical)
            .check(&pair(
                "What is the capital of France and its population?",
                "The capital of France is Paris.",
            ))
            .unwrap();
        assert_eq!(outcome.score, 0.5);
        assert_eq!(outcome.missing, vec!["its population"]);
        assert_eq!(outcome.sub_requirements.len(), 2);
    }

    #[test]
    fn test_zero_sub_requirements_is_complete() {
        let outcome = checker(SubquestionRule::Conjunctions, MatchMode::Lexical)
            .check(&pair("", "Anything at all."))
            .unwrap();
        assert_eq!(outcome.score, 1.0);
        assert!(outcome.sub_requirements.is_empty());
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn test_whole_query_rule() {
        let outcome = checker(SubquestionRule::WholeQuery, MatchMode::Lexical)
            .check(&pair(
                "What is the capital of France and its population?",
                "The capital of France is Paris.",
            ))
            .unwrap();
        // 2 of 3 content terms (capital, france) are present
        assert_eq!(outcome.score, 1.0);
    }

    #[test]
    fn test_semantic_mode() {
        let outcome = checker(SubquestionRule::Conjunctions, MatchMode::Semantic)
            .check(&pair(
                "What is the capital of France and its population?",
                "The capital of France is Paris.",
            ))
            .unwrap();
        assert_eq!(outcome.missing, vec!["its population"]);
    }
}
