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

//! Report projections
//!
//! Two immutable views of one [`ConversationResult`]: the full audit report
//! with every claim and diagnostic, and the clean summary for reviewers.
//! Neither carries timestamps, so identical inputs give identical bytes.

use crate::aggregator::{aggregate, ReviewPolicy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use turnscore_core::{
    truncate_chars, Aggregates, ConversationResult, ConversationSummary, Diagnostic,
    DiagnosticCounts, EvalConfig, EvidenceSnippet, PairResult, ReviewReason,
};

/// Characters of the query kept in clean-report previews
pub const QUERY_PREVIEW_CHARS: usize = 200;
/// Characters of the reply kept in clean-report previews
pub const REPLY_PREVIEW_CHARS: usize = 300;
/// Missing sub-points listed in the clean report
pub const TOP_MISSING_SUBPOINTS: usize = 5;

/// Audit view: everything the engine computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullReport {
    pub config: EvalConfig,
    pub conversation: ConversationSummary,
    pub aggregates: Aggregates,
    pub manual_review: Vec<ReviewEntry>,
    pub pairs: Vec<PairResult>,
    pub evidence: Vec<EvidenceSnippet>,
    pub diagnostics: Vec<Diagnostic>,
}

impl FullReport {
    /// Aggregates recomputed from this report's own per-pair detail
    pub fn recompute_aggregates(&self) -> Aggregates {
        let policy = ReviewPolicy::new(self.config.manual_review_thresholds);
        aggregate(&self.pairs, &policy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewEntry {
    pub pair_index: usize,
    pub reasons: Vec<ReviewReason>,
}

/// Summary view for reviewers; no claim-level detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanReport {
    pub summary: String,
    pub aggregates: Aggregates,
    pub flagged_pairs: Vec<FlaggedPair>,
    pub top_missing_subpoints: Vec<MissingSubpoint>,
    pub total_cost_usd: f64,
    pub total_cost_topk_usd: f64,
    pub total_latency_seconds: f64,
    pub mean_latency_seconds: Option<f64>,
    pub per_pair: Vec<PairSummary>,
    pub skipped_or_degraded: DiagnosticCounts,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedPair {
    pub pair_index: usize,
    /// One line, all breached thresholds
    pub reason: String,
    pub query_preview: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingSubpoint {
    pub text: String,
    pub occurrences: usize,
    pub pair_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSummary {
    pub pair_index: usize,
    pub relevance_score: f64,
    pub completeness_score: f64,
    pub hallucination_ratio: f64,
    pub latency_seconds: Option<f64>,
    pub cost_usd: f64,
    pub flagged: bool,
    pub query_preview: String,
    pub reply_preview: String,
}

/// Builds both report views from a [`ConversationResult`]
pub struct ReportBuilder;

impl ReportBuilder {
    pub fn full(result: &ConversationResult) -> FullReport {
        FullReport {
            config: result.config.clone(),
            conversation: result.summary.clone(),
            aggregates: result.aggregates.clone(),
            manual_review: result
                .review_reasons
                .iter()
                .map(|(index, reasons)| ReviewEntry {
                    pair_index: *index,
                    reasons: reasons.clone(),
                })
                .collect(),
            pairs: result.per_pair.clone(),
            evidence: result.evidence.clone(),
            diagnostics: result.diagnostics.clone(),
        }
    }

    pub fn clean(result: &ConversationResult) -> CleanReport {
        let aggregates = result.aggregates.clone();
        let counts = DiagnosticCounts::tally(&result.diagnostics);

        let flagged_pairs = result
            .per_pair
            .iter()
            .filter_map(|pair| {
                let reasons = result.review_reasons.get(&pair.pair_index)?;
                let reason = reasons
                    .iter()
                    .map(ReviewReason::describe)
                    .collect::<Vec<_>>()
                    .join("; ");
                Some(FlaggedPair {
                    pair_index: pair.pair_index,
                    reason,
                    query_preview: preview(&pair.query_text, QUERY_PREVIEW_CHARS),
                })
            })
            .collect();

        let per_pair = result
            .per_pair
            .iter()
            .map(|pair| PairSummary {
                pair_index: pair.pair_index,
                relevance_score: pair.relevance_score,
                completeness_score: pair.completeness_score,
                hallucination_ratio: pair.hallucination_ratio,
                latency_seconds: pair.latency_seconds,
                cost_usd: pair.cost_full.total_usd,
                flagged: result.is_flagged(pair.pair_index),
                query_preview: preview(&pair.query_text, QUERY_PREVIEW_CHARS),
                reply_preview: preview(&pair.reply_text, REPLY_PREVIEW_CHARS),
            })
            .collect();

        CleanReport {
            summary: natural_language_summary(&aggregates),
            warnings: warnings(result, &counts),
            top_missing_subpoints: top_missing_subpoints(&result.per_pair, TOP_MISSING_SUBPOINTS),
            total_cost_usd: aggregates.total_cost_full_usd,
            total_cost_topk_usd: aggregates.total_cost_topk_usd,
            total_latency_seconds: aggregates.total_latency_seconds,
            mean_latency_seconds: aggregates.mean_latency_seconds,
            flagged_pairs,
            per_pair,
            skipped_or_degraded: counts,
            aggregates,
        }
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let truncated = truncate_chars(text, max_chars);
    if truncated.len() < text.len() {
        format!("{}...", truncated.trim_end())
    } else {
        truncated
    }
}

/// Most frequent missing sub-points; ties keep first appearance
fn top_missing_subpoints(pairs: &[PairResult], limit: usize) -> Vec<MissingSubpoint> {
    let mut order: Vec<MissingSubpoint> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();

    for pair in pairs {
        for missing in &pair.missing_subpoints {
            let key = missing.to_lowercase();
            match slot.get(&key) {
                Some(&i) => {
                    order[i].occurrences += 1;
                    if !order[i].pair_indices.contains(&pair.pair_index) {
                        order[i].pair_indices.push(pair.pair_index);
                    }
                }
                None => {
                    slot.insert(key, order.len());
                    order.push(MissingSubpoint {
                        text: missing.clone(),
                        occurrences: 1,
                        pair_indices: vec![pair.pair_index],
                    });
                }
            }
        }
    }

    order.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    order.truncate(limit);
    order
}

fn fmt_score(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string())
}

fn natural_language_summary(aggregates: &Aggregates) -> String {
    if aggregates.pair_count == 0 {
        return "No query/reply pairs were evaluated.".to_string();
    }
    format!(
        "Across {} evaluated replies: mean relevance = {}, mean completeness = {}, mean hallucination ratio = {}. \
         {} of {} replies flagged for manual review. Estimated cost ${:.6} with full context, ${:.6} with top-K context.",
        aggregates.pair_count,
        fmt_score(aggregates.mean_relevance),
        fmt_score(aggregates.mean_completeness),
        fmt_score(aggregates.mean_hallucination_ratio),
        aggregates.flagged_pair_count,
        aggregates.pair_count,
        aggregates.total_cost_full_usd,
        aggregates.total_cost_topk_usd,
    )
}

fn warnings(result: &ConversationResult, counts: &DiagnosticCounts) -> Vec<String> {
    let t = &result.config.manual_review_thresholds;
    let a = &result.aggregates;
    let mut warnings = Vec::new();

    if a.pair_count == 0 {
        warnings.push("No query/reply pairs were found in the conversation".to_string());
    }
    if result.summary.evidence_chunks == 0 && a.pair_count > 0 {
        warnings.push(
            "No usable evidence was supplied; relevance and claim support could not be measured"
                .to_string(),
        );
    }
    if let Some(mean) = a.mean_completeness.filter(|m| *m < t.min_completeness) {
        warnings.push(format!(
            "Completeness is low (mean {:.2} < {:.2})",
            mean, t.min_completeness
        ));
    }
    if let Some(mean) = a.mean_relevance.filter(|m| *m < t.min_relevance) {
        warnings.push(format!(
            "Relevance is low (mean {:.2} < {:.2})",
            mean, t.min_relevance
        ));
    }
    if let Some(mean) = a
        .mean_hallucination_ratio
        .filter(|m| *m > t.max_hallucination_ratio)
    {
        warnings.push(format!(
            "Hallucination risk is high (mean ratio {:.2} > {:.2})",
            mean, t.max_hallucination_ratio
        ));
    }
    if counts.total() > 0 {
        warnings.push(format!(
            "{} input item(s) skipped and {} measurement(s) degraded; see the full report",
            counts.skipped, counts.degraded
        ));
    }
    warnings
}
