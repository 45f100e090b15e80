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

//! HTML rendering of the clean report

use crate::report::CleanReport;
use std::fmt::Write;

/// Escape text for HTML element and attribute content
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn score(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "n/a".to_string())
}

/// Render a self-contained HTML page for a clean report
pub fn render_clean_html(report: &CleanReport) -> String {
    let mut html = String::new();
    // Writing to a String cannot fail
    let _ = write_clean_html(&mut html, report);
    html
}

fn write_clean_html(out: &mut String, report: &CleanReport) -> std::fmt::Result {
    let a = &report.aggregates;
    writeln!(out, "<!DOCTYPE html>")?;
    writeln!(out, "<html lang=\"en\"><head><meta charset=\"utf-8\">")?;
    writeln!(out, "<title>Conversation evaluation</title>")?;
    writeln!(
        out,
        "<style>body{{font-family:sans-serif;margin:2em}}table{{border-collapse:collapse}}\
         td,th{{border:1px solid #ccc;padding:4px 8px;text-align:left}}.flag{{color:#b00}}</style>"
    )?;
    writeln!(out, "</head><body>")?;
    writeln!(out, "<h1>Conversation evaluation</h1>")?;
    writeln!(out, "<p>{}</p>", escape_html(&report.summary))?;

    writeln!(out, "<h2>Aggregates</h2><table>")?;
    for (label, value) in [
        ("Evaluated pairs", a.pair_count.to_string()),
        ("Mean relevance", score(a.mean_relevance)),
        ("Mean completeness", score(a.mean_completeness)),
        ("Mean hallucination ratio", score(a.mean_hallucination_ratio)),
        ("Total tokens", a.total_tokens.to_string()),
        ("Total cost (full context)", format!("${:.6}", report.total_cost_usd)),
        ("Total cost (top-K context)", format!("${:.6}", report.total_cost_topk_usd)),
        ("Total latency (s)", format!("{:.3}", report.total_latency_seconds)),
        (
            "Skipped / degraded items",
            format!(
                "{} / {}",
                report.skipped_or_degraded.skipped, report.skipped_or_degraded.degraded
            ),
        ),
    ] {
        writeln!(out, "<tr><th>{}</th><td>{}</td></tr>", label, escape_html(&value))?;
    }
    writeln!(out, "</table>")?;

    if !report.warnings.is_empty() {
        writeln!(out, "<h2>Warnings</h2><ul>")?;
        for warning in &report.warnings {
            writeln!(out, "<li>{}</li>", escape_html(warning))?;
        }
        writeln!(out, "</ul>")?;
    }

    writeln!(out, "<h2>Flagged for manual review</h2>")?;
    if report.flagged_pairs.is_empty() {
        writeln!(out, "<p>None.</p>")?;
    } else {
        writeln!(out, "<ul>")?;
        for flagged in &report.flagged_pairs {
            writeln!(
                out,
                "<li class=\"flag\">Pair {}: {}<br><small>{}</small></li>",
                flagged.pair_index,
                escape_html(&flagged.reason),
                escape_html(&flagged.query_preview)
            )?;
        }
        writeln!(out, "</ul>")?;
    }

    if !report.top_missing_subpoints.is_empty() {
        writeln!(out, "<h2>Most frequently missed sub-points</h2><ol>")?;
        for missing in &report.top_missing_subpoints {
            writeln!(
                out,
                "<li>{} ({}x)</li>",
                escape_html(&missing.text),
                missing.occurrences
            )?;
        }
        writeln!(out, "</ol>")?;
    }

    writeln!(out, "<h2>Per-pair scores</h2><table>")?;
    writeln!(
        out,
        "<tr><th>#</th><th>Query</th><th>Reply</th><th>Relevance</th><th>Completeness</th>\
         <th>Hallucination</th><th>Latency (s)</th><th>Cost</th></tr>"
    )?;
    for pair in &report.per_pair {
        writeln!(
            out,
            "<tr{}><td>{}</td><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.2}</td><td>{:.2}</td><td>{}</td><td>${:.6}</td></tr>",
            if pair.flagged { " class=\"flag\"" } else { "" },
            pair.pair_index,
            escape_html(&pair.query_preview),
            escape_html(&pair.reply_preview),
            pair.relevance_score,
            pair.completeness_score,
            pair.hallucination_ratio,
            pair.latency_seconds
                .map(|s| format!("{:.3}", s))
                .unwrap_or_else(|| "n/a".to_string()),
            pair.cost_usd,
        )?;
    }
    writeln!(out, "</table>")?;
    writeln!(out, "</body></html>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{FlaggedPair, PairSummary};
    use turnscore_core::{Aggregates, DiagnosticCounts};

    fn report() -> CleanReport {
        CleanReport {
            summary: "Across 1 evaluated replies".to_string(),
            aggregates: Aggregates {
                pair_count: 1,
                ..Default::default()
            },
            flagged_pairs: vec![FlaggedPair {
                pair_index: 1,
                reason: "Reply leaves 1 sub-point(s) unaddressed".to_string(),
                query_preview: "<script>alert(1)</script>".to_string(),
            }],
            top_missing_subpoints: Vec::new(),
            total_cost_usd: 0.0001,
            total_cost_topk_usd: 0.0001,
            total_latency_seconds: 0.0,
            mean_latency_seconds: None,
            per_pair: vec![PairSummary {
                pair_index: 1,
                relevance_score: 1.0,
                completeness_score: 0.5,
                hallucination_ratio: 0.0,
                latency_seconds: None,
                cost_usd: 0.0001,
                flagged: true,
                query_preview: "Tom & Jerry?".to_string(),
                reply_preview: "\"quoted\"".to_string(),
            }],
            skipped_or_degraded: DiagnosticCounts::default(),
            warnings: vec!["Completeness is low".to_string()],
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href='x'>Tom & \"Jerry\"</a>"),
            "&lt;a href=&#39;x&#39;&gt;Tom &amp; &quot;Jerry&quot;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_render_escapes_user_text() {
        let html = render_clean_html(&report());
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("Tom &amp; Jerry?"));
        assert!(html.contains("Completeness is low"));
        assert!(html.contains("class=\"flag\""));
    }
}
