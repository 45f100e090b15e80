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

//! Claim extraction
//!
//! Purely syntactic: a reply is cut into sentences, sentences are cut again
//! where a coordinating conjunction joins two statements, and fragments that
//! do not read as declarative statements are dropped.

use crate::text;
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use turnscore_core::{Claim, ClaimType};

/// Openers of conversational filler that asserts nothing
const PROCEDURAL_OPENERS: &[&str] = &[
    "please",
    "let me",
    "let us",
    "feel free",
    "sorry",
    "thank",
    "hello",
    "hi ",
    "hi,",
    "i hope",
    "i'd be happy",
    "i am happy",
    "happy to",
    "glad to",
    "you're welcome",
];

/// Strategy for cutting a reply into candidate claims
pub trait ClaimSegmenter: Send + Sync {
    fn segment(&self, reply: &str) -> Vec<String>;

    fn name(&self) -> &str;
}

/// Sentence boundaries, then `and`/`but`/`;` between two statements
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceSegmenter;

fn coordinator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i),?\s+(?:and|but)\s+|\s*;\s*").expect("coordinator pattern compiles"))
}

impl SentenceSegmenter {
    /// Split `sentence` at coordinators whose both sides carry a verb
    fn split_independent(sentence: &str) -> Vec<String> {
        let mut parts = Vec::new();
        let mut start = 0usize;

        for m in coordinator().find_iter(sentence) {
            let left = &sentence[start..m.start()];
            let right_end = coordinator()
                .find_at(sentence, m.end())
                .map(|next| next.start())
                .unwrap_or(sentence.len());
            let right = &sentence[m.end()..right_end];
            if text::has_verb(left) && text::has_verb(right) {
                parts.push(left.to_string());
                start = m.end();
            }
        }
        parts.push(sentence[start..].to_string());
        parts
    }
}

impl ClaimSegmenter for SentenceSegmenter {
    fn segment(&self, reply: &str) -> Vec<String> {
        text::split_sentences(reply)
            .into_iter()
            .filter(|s| !is_question(s))
            .flat_map(|s| Self::split_independent(&s))
            .map(|c| {
                c.trim_matches(|ch: char| ch.is_whitespace() || ch == ',' || ch == ';')
                    .to_string()
            })
            .filter(|c| !c.is_empty())
            .collect()
    }

    fn name(&self) -> &str {
        "sentences"
    }
}

fn is_question(fragment: &str) -> bool {
    fragment.trim_end().ends_with(|c: char| c == '?' || c == '\u{FF1F}')
}

/// Whether a fragment reads as a factual statement
///
/// Text in scripts without word spacing has no verb or capitalization cues
/// and counts as a statement unless it is a question.
pub fn is_declarative(fragment: &str) -> bool {
    let lower = fragment.trim().to_lowercase();
    if is_question(&lower) || PROCEDURAL_OPENERS.iter().any(|o| lower.starts_with(o)) {
        return false;
    }
    text::has_digit(fragment)
        || text::has_verb(fragment)
        || text::has_inner_capital(fragment)
        || text::has_unspaced_script(fragment)
}

fn url_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bhttps?://\S+|\bwww\.\S+").expect("url pattern compiles"))
}

fn recommendation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:should|recommend(?:ed|s)?|suggest(?:ed|s)?|consider|advise[ds]?|best to|make sure)\b")
            .expect("recommendation pattern compiles")
    })
}

/// Figures, money, percentages, measurements and large number words
fn numeric_patterns() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        [
            r"\d",
            r"[$\x{20AC}\x{00A3}\x{00A5}\x{20B9}]",
            r"(?i)\b(?:usd|eur|gbp|inr|jpy|rs|dollars?|euros?|rupees?|cents?)\b",
            r"(?i)%|\bper\s?cent\b|\bpercent(?:age)?\b",
            r"(?i)\b(?:kg|mg|lbs?|oz|km|cm|mm|ml|kilograms?|grams?|pounds?|ounces?|kilomet(?:er|re)s?|met(?:er|re)s?|miles?|lit(?:er|re)s?)\b",
            r"(?i)\b(?:hundred|thousand|million|billion|trillion|dozen)\b",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("numeric pattern compiles"))
        .collect()
    })
}

fn is_numeric(text: &str) -> bool {
    numeric_patterns().iter().any(|re| re.is_match(text))
}

/// Tag a claim: links first, then figures, then advice
pub fn classify_claim(text: &str) -> ClaimType {
    if url_pattern().is_match(text) {
        ClaimType::Url
    } else if is_numeric(text) {
        ClaimType::Numeric
    } else if recommendation_pattern().is_match(text) {
        ClaimType::Recommendation
    } else {
        ClaimType::Assertion
    }
}

/// Extracts ordered, de-duplicated claims from a reply
#[derive(Clone)]
pub struct ClaimExtractor {
    segmenter: Arc<dyn ClaimSegmenter>,
}

impl Default for ClaimExtractor {
    fn default() -> Self {
        Self::new(Arc::new(SentenceSegmenter))
    }
}

impl ClaimExtractor {
    pub fn new(segmenter: Arc<dyn ClaimSegmenter>) -> Self {
        Self { segmenter }
    }

    /// Claims of one reply; empty for purely procedural replies
    pub fn extract(&self, reply: &str, pair_index: usize) -> Vec<Claim> {
        let mut seen = HashSet::new();
        self.segmenter
            .segment(reply)
            .into_iter()
            .filter(|c| is_declarative(c))
            .filter(|c| seen.insert(c.to_lowercase()))
            .map(|text| Claim {
                claim_type: classify_claim(&text),
                text,
                pair_index,
            })
            .collect()
    }
}
