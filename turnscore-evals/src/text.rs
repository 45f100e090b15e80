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

//! Shared text utilities: tokenization, stopwords and sentence splitting

use std::collections::BTreeSet;

/// Function words ignored by matching and embedding
pub const STOPWORDS: &[&str] = &[
    "a", "an", "the", "of", "to", "in", "on", "at", "for", "by", "with", "from", "as", "and",
    "or", "but", "nor", "so", "yet", "is", "are", "was", "were", "be", "been", "being", "it",
    "its", "this", "that", "these", "those", "what", "which", "who", "whom", "whose", "when",
    "where", "why", "how", "do", "does", "did", "can", "could", "would", "should", "will",
    "shall", "may", "might", "must", "has", "have", "had", "i", "me", "my", "we", "our", "you",
    "your", "he", "she", "they", "them", "their", "his", "her", "there", "here", "about",
    "please", "tell", "explain", "describe", "give", "show", "list", "also", "than", "then",
    "if", "into", "not", "no", "any", "some", "all",
];

/// Words that make a fragment read as a statement
const VERB_WORDS: &[&str] = &[
    "is", "are", "was", "were", "be", "been", "has", "have", "had", "will", "would", "should",
    "must", "can", "could", "may", "might", "does", "did", "do", "includes", "include",
    "contains", "contain", "provides", "provide", "offers", "offer", "requires", "require",
    "means", "became", "becomes", "remains", "costs", "supports", "support", "uses", "use",
    "allows", "allow", "lies", "lives", "stands",
];

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Whether `c` belongs to a script written without spaces between words
///
/// Such characters are tokenized one per token.
pub fn is_unspaced_script(c: char) -> bool {
    matches!(c,
        '\u{3040}'..='\u{30FF}'     // Hiragana, Katakana
        | '\u{3400}'..='\u{4DBF}'   // CJK extension A
        | '\u{4E00}'..='\u{9FFF}'   // CJK unified ideographs
        | '\u{F900}'..='\u{FAFF}'   // CJK compatibility ideographs
        | '\u{FF66}'..='\u{FF9F}'   // Halfwidth Katakana
        | '\u{20000}'..='\u{2FA1F}' // CJK extensions B onward
    )
}

/// Lowercased alphanumeric words, stopwords removed, in text order
pub fn tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if is_unspaced_script(c) {
            push_word(&mut out, &mut word);
            out.push(c.to_string());
        } else if c.is_alphanumeric() {
            word.push(c);
        } else {
            push_word(&mut out, &mut word);
        }
    }
    push_word(&mut out, &mut word);
    out
}

fn push_word(out: &mut Vec<String>, word: &mut String) {
    if !word.is_empty() {
        let lower = word.to_lowercase();
        if !is_stopword(&lower) {
            out.push(lower);
        }
        word.clear();
    }
}

/// Whether the text contains characters of a script written without spaces
pub fn has_unspaced_script(text: &str) -> bool {
    text.chars().any(is_unspaced_script)
}

/// Content terms with a light plural fold, for lexical overlap
pub fn content_terms(text: &str) -> BTreeSet<String> {
    tokens(text).into_iter().map(|w| fold_plural(&w)).collect()
}

fn fold_plural(word: &str) -> String {
    match word.strip_suffix('s') {
        Some(stem) if word.chars().count() > 3 && !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Whether the text has at least one content word
pub fn has_content(text: &str) -> bool {
    !tokens(text).is_empty()
}

/// Share of `needle`'s content terms also present in `haystack`
///
/// Returns `None` when `needle` has no content terms.
pub fn term_overlap(needle: &BTreeSet<String>, haystack: &BTreeSet<String>) -> Option<f64> {
    if needle.is_empty() {
        return None;
    }
    let shared = needle.intersection(haystack).count();
    Some(shared as f64 / needle.len() as f64)
}

/// Split on sentence terminators followed by whitespace, and on line breaks
///
/// A terminator inside a token (`2.1`, `example.org`) does not split.
/// Full-width terminators (`。`, `？`, `！`) always split.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            push_trimmed(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '\u{3002}' | '\u{FF1F}' | '\u{FF01}') {
            push_trimmed(&mut sentences, &mut current);
        } else if matches!(c, '.' | '?' | '!') {
            match chars.peek() {
                Some(next) if next.is_whitespace() => push_trimmed(&mut sentences, &mut current),
                None => push_trimmed(&mut sentences, &mut current),
                _ => {}
            }
        }
    }
    push_trimmed(&mut sentences, &mut current);
    sentences
}

fn push_trimmed(out: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Whether any word of the text is a statement-forming verb
pub fn has_verb(text: &str) -> bool {
    words_lower(text).any(|w| {
        VERB_WORDS.contains(&w.as_str()) || (w.len() > 4 && w.ends_with("ed"))
    })
}

/// Whether a capitalized word appears after the first word (a likely proper noun)
pub fn has_inner_capital(text: &str) -> bool {
    text.split_whitespace()
        .skip(1)
        .any(|w| w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
}

pub fn has_digit(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

fn words_lower(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// Strip surrounding whitespace and punctuation, keeping inner text intact
pub fn trim_fragment(text: &str) -> &str {
    text.trim_matches(|c: char| {
        c.is_whitespace()
            || matches!(c, ',' | ';' | ':' | '.' | '?' | '!' | '\u{3001}' | '\u{3002}' | '\u{FF1F}' | '\u{FF01}')
    })
}
