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

//! Character-ratio token estimate
//!
//! Used whenever neither the input nor the injected counter supplies a real
//! token count. The ratio of 4 characters per token is close to cl100k_base
//! for English prose; results are always flagged as estimates downstream.

/// Characters per token assumed when no ratio is configured
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenCalculator {
    chars_per_token: f64,
}

impl Default for TokenCalculator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenCalculator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculator with a custom ratio; non-positive or non-finite ratios are ignored
    pub fn with_ratio(chars_per_token: f64) -> Self {
        if chars_per_token.is_finite() && chars_per_token > 0.0 {
            Self { chars_per_token }
        } else {
            Self::default()
        }
    }

    pub fn chars_per_token(&self) -> f64 {
        self.chars_per_token
    }

    /// `ceil(chars / ratio)` over the trimmed text, counting Unicode scalar values
    pub fn estimate(&self, text: &str) -> usize {
        match text.trim().chars().count() {
            0 => 0,
            chars => (chars as f64 / self.chars_per_token).ceil() as usize,
        }
    }
}

/// Estimate with the default ratio
pub fn estimate_tokens(text: &str) -> usize {
    TokenCalculator::default().estimate(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_text_has_no_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens(" \n\t "), 0);
    }

    #[test]
    fn test_partial_token_rounds_up() {
        assert_eq!(estimate_tokens("Hello"), 2);
        assert_eq!(estimate_tokens(&"a".repeat(100)), 25);
    }

    #[test]
    fn test_multibyte_characters_count_once() {
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_unusable_ratio_keeps_default() {
        assert_eq!(TokenCalculator::with_ratio(0.0).chars_per_token(), DEFAULT_CHARS_PER_TOKEN);
        assert_eq!(TokenCalculator::with_ratio(f64::NAN).chars_per_token(), DEFAULT_CHARS_PER_TOKEN);
        assert_eq!(TokenCalculator::with_ratio(2.0).estimate("abcd"), 2);
    }
}
