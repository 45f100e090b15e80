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

//! Token pricing and currency rounding

use serde::{Deserialize, Serialize};

/// Decimal places kept in per-pair cost figures
pub const COST_DECIMALS: i32 = 6;

/// Round a USD amount to [`COST_DECIMALS`] places
pub fn round_usd(amount: f64) -> f64 {
    let factor = 10f64.powi(COST_DECIMALS);
    (amount * factor).round() / factor
}

/// Price of input and output tokens, per 1K tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenPricing {
    pub input_per_1k_tokens_usd: f64,
    pub output_per_1k_tokens_usd: f64,
}

impl TokenPricing {
    pub fn new(input_per_1k_tokens_usd: f64, output_per_1k_tokens_usd: f64) -> Self {
        Self {
            input_per_1k_tokens_usd,
            output_per_1k_tokens_usd,
        }
    }

    pub fn input_cost(&self, input_tokens: usize) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_per_1k_tokens_usd
    }

    pub fn output_cost(&self, output_tokens: usize) -> f64 {
        (output_tokens as f64 / 1000.0) * self.output_per_1k_tokens_usd
    }

    /// Calculate the cost for given token counts, rounded to currency precision
    pub fn calculate_cost(&self, input_tokens: usize, output_tokens: usize) -> f64 {
        round_usd(self.input_cost(input_tokens) + self.output_cost(output_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_cost() {
        let pricing = TokenPricing::new(0.03, 0.06);
        // 1500 input tokens, 500 output tokens
        assert_eq!(pricing.calculate_cost(1500, 500), 0.075);
    }

    #[test]
    fn test_rounds_to_six_decimals() {
        let pricing = TokenPricing::new(0.03, 0.06);
        // 0.00003 * 7 + 0.00006 * 3 = 0.00039
        assert_eq!(pricing.calculate_cost(7, 3), 0.00039);
        assert_eq!(round_usd(0.123_456_789), 0.123457);
    }

    #[test]
    fn test_cost_is_reproducible() {
        let pricing = TokenPricing::new(0.0015, 0.002);
        let a = pricing.calculate_cost(12_345, 678);
        let b = pricing.calculate_cost(12_345, 678);
        assert_eq!(a.to_bits(), b.to_bits());
    }
}
