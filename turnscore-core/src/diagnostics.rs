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

//! Non-fatal findings recorded during an evaluation run
//!
//! Skipped records (malformed evidence, unpaired replies) and degraded
//! measurements (estimated tokens, unknown latency) are surfaced in full in
//! the audit report and only as counts in the summary report.

use serde::{Deserialize, Serialize};

/// Category of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Evidence record without any text; excluded
    MalformedEvidence,
    /// Evidence record repeating an earlier id; excluded
    DuplicateEvidence,
    /// Evidence vector with a different dimensionality than the run; vector dropped
    InconsistentVector,
    /// Conversation record that could not be read; excluded
    MalformedMessage,
    /// Assistant message with no unconsumed user message before it
    OrphanedReply,
    /// User message that never received a reply
    DanglingQuery,
    /// Pair scored against an empty evidence set
    NoEvidence,
    /// Token counts fell back to the heuristic estimator
    EstimatedTokens,
    /// Reply latency could not be determined
    MissingLatency,
    /// Pairs beyond the configured prefix were not evaluated
    TruncatedConversation,
}

impl DiagnosticKind {
    /// Whether the diagnostic means an input item was dropped
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::MalformedEvidence
                | DiagnosticKind::DuplicateEvidence
                | DiagnosticKind::MalformedMessage
                | DiagnosticKind::OrphanedReply
                | DiagnosticKind::DanglingQuery
                | DiagnosticKind::TruncatedConversation
        )
    }
}

/// A single recorded warning with its location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Pair the finding belongs to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair_index: Option<usize>,
    /// Position of the offending record in its input sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            pair_index: None,
            position: None,
        }
    }

    pub fn at_position(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }

    pub fn for_pair(mut self, pair_index: usize) -> Self {
        self.pair_index = Some(pair_index);
        self
    }
}

/// Counts of skipped and degraded items, for the summary report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticCounts {
    pub skipped: usize,
    pub degraded: usize,
}

impl DiagnosticCounts {
    pub fn tally(diagnostics: &[Diagnostic]) -> Self {
        let skipped = diagnostics.iter().filter(|d| d.kind.is_skip()).count();
        Self {
            skipped,
            degraded: diagnostics.len() - skipped,
        }
    }

    pub fn total(&self) -> usize {
        self.skipped + self.degraded
    }
}
