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

//! Query/reply pairing

use tracing::warn;
use turnscore_core::{Diagnostic, DiagnosticKind, Message, Pair, Role};

/// Pairs found in a conversation and the messages left unpaired
#[derive(Debug, Clone, Default)]
pub struct PairExtraction {
    pub pairs: Vec<Pair>,
    /// Positions of assistant messages with no unconsumed user message before them
    pub orphaned_replies: Vec<usize>,
    /// Positions of user messages that never received a reply
    pub dangling_queries: Vec<usize>,
}

impl PairExtraction {
    /// Orphans and dangling queries as diagnostics, in conversation order
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut diagnostics: Vec<Diagnostic> = self
            .orphaned_replies
            .iter()
            .map(|&p| {
                Diagnostic::new(
                    DiagnosticKind::OrphanedReply,
                    "assistant message has no preceding unanswered user message",
                )
                .at_position(p)
            })
            .chain(self.dangling_queries.iter().map(|&p| {
                Diagnostic::new(
                    DiagnosticKind::DanglingQuery,
                    "user message was never answered",
                )
                .at_position(p)
            }))
            .collect();
        diagnostics.sort_by_key(|d| d.position);
        diagnostics
    }
}

/// Single forward scan pairing each reply with the nearest unconsumed query
#[derive(Debug, Clone, Copy, Default)]
pub struct PairExtractor;

impl PairExtractor {
    pub fn extract(&self, messages: &[Message]) -> PairExtraction {
        let mut out = PairExtraction::default();
        let mut pending: Option<&Message> = None;

        for message in messages {
            match message.role {
                Role::User => {
                    if let Some(previous) = pending.replace(message) {
                        out.dangling_queries.push(previous.position);
                    }
                }
                Role::Assistant => match pending.take() {
                    Some(query) => out.pairs.push(Pair {
                        index: out.pairs.len() + 1,
                        query: query.clone(),
                        reply: message.clone(),
                    }),
                    None => out.orphaned_replies.push(message.position),
                },
            }
        }
        if let Some(last) = pending {
            out.dangling_queries.push(last.position);
        }

        if !out.orphaned_replies.is_empty() || !out.dangling_queries.is_empty() {
            warn!(
                orphaned = out.orphaned_replies.len(),
                dangling = out.dangling_queries.len(),
                "Unpaired conversation messages"
            );
        }
        out
    }
}

pub fn extract_pairs(messages: &[Message]) -> PairExtraction {
    PairExtractor.extract(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn conversation(roles: &str) -> Vec<Message> {
        roles
            .chars()
            .enumerate()
            .map(|(i, c)| match c {
                'u' => Message::user(format!("q{}", i), i),
                _ => Message::assistant(format!("a{}", i), i),
            })
            .collect()
    }

    #[test]
    fn test_alternating_conversation() {
        let extraction = extract_pairs(&conversation("uaua"));
        assert_eq!(extraction.pairs.len(), 2);
        assert_eq!(extraction.pairs[0].index, 1);
        assert_eq!(extraction.pairs[1].index, 2);
        assert_eq!(extraction.pairs[1].query.text, "q2");
        assert_eq!(extraction.pairs[1].reply.text, "a3");
        assert!(extraction.diagnostics().is_empty());
    }

    #[test]
    fn test_consecutive_queries_pair_the_latest() {
        let extraction = extract_pairs(&conversation("uua"));
        assert_eq!(extraction.pairs.len(), 1);
        assert_eq!(extraction.pairs[0].query.text, "q1");
        assert_eq!(extraction.dangling_queries, vec![0]);
    }

    #[test]
    fn test_orphans_and_trailing_query() {
        let extraction = extract_pairs(&conversation("auaau"));
        assert_eq!(extraction.pairs.len(), 1);
        assert_eq!(extraction.orphaned_replies, vec![0, 3]);
        assert_eq!(extraction.dangling_queries, vec![4]);

        let kinds: Vec<_> = extraction.diagnostics().iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![
                DiagnosticKind::OrphanedReply,
                DiagnosticKind::OrphanedReply,
                DiagnosticKind::DanglingQuery
            ]
        );
    }

    #[test]
    fn test_empty_conversation() {
        let extraction = extract_pairs(&[]);
        assert!(extraction.pairs.is_empty());
    }

    proptest! {
        #[test]
        fn prop_pairs_never_exceed_replies(roles in "[ua]{0,40}") {
            let messages = conversation(&roles);
            let extraction = extract_pairs(&messages);
            let replies = roles.chars().filter(|c| *c == 'a').count();

            prop_assert!(extraction.pairs.len() <= replies);
            prop_assert_eq!(extraction.pairs.len() + extraction.orphaned_replies.len(), replies);
            if extraction.orphaned_replies.is_empty() {
                prop_assert_eq!(extraction.pairs.len(), replies);
            }
            for window in extraction.pairs.windows(2) {
                prop_assert!(window[0].reply.position < window[1].query.position);
                prop_assert_eq!(window[0].index + 1, window[1].index);
            }
        }
    }
}
