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

//! Conversation messages and query/reply pairs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Speaker of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Token count supplied with the input, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<usize>,
    /// Reply latency supplied with the input, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_seconds: Option<f64>,
    /// Turn identifier supplied with the input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
    /// Position in the original conversation record sequence
    pub position: usize,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>, position: usize) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: None,
            token_count: None,
            latency_seconds: None,
            turn_id: None,
            position,
        }
    }

    pub fn user(text: impl Into<String>, position: usize) -> Self {
        Self::new(Role::User, text, position)
    }

    pub fn assistant(text: impl Into<String>, position: usize) -> Self {
        Self::new(Role::Assistant, text, position)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_token_count(mut self, tokens: usize) -> Self {
        self.token_count = Some(tokens);
        self
    }

    pub fn with_latency(mut self, seconds: f64) -> Self {
        self.latency_seconds = Some(seconds);
        self
    }
}

/// A user query and the assistant reply that answered it
///
/// `index` is 1-based and strictly increasing in conversation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pair {
    pub index: usize,
    pub query: Message,
    pub reply: Message,
}

impl Pair {
    /// Reply latency: the explicit value if present, otherwise the timestamp gap
    pub fn latency_seconds(&self) -> Option<f64> {
        if let Some(explicit) = self.reply.latency_seconds {
            if explicit.is_finite() && explicit >= 0.0 {
                return Some(explicit);
            }
        }
        match (self.query.timestamp, self.reply.timestamp) {
            (Some(asked), Some(answered)) if answered >= asked => {
                let millis = (answered - asked).num_milliseconds();
                Some(millis as f64 / 1000.0)
            }
            _ => None,
        }
    }
}
