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

//! Conversation payload parsing

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use tracing::warn;
use turnscore_core::{Diagnostic, DiagnosticKind, EvalError, Message, Result, Role};

const TEXT_FIELDS: &[&str] = &["message", "text", "content"];
const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "created_at"];
const TOKEN_FIELDS: &[&str] = &["token_count", "tokens"];
const LATENCY_FIELDS: &[&str] = &["latency_seconds", "response_time", "response_time_seconds"];

/// Messages read from a conversation payload
#[derive(Debug, Clone, Default)]
pub struct ParsedConversation {
    pub messages: Vec<Message>,
    pub diagnostics: Vec<Diagnostic>,
}

/// How a raw role string is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Speaker(Role),
    /// System or tool turns; not part of any pair
    Ignored,
    Unknown,
}

pub fn classify_role(raw: &str) -> RoleKind {
    let role = raw.trim().to_lowercase();
    if role.contains("user") || role == "human" {
        RoleKind::Speaker(Role::User)
    } else if role.contains("assistant")
        || role.contains("chatbot")
        || matches!(role.as_str(), "ai" | "bot" | "model")
    {
        RoleKind::Speaker(Role::Assistant)
    } else if matches!(role.as_str(), "system" | "tool" | "function" | "developer") {
        RoleKind::Ignored
    } else {
        RoleKind::Unknown
    }
}

/// Parse a conversation payload
///
/// Accepts `{conversation_turns: [...]}`, `{turns: [...]}`,
/// `{messages: [...]}` or a bare array. Unreadable records are skipped
/// with a diagnostic; the call fails only when the payload is not a
/// conversation or no record at all could be read.
pub fn parse_conversation(payload: &Value) -> Result<ParsedConversation> {
    let records = locate_turns(payload).ok_or_else(|| {
        EvalError::malformed(
            "conversation",
            "expected an array of turns or an object with `conversation_turns`, `turns` or `messages`",
        )
    })?;

    let mut parsed = ParsedConversation::default();
    let mut ignored = 0usize;

    for (position, raw) in records.iter().enumerate() {
        let Some(map) = raw.as_object() else {
            skip(&mut parsed.diagnostics, position, "conversation turn is not an object");
            continue;
        };

        let role = match map.get("role").and_then(Value::as_str).map(classify_role) {
            Some(RoleKind::Speaker(role)) => role,
            Some(RoleKind::Ignored) => {
                ignored += 1;
                continue;
            }
            Some(RoleKind::Unknown) => {
                let raw_role = map.get("role").and_then(Value::as_str).unwrap_or_default();
                skip(
                    &mut parsed.diagnostics,
                    position,
                    &format!("unrecognized role '{}'", raw_role),
                );
                continue;
            }
            None => {
                skip(&mut parsed.diagnostics, position, "conversation turn has no role");
                continue;
            }
        };

        let Some(text) = TEXT_FIELDS
            .iter()
            .find_map(|f| map.get(*f).and_then(Value::as_str))
        else {
            skip(&mut parsed.diagnostics, position, "conversation turn has no text");
            continue;
        };

        let mut message = Message::new(role, text.trim(), position);
        message.timestamp = TIMESTAMP_FIELDS
            .iter()
            .find_map(|f| map.get(*f).and_then(parse_timestamp));
        message.token_count = TOKEN_FIELDS
            .iter()
            .find_map(|f| map.get(*f).and_then(Value::as_u64))
            .map(|n| n as usize);
        message.latency_seconds = LATENCY_FIELDS
            .iter()
            .find_map(|f| map.get(*f).and_then(Value::as_f64))
            .filter(|s| s.is_finite() && *s >= 0.0);
        message.turn_id = turn_id(map);

        parsed.messages.push(message);
    }

    if parsed.messages.is_empty() && !records.is_empty() && ignored < records.len() {
        return Err(EvalError::malformed(
            "conversation",
            format!("none of the {} turns could be read", records.len() - ignored),
        ));
    }

    Ok(parsed)
}

fn skip(diagnostics: &mut Vec<Diagnostic>, position: usize, reason: &str) {
    warn!(position, "Skipping conversation turn: {}", reason);
    diagnostics.push(
        Diagnostic::new(DiagnosticKind::MalformedMessage, reason).at_position(position),
    );
}

fn locate_turns(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => ["conversation_turns", "turns", "messages"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_array)),
        _ => None,
    }
}

fn turn_id(map: &Map<String, Value>) -> Option<String> {
    ["turn", "id"].iter().find_map(|f| match map.get(*f) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// RFC 3339 strings, `YYYY-MM-DD HH:MM:SS` (read as UTC), or epoch seconds/milliseconds
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => {
            let raw = n.as_f64()?;
            if !raw.is_finite() || raw < 0.0 {
                return None;
            }
            let millis = if raw > 1e12 { raw } else { raw * 1000.0 };
            Utc.timestamp_millis_opt(millis.round() as i64).single()
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_turns_layout() {
        let payload = json!({
            "chat_id": 7,
            "conversation_turns": [
                {"turn": 1, "role": "User", "message": "What is the capital of France?", "created_at": "2024-06-01T10:00:00Z"},
                {"turn": 2, "role": "AI/Chatbot", "message": "Paris.", "created_at": "2024-06-01T10:00:02Z", "tokens": 3}
            ]
        });
        let parsed = parse_conversation(&payload).unwrap();
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[0].role, Role::User);
        assert_eq!(parsed.messages[1].role, Role::Assistant);
        assert_eq!(parsed.messages[1].token_count, Some(3));
        assert_eq!(parsed.messages[1].turn_id.as_deref(), Some("2"));
        assert!(parsed.messages[0].timestamp.is_some());
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn test_role_classification() {
        assert_eq!(classify_role("user"), RoleKind::Speaker(Role::User));
        assert_eq!(classify_role("Human"), RoleKind::Speaker(Role::User));
        assert_eq!(classify_role("assistant"), RoleKind::Speaker(Role::Assistant));
        assert_eq!(classify_role("AI"), RoleKind::Speaker(Role::Assistant));
        assert_eq!(classify_role("system"), RoleKind::Ignored);
        assert_eq!(classify_role("narrator"), RoleKind::Unknown);
    }

    #[test]
    fn test_bad_turns_are_skipped() {
        let payload = json!([
            {"role": "user", "text": "hi"},
            {"role": "narrator", "text": "meanwhile"},
            {"role": "assistant"},
            "oops",
            {"role": "system", "content": "be nice"},
            {"role": "assistant", "content": "hello"}
        ]);
        let parsed = parse_conversation(&payload).unwrap();
        assert_eq!(parsed.messages.len(), 2);
        assert_eq!(parsed.messages[1].position, 5);
        let positions: Vec<_> = parsed.diagnostics.iter().map(|d| d.position).collect();
        assert_eq!(positions, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_all_turns_malformed_is_fatal() {
        let err = parse_conversation(&json!([{"role": "narrator", "text": "x"}, 5])).unwrap_err();
        assert!(matches!(err, EvalError::MalformedInput { .. }));
    }

    #[test]
    fn test_not_a_conversation_is_fatal() {
        assert!(parse_conversation(&json!({"foo": []})).is_err());
        assert!(parse_conversation(&json!("hello")).is_err());
    }

    #[test]
    fn test_empty_conversation_is_valid() {
        let parsed = parse_conversation(&json!({"turns": []})).unwrap();
        assert!(parsed.messages.is_empty());
    }

    #[test]
    fn test_timestamp_formats() {
        let a = parse_timestamp(&json!("2024-06-01T10:00:00Z")).unwrap();
        let b = parse_timestamp(&json!("2024-06-01 10:00:00")).unwrap();
        let c = parse_timestamp(&json!(1717236000)).unwrap();
        let d = parse_timestamp(&json!(1717236000000u64)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a, d);
        assert!(parse_timestamp(&json!("yesterday")).is_none());
    }
}
