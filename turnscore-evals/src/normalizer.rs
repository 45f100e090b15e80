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

//! Evidence normalization
//!
//! Vector-store exports come in several shapes. This module finds the
//! record list, reads each record into an [`EvidenceChunk`] and drops what
//! cannot be used, recording why. Source order is preserved.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;
use turnscore_core::{Diagnostic, DiagnosticKind, EvidenceChunk};

const TEXT_FIELDS: &[&str] = &["text", "snippet", "content", "chunk", "body"];
const SOURCE_FIELDS: &[&str] = &["source_url", "source", "url"];
const VECTOR_FIELDS: &[&str] = &["vector", "embedding"];
const TOKEN_FIELDS: &[&str] = &["tokens_count", "token_count", "tokens"];

/// Normalized evidence and the records that were skipped
#[derive(Debug, Clone, Default)]
pub struct NormalizedEvidence {
    pub chunks: Vec<EvidenceChunk>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Converts heterogeneous evidence payloads into [`EvidenceChunk`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct EvidenceNormalizer;

impl EvidenceNormalizer {
    pub fn normalize(&self, payload: &Value) -> NormalizedEvidence {
        let mut out = NormalizedEvidence::default();

        let records = match payload {
            Value::Null => return out,
            other => match locate_records(other) {
                Some(records) => records,
                None => {
                    record(
                        &mut out.diagnostics,
                        Diagnostic::new(
                            DiagnosticKind::MalformedEvidence,
                            "evidence payload has no recognizable record list",
                        ),
                    );
                    return out;
                }
            },
        };

        let mut seen: HashSet<String> = HashSet::new();
        for (position, raw) in records.iter().enumerate() {
            match read_chunk(raw, position, &mut out.diagnostics) {
                Some(chunk) => {
                    if !seen.insert(chunk.id.clone()) {
                        record(
                            &mut out.diagnostics,
                            Diagnostic::new(
                                DiagnosticKind::DuplicateEvidence,
                                format!("duplicate evidence id '{}'; first occurrence kept", chunk.id),
                            )
                            .at_position(position),
                        );
                        continue;
                    }
                    out.chunks.push(chunk);
                }
                None => continue,
            }
        }

        if let Some(info) = locate_vectors_info(payload) {
            enrich_from_vectors_info(&mut out.chunks, info);
        }

        out
    }
}

/// Normalize an evidence payload with the default normalizer
pub fn normalize_evidence(payload: &Value) -> NormalizedEvidence {
    EvidenceNormalizer.normalize(payload)
}

fn record(diagnostics: &mut Vec<Diagnostic>, diagnostic: Diagnostic) {
    warn!(kind = ?diagnostic.kind, position = ?diagnostic.position, "{}", diagnostic.message);
    diagnostics.push(diagnostic);
}

/// Find the evidence record array in any of the accepted layouts
fn locate_records(payload: &Value) -> Option<&Vec<Value>> {
    match payload {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            if let Some(Value::Object(data)) = map.get("data") {
                if let Some(Value::Array(items)) = data.get("vector_data") {
                    return Some(items);
                }
            }
            if let Some(Value::Array(items)) = map.get("vector_data") {
                return Some(items);
            }
            if let Some(Value::Array(items)) = map.get("data") {
                return Some(items);
            }
            find_nested_vector_data(map)
        }
        _ => None,
    }
}

fn find_nested_vector_data(map: &Map<String, Value>) -> Option<&Vec<Value>> {
    for value in map.values() {
        if let Value::Object(inner) = value {
            if let Some(Value::Array(items)) = inner.get("vector_data") {
                return Some(items);
            }
            if let Some(found) = find_nested_vector_data(inner) {
                return Some(found);
            }
        }
    }
    None
}

fn locate_vectors_info(payload: &Value) -> Option<&Vec<Value>> {
    let map = payload.as_object()?;
    let sources = map
        .get("sources")
        .or_else(|| map.get("data").and_then(|d| d.get("sources")))?;
    sources.get("vectors_info")?.as_array()
}

fn read_chunk(raw: &Value, position: usize, diagnostics: &mut Vec<Diagnostic>) -> Option<EvidenceChunk> {
    let map = match raw {
        Value::Object(map) => map,
        Value::String(text) if !text.trim().is_empty() => {
            return Some(EvidenceChunk::new(format!("chunk-{}", position), text.trim()));
        }
        _ => {
            record(
                diagnostics,
                Diagnostic::new(
                    DiagnosticKind::MalformedEvidence,
                    "evidence record is neither an object nor text",
                )
                .at_position(position),
            );
            return None;
        }
    };

    let id = map
        .get("id")
        .and_then(scalar_string)
        .unwrap_or_else(|| format!("chunk-{}", position));

    let text = match first_text(map, TEXT_FIELDS) {
        Some(text) => text,
        None => {
            record(
                diagnostics,
                Diagnostic::new(
                    DiagnosticKind::MalformedEvidence,
                    format!("evidence record '{}' has no text", id),
                )
                .at_position(position),
            );
            return None;
        }
    };

    let mut chunk = EvidenceChunk::new(id, text);
    if let Some(source) = first_text(map, SOURCE_FIELDS) {
        chunk.source = source;
    }
    chunk.token_count = TOKEN_FIELDS
        .iter()
        .find_map(|f| map.get(*f).and_then(Value::as_u64))
        .map(|n| n as usize);
    chunk.retrieval_score = map.get("score").and_then(Value::as_f64);

    if let Some(raw_vector) = VECTOR_FIELDS.iter().find_map(|f| map.get(*f)) {
        match read_vector(raw_vector) {
            Some(vector) => chunk.vector = Some(vector),
            None => record(
                diagnostics,
                Diagnostic::new(
                    DiagnosticKind::InconsistentVector,
                    format!(
                        "evidence record '{}' has an unreadable vector; it will be embedded from text",
                        chunk.id
                    ),
                )
                .at_position(position),
            ),
        }
    }

    if let Some(Value::Object(metadata)) = map.get("metadata") {
        chunk.metadata = metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>();
    }

    Some(chunk)
}

fn first_text(map: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|f| {
        map.get(*f)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn read_vector(value: &Value) -> Option<Vec<f64>> {
    let items = value.as_array()?;
    let vector: Vec<f64> = items.iter().filter_map(Value::as_f64).collect();
    if vector.is_empty() || vector.len() != items.len() {
        return None;
    }
    Some(vector)
}

fn enrich_from_vectors_info(chunks: &mut [EvidenceChunk], info: &[Value]) {
    for entry in info {
        let id = entry
            .get("vector_id")
            .or_else(|| entry.get("id"))
            .and_then(scalar_string);
        let Some(id) = id else { continue };
        if let Some(chunk) = chunks.iter_mut().find(|c| c.id == id) {
            if chunk.retrieval_score.is_none() {
                chunk.retrieval_score = entry.get("score").and_then(Value::as_f64);
            }
            if chunk.token_count.is_none() {
                chunk.token_count = entry
                    .get("tokens_count")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize);
            }
        }
    }
}
