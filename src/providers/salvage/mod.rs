//! Recovery of usable output from `tool_use_failed` error bodies.
//!
//! Some OpenAI-compatible hosts reject a completion when the model emits a tool
//! call in its native markup instead of the JSON the API expects, and echo the raw
//! generation back as `error.failed_generation`. This module pattern-matches that
//! text. It is a best-effort compatibility shim: the formats are whatever the
//! models happen to produce, not a documented contract.

use crate::providers::base::ToolCallRequest;
use crate::utils::random_suffix;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum Salvaged {
    ToolCall(ToolCallRequest),
    Text(String),
}

/// `<function=NAME>{...}</function>`, `<function=NAME{...}</function>`,
/// `<function=NAME,{...}>` and unterminated variants.
fn function_tag_re() -> &'static Regex {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)<function\s*=\s*([A-Za-z0-9_\-]+)\s*[>,(]?\s*(\{.*\})?")
            .expect("failed to compile function tag regex")
    });
    &RE
}

/// Recover a single tool call, or failing that plain text, from a raw error body.
///
/// Returns `None` when the body carries no `failed_generation`, or when it names a
/// function whose arguments cannot be parsed.
pub fn salvage_failed_generation(raw_body: &str) -> Option<Salvaged> {
    let generation = extract_failed_generation(raw_body)?;
    let generation = generation.trim();
    if generation.is_empty() {
        return None;
    }

    if let Some(cap) = function_tag_re().captures(generation) {
        let name = cap.get(1)?.as_str().to_string();
        let arguments = match cap.get(2) {
            Some(args) => match serde_json::from_str::<Value>(args.as_str()) {
                Ok(v) if v.is_object() => v,
                _ => {
                    warn!("failed_generation names {} but its arguments do not parse", name);
                    return None;
                }
            },
            None => Value::Object(Map::new()),
        };
        debug!("salvaged tool call {} from failed generation", name);
        return Some(Salvaged::ToolCall(tool_call(name, arguments)));
    }

    if generation.starts_with('{') || generation.starts_with('[') {
        if let Some(call) = parse_json_call(generation) {
            return Some(Salvaged::ToolCall(call));
        }
        return None;
    }

    Some(Salvaged::Text(generation.to_string()))
}

fn extract_failed_generation(raw_body: &str) -> Option<String> {
    let json: Value = serde_json::from_str(raw_body).ok()?;
    let err = json.get("error").unwrap_or(&json);
    match err.get("failed_generation")? {
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// `{"name": ..., "arguments"|"parameters": {...}}`, or the first such entry of an array.
fn parse_json_call(text: &str) -> Option<ToolCallRequest> {
    let value: Value = serde_json::from_str(text).ok()?;
    let obj = match &value {
        Value::Array(items) => items.first()?,
        other => other,
    };
    let name = obj.get("name")?.as_str().filter(|n| !n.is_empty())?;
    let arguments = match obj.get("arguments").or_else(|| obj.get("parameters")) {
        Some(Value::String(s)) => serde_json::from_str(s).ok()?,
        Some(v @ Value::Object(_)) => v.clone(),
        Some(_) => return None,
        None => Value::Object(Map::new()),
    };
    Some(tool_call(name.to_string(), arguments))
}

fn tool_call(name: String, arguments: Value) -> ToolCallRequest {
    ToolCallRequest {
        id: format!("salvaged_{}", random_suffix(8)),
        name,
        arguments,
    }
}
