use crate::providers::base::ToolCallRequest;
use serde_json::{Map, Value};
use tracing::warn;

/// Calls allowed per tool name in one invocation.
const DEFAULT_TOOL_CALL_CAP: usize = 3;
const SEND_MESSAGE_CALL_CAP: usize = 2;

pub(super) fn tool_call_cap(name: &str) -> usize {
    if name == "send_message" {
        SEND_MESSAGE_CALL_CAP
    } else {
        DEFAULT_TOOL_CALL_CAP
    }
}

/// Tool arguments as a JSON object. Unparseable or non-object input becomes `{}`.
pub(super) fn normalize_arguments(call: &ToolCallRequest) -> Value {
    match &call.arguments {
        Value::Object(_) => call.arguments.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(v @ Value::Object(_)) => v,
            _ => {
                warn!("invalid arguments for tool {}, using empty object: {}", call.name, raw);
                Value::Object(Map::new())
            }
        },
        Value::Null => Value::Object(Map::new()),
        other => {
            warn!("non-object arguments for tool {}: {}", call.name, other);
            Value::Object(Map::new())
        }
    }
}

/// Error text plus a short remediation hint when the cause is recognizable.
pub(super) fn describe_failure(err: &anyhow::Error) -> String {
    let message = format!("{:#}", err);
    match failure_hint(&message) {
        Some(hint) => format!("{} ({})", message, hint),
        None => message,
    }
}

fn failure_hint(message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    if lower.contains("rate limit") || lower.contains("429") {
        Some("rate limited: wait a moment and try again")
    } else if lower.contains("authentication")
        || lower.contains("401")
        || lower.contains("unauthorized")
    {
        Some("authentication failed: check provider.apiKey")
    } else if lower.contains("timed out") || lower.contains("timeout") {
        Some("the completion API timed out")
    } else if lower.contains("failed to send request")
        || lower.contains("connection refused")
        || lower.contains("dns error")
    {
        Some("completion API unreachable: check provider.apiBase and the network")
    } else {
        None
    }
}
