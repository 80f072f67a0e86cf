use crate::errors::HostbridgeError;
use serde_json::Value;
use tracing::{error, warn};

/// Error code the upstream uses when it cannot parse the model's own tool call.
pub const TOOL_USE_FAILED: &str = "tool_use_failed";

/// Maps non-success HTTP responses from OpenAI-compatible endpoints to typed errors.
pub struct ProviderErrorHandler;

impl ProviderErrorHandler {
    /// Classify a failed response from its status, `retry-after` header and body.
    pub fn classify(status: u16, retry_after: Option<u64>, body: &str) -> HostbridgeError {
        match status {
            429 | 413 => {
                match retry_after {
                    Some(seconds) => {
                        warn!("Rate limit hit ({}). Retry after {} seconds", status, seconds);
                    }
                    None => warn!("Rate limit hit (status: {})", status),
                }
                HostbridgeError::RateLimit {
                    status,
                    retry_after,
                }
            }
            401 | 403 => {
                warn!("Authentication error (status: {}): {}", status, body);
                HostbridgeError::Auth(format!(
                    "Authentication failed. Please check your API key. Error: {}",
                    body
                ))
            }
            _ if is_tool_use_failure(body) => HostbridgeError::MalformedToolCall {
                body: body.to_string(),
            },
            _ => Self::parse_api_error(status, body),
        }
    }

    /// Provider error with the upstream's own message when the body is JSON.
    pub fn parse_api_error(status: u16, body: &str) -> HostbridgeError {
        if let Ok(json) = serde_json::from_str::<Value>(body)
            && let Some(err) = json.get("error")
        {
            let error_type = err
                .get("type")
                .or_else(|| err.get("code"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let error_msg = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown error");
            return HostbridgeError::Provider(format!(
                "API error ({}): {}",
                error_type, error_msg
            ));
        }
        HostbridgeError::Provider(format!("API error ({}): {}", status, body))
    }

    /// Return the response unchanged on success; otherwise consume the body and
    /// return a typed error.
    pub async fn check_http_status(
        resp: reqwest::Response,
        provider: &str,
    ) -> Result<reqwest::Response, anyhow::Error> {
        if resp.status().is_success() {
            return Ok(resp);
        }

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        let body = resp
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());

        let err = Self::classify(status, retry_after, &body);
        error!("{} provider error during chat: {}", provider, err);
        Err(err.into())
    }
}

/// `{"error": {"code": "tool_use_failed", "failed_generation": ...}}` in any of the
/// shapes seen from OpenAI-compatible hosts.
fn is_tool_use_failure(body: &str) -> bool {
    let Ok(json) = serde_json::from_str::<Value>(body) else {
        return body.contains(TOOL_USE_FAILED);
    };
    let err = json.get("error").unwrap_or(&json);
    let code_matches = ["code", "type"]
        .iter()
        .any(|k| err.get(*k).and_then(Value::as_str) == Some(TOOL_USE_FAILED));
    code_matches || err.get("failed_generation").is_some()
}
