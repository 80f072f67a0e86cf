use super::TaskDispatcher;
use crate::auth::{AuthDecision, AuthorizationGate, CallerIdentity};
use crate::ipc::{IpcResult, TaskRequest};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const UNCONFIGURED_MESSAGE: &str = "channel delivery is not configured";

/// Outbound side of a messaging channel.
///
/// `Ok` carries the success message and `Err` the failure; either text is
/// relayed to the agent verbatim.
#[async_trait]
pub trait ChannelClient: Send + Sync {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<String>;
}

/// Posts `{"channelId", "text"}` as JSON to a single webhook endpoint.
pub struct WebhookChannelClient {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannelClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ChannelClient for WebhookChannelClient {
    async fn send_text(&self, channel_id: &str, text: &str) -> Result<String> {
        let resp = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "channelId": channel_id, "text": text }))
            .send()
            .await
            .context("Channel webhook unreachable")?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("Channel delivery failed ({}): {}", status.as_u16(), body.trim());
        }

        // Endpoints may answer with {"message": "..."}; anything else is ignored.
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("Message sent to {}", channel_id));
        Ok(message)
    }
}

/// Stand-in used when no delivery endpoint is configured.
pub struct UnconfiguredChannelClient;

#[async_trait]
impl ChannelClient for UnconfiguredChannelClient {
    async fn send_text(&self, _channel_id: &str, _text: &str) -> Result<String> {
        anyhow::bail!(UNCONFIGURED_MESSAGE)
    }
}

async fn deliver(
    gate: &AuthorizationGate,
    client: &dyn ChannelClient,
    caller: &CallerIdentity,
    target: &str,
    text: &str,
) -> IpcResult {
    if let AuthDecision::Deny(reason) = gate.authorize_caller(caller, target) {
        return IpcResult::failure(reason);
    }
    debug!("delivering {} chars to {} for {}", text.len(), target, caller.group);
    match client.send_text(target, text).await {
        Ok(message) => IpcResult::ok(message),
        Err(e) => IpcResult::failure(e.to_string()),
    }
}

/// `channel_*` requests. These are round-trip calls and always expect a reply.
pub struct ChannelDispatcher {
    gate: AuthorizationGate,
    client: Arc<dyn ChannelClient>,
}

impl ChannelDispatcher {
    pub fn new(gate: AuthorizationGate, client: Arc<dyn ChannelClient>) -> Self {
        Self { gate, client }
    }
}

#[async_trait]
impl TaskDispatcher for ChannelDispatcher {
    fn name(&self) -> &'static str {
        "channel"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind.starts_with("channel_")
    }

    fn requires_reply(&self, _kind: &str) -> bool {
        true
    }

    async fn execute(&self, request: &TaskRequest, caller: &CallerIdentity) -> IpcResult {
        match request.kind.as_str() {
            "channel_send" => {
                let (Some(channel_id), Some(text)) =
                    (request.str_field("channelId"), request.str_field("text"))
                else {
                    return IpcResult::failure("Missing channelId or text");
                };
                deliver(&self.gate, self.client.as_ref(), caller, channel_id, text).await
            }
            other => IpcResult::failure(format!("Unknown channel request type: {}", other)),
        }
    }
}

/// Plain `message` requests from the agent's `send_message` tool.
pub struct MessageDispatcher {
    gate: AuthorizationGate,
    client: Arc<dyn ChannelClient>,
}

impl MessageDispatcher {
    pub fn new(gate: AuthorizationGate, client: Arc<dyn ChannelClient>) -> Self {
        Self { gate, client }
    }
}

#[async_trait]
impl TaskDispatcher for MessageDispatcher {
    fn name(&self) -> &'static str {
        "message"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind == "message"
    }

    async fn execute(&self, request: &TaskRequest, caller: &CallerIdentity) -> IpcResult {
        let target = request
            .str_field("chatJid")
            .or_else(|| request.str_field("channelId"));
        let (Some(target), Some(text)) = (target, request.str_field("text")) else {
            return IpcResult::failure("Missing chatJid or text");
        };
        deliver(&self.gate, self.client.as_ref(), caller, target, text).await
    }
}
