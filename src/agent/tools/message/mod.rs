use crate::agent::tools::base::{ExecutionContext, Fulfillment, optional_str, required_str};
use crate::agent::tools::{Tool, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

pub const OWN_CHAT_ONLY: &str = "You can only send messages to your own chat";

/// Queue a chat message for the host to deliver.
pub struct SendMessageTool;

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to the current chat right away, while you keep working. The main group may target another chat with 'chat_jid'."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "The message text to send"
                },
                "chat_jid": {
                    "type": "string",
                    "description": "Optional: target chat (main group only)"
                }
            },
            "required": ["text"]
        })
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::FireAndForget
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let text = match required_str(&params, "text") {
            Ok(t) => t,
            Err(e) => return Ok(e),
        };
        let own_chat = ctx.chat_jid.as_deref();
        let Some(target) = optional_str(&params, "chat_jid").or(own_chat) else {
            return Ok(ToolResult::error("No chat to send to: pass 'chat_jid'"));
        };
        if !ctx.is_privileged && Some(target) != own_chat {
            return Ok(ToolResult::error(OWN_CHAT_ONLY));
        }

        let mut fields = Map::new();
        fields.insert("chatJid".into(), Value::String(target.to_string()));
        fields.insert("text".into(), Value::String(text.to_string()));
        ctx.submit("message", fields).await?;
        Ok(ToolResult::new("Message queued for delivery."))
    }
}

/// Post to an external channel and wait for the host's delivery report.
pub struct ChannelSendTool;

#[async_trait]
impl Tool for ChannelSendTool {
    fn name(&self) -> &str {
        "channel_send"
    }

    fn description(&self) -> &str {
        "Post text to an external channel owned by this group and report whether delivery succeeded."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "channel_id": {
                    "type": "string",
                    "description": "External channel identifier"
                },
                "text": {
                    "type": "string",
                    "description": "Text to post"
                }
            },
            "required": ["channel_id", "text"]
        })
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::RoundTrip
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let (channel_id, text) =
            match (required_str(&params, "channel_id"), required_str(&params, "text")) {
                (Ok(c), Ok(t)) => (c, t),
                (Err(e), _) | (_, Err(e)) => return Ok(e),
            };
        let mut fields = Map::new();
        fields.insert("channelId".into(), Value::String(channel_id.to_string()));
        fields.insert("text".into(), Value::String(text.to_string()));
        Ok(ctx.call("channel_send", fields).await?.into())
    }
}
