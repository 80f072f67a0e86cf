use crate::providers::base::{
    ChatRequest, LLMProvider, LLMResponse, Message, Role, ToolCallRequest,
};
use crate::providers::errors::ProviderErrorHandler;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Any endpoint speaking the OpenAI `/chat/completions` protocol.
pub struct OpenAIProvider {
    api_key: String,
    default_model: String,
    url: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(
        api_key: impl Into<String>,
        default_model: impl Into<String>,
        api_base: &str,
        request_timeout: Duration,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            default_model: default_model.into(),
            url: format!("{}/chat/completions", api_base.trim_end_matches('/')),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
                .timeout(request_timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn encode_message(msg: Message) -> Value {
        let mut m = json!({
            "role": msg.role.as_str(),
            "content": msg.content,
        });

        if let Some(tool_calls) = msg.tool_calls {
            m["tool_calls"] = json!(
                tool_calls
                    .into_iter()
                    .map(|tc| {
                        let args_str = serde_json::to_string(&tc.arguments)
                            .unwrap_or_else(|_| "{}".to_string());
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": args_str
                            }
                        })
                    })
                    .collect::<Vec<_>>()
            );
        }

        if let Some(tool_call_id) = msg.tool_call_id {
            m["tool_call_id"] = json!(tool_call_id);
        }
        m
    }

    /// Tool results must follow the assistant message that issued their call; a
    /// windowed history can start past that call, so such results are left out.
    fn drop_orphaned_tool_results(messages: Vec<Message>) -> Vec<Message> {
        let mut issued: HashSet<String> = HashSet::new();
        let mut kept = Vec::with_capacity(messages.len());
        for msg in messages {
            if let Some(calls) = &msg.tool_calls {
                issued.extend(calls.iter().map(|tc| tc.id.clone()));
            }
            if msg.role == Role::Tool
                && !msg.tool_call_id.as_ref().is_some_and(|id| issued.contains(id))
            {
                debug!("omitting tool result without a preceding call: {:?}", msg.tool_call_id);
                continue;
            }
            kept.push(msg);
        }
        kept
    }

    fn build_payload(&self, req: ChatRequest<'_>) -> Value {
        let messages: Vec<Value> = Self::drop_orphaned_tool_results(req.messages)
            .into_iter()
            .map(Self::encode_message)
            .collect();
        let mut payload = json!({
            "model": req.model.unwrap_or(&self.default_model),
            "messages": messages,
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
        });

        // An empty tool set means "answer in text": the field is omitted entirely.
        if let Some(tools) = req.tools.filter(|t| !t.is_empty()) {
            payload["tools"] = json!(
                tools
                    .into_iter()
                    .map(|t| json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters
                        }
                    }))
                    .collect::<Vec<_>>()
            );
            if let Some(ref choice) = req.tool_choice {
                payload["tool_choice"] = json!(choice);
            }
        }
        payload
    }

    fn parse_response(json: &Value) -> Result<LLMResponse> {
        let choice = json["choices"]
            .as_array()
            .and_then(|arr| arr.first())
            .context("No choices in completion response")?;

        let message = &choice["message"];
        let content = message["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(std::string::ToString::to_string);

        let mut tool_calls = Vec::new();
        if let Some(tool_calls_array) = message["tool_calls"].as_array() {
            for tc in tool_calls_array {
                if let Some(function) = tc["function"].as_object() {
                    let arguments = match &function["arguments"] {
                        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| {
                            tracing::warn!("tool call arguments are not valid JSON: {}", s);
                            json!({})
                        }),
                        Value::Object(_) => function["arguments"].clone(),
                        _ => json!({}),
                    };

                    tool_calls.push(ToolCallRequest {
                        id: tc["id"].as_str().unwrap_or("").to_string(),
                        name: function["name"].as_str().unwrap_or("").to_string(),
                        arguments,
                    });
                }
            }
        }

        Ok(LLMResponse {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> Result<LLMResponse> {
        let payload = self.build_payload(req);

        let mut request = self.client.post(&self.url).json(&payload);
        if !self.api_key.is_empty() {
            request = request.header("Authorization", format!("Bearer {}", self.api_key));
        }
        let resp = request
            .send()
            .await
            .context("Failed to send request to completion API")?;

        let resp = ProviderErrorHandler::check_http_status(resp, "openai").await?;
        let json: Value = resp
            .json()
            .await
            .context("Failed to parse completion API response")?;

        if let Some(error_val) = json.get("error") {
            let body = json!({ "error": error_val }).to_string();
            return Err(ProviderErrorHandler::classify(200, None, &body).into());
        }

        Self::parse_response(&json)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}
