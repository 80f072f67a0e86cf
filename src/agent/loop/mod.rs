mod helpers;

use crate::agent::tools::{ExecutionContext, ToolRegistry};
use crate::errors::HostbridgeError;
use crate::providers::base::{
    ChatRequest, LLMProvider, LLMResponse, Message, RetryConfig, ToolDefinition,
};
use crate::providers::salvage::{Salvaged, salvage_failed_generation};
use crate::session::{SESSION_WINDOW, SessionStore};
use anyhow::{Context, Result};
use helpers::{describe_failure, normalize_arguments, tool_call_cap};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Reply used when the model ends without any text.
pub const FALLBACK_REPLY: &str =
    "I wasn't able to finish that within my step budget. Please try again with a narrower request.";

/// Synthetic tool result for calls above the per-tool cap.
pub const GUARDRAIL_MESSAGE: &str =
    "Tool call limit reached for this tool. Stop calling tools and answer the user with what you have.";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant for a chat group. \
Use the available tools when an action is needed and answer concisely.";

#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    /// Model override; the provider default is used when `None`.
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system_prompt: String,
    pub max_iterations: usize,
    pub retry: RetryConfig,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            temperature: 0.7,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            retry: RetryConfig::default(),
        }
    }
}

impl AgentLoopConfig {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            model: config.agent.model.clone(),
            max_tokens: config.agent.max_tokens,
            temperature: config.agent.temperature,
            system_prompt: config
                .agent
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model answered without requesting tools.
    Answered,
    /// A tool exceeded its call cap and a text-only answer was forced.
    Guardrail,
    /// The iteration budget ran out and a text-only answer was forced.
    IterationBudget,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentReply {
    pub text: String,
    pub stop_reason: StopReason,
    /// Completion rounds that offered tools.
    pub iterations: usize,
    /// Tools that were actually executed, in call order.
    pub tools_used: Vec<String>,
}

/// What the CLI prints for one invocation.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AgentOutput {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentOutput {
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            status: "success".into(),
            result: Some(result.into()),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: "error".into(),
            result: None,
            error: Some(error.into()),
        }
    }
}

pub struct AgentLoop {
    provider: Arc<dyn LLMProvider>,
    sessions: Arc<dyn SessionStore>,
    tools: Arc<ToolRegistry>,
    config: AgentLoopConfig,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        sessions: Arc<dyn SessionStore>,
        tools: Arc<ToolRegistry>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            provider,
            sessions,
            tools,
            config,
        }
    }

    fn model(&self) -> &str {
        self.config
            .model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }

    /// Run one invocation and fold any terminal error into an `AgentOutput`.
    pub async fn process(
        &self,
        ctx: &ExecutionContext,
        session_id: &str,
        user_message: &str,
    ) -> AgentOutput {
        match self.run(ctx, session_id, user_message).await {
            Ok(reply) => AgentOutput::success(reply.text),
            Err(e) => {
                error!("agent invocation for group {} failed: {:#}", ctx.group, e);
                AgentOutput::failure(describe_failure(&e))
            }
        }
    }

    /// Generate, execute tools, repeat, until the model answers or a limit is hit.
    ///
    /// The session is written back only when the invocation completes.
    pub async fn run(
        &self,
        ctx: &ExecutionContext,
        session_id: &str,
        user_message: &str,
    ) -> Result<AgentReply> {
        tokio::fs::create_dir_all(&ctx.group_dir)
            .await
            .with_context(|| format!("Failed to create {}", ctx.group_dir.display()))?;
        let mut session = self.sessions.get_or_create(&ctx.group, session_id).await?;

        let history = session.history(SESSION_WINDOW);
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.config.system_prompt.clone()));
        messages.extend_from_slice(history);
        let turn_start = messages.len();
        messages.push(Message::user(user_message));
        debug!(
            "agent start group={} session={} history={}",
            ctx.group,
            session_id,
            history.len()
        );

        let tool_defs = self.tools.get_tool_definitions(ctx.is_privileged);
        let mut call_counts: HashMap<String, usize> = HashMap::new();
        let mut tools_used = Vec::new();
        let mut stop_reason = StopReason::IterationBudget;
        let mut iterations = 0;
        let mut answer = None;

        while iterations < self.config.max_iterations {
            iterations += 1;
            let response = self.complete(&messages, tool_defs.clone()).await?;

            if !response.has_tool_calls() {
                let text = response
                    .content
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| FALLBACK_REPLY.to_string());
                messages.push(Message::assistant(Some(text.clone()), None));
                stop_reason = StopReason::Answered;
                answer = Some(text);
                break;
            }

            let turn = Message::assistant(
                response.content.clone(),
                Some(response.tool_calls.clone()),
            );
            if !turn.text().is_empty() {
                debug!("assistant text alongside tool calls: {}", turn.text());
            }
            messages.push(turn);

            let mut tripped = false;
            for call in &response.tool_calls {
                let count = call_counts.entry(call.name.clone()).or_default();
                *count += 1;
                if *count > tool_call_cap(&call.name) {
                    warn!(
                        "tool {} called {} times in group {}, forcing a final answer",
                        call.name, count, ctx.group
                    );
                    tripped = true;
                    messages.push(Message::tool_result(&call.id, GUARDRAIL_MESSAGE));
                    continue;
                }
                let params = normalize_arguments(call);
                let result = self.tools.execute(&call.name, params, ctx).await;
                tools_used.push(call.name.clone());
                messages.push(Message::tool_result(&call.id, result.content));
            }

            if tripped {
                stop_reason = StopReason::Guardrail;
                break;
            }
        }

        let text = match answer {
            Some(text) => text,
            None => {
                if stop_reason == StopReason::IterationBudget {
                    info!(
                        "group {} used all {} iterations, forcing a final answer",
                        ctx.group, self.config.max_iterations
                    );
                }
                let text = self.final_answer(&messages).await;
                messages.push(Message::assistant(Some(text.clone()), None));
                text
            }
        };

        for message in messages.drain(turn_start..) {
            session.push(message);
        }
        self.sessions.save(&session).await?;

        Ok(AgentReply {
            text,
            stop_reason,
            iterations,
            tools_used,
        })
    }

    /// One completion call, salvaging a malformed tool call when the error body allows it.
    async fn complete(
        &self,
        messages: &[Message],
        tools: Vec<ToolDefinition>,
    ) -> Result<LLMResponse> {
        let request = ChatRequest {
            messages: messages.to_vec(),
            tools: Some(tools),
            model: Some(self.model()),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tool_choice: None,
        };
        let err = match self
            .provider
            .chat_with_retry(request, Some(self.config.retry.clone()))
            .await
        {
            Ok(response) => return Ok(response),
            Err(e) => e,
        };

        let salvaged = match err.downcast_ref::<HostbridgeError>() {
            Some(HostbridgeError::MalformedToolCall { body }) => salvage_failed_generation(body),
            _ => None,
        };
        match salvaged {
            Some(Salvaged::ToolCall(call)) => {
                info!("recovered tool call {} from a rejected generation", call.name);
                Ok(LLMResponse {
                    content: None,
                    tool_calls: vec![call],
                })
            }
            Some(Salvaged::Text(text)) => Ok(LLMResponse::text(text)),
            None => Err(err),
        }
    }

    /// Text-only completion after a guardrail trip or an exhausted budget.
    async fn final_answer(&self, messages: &[Message]) -> String {
        match self.complete(messages, Vec::new()).await {
            Ok(response) => response
                .content
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_REPLY.to_string()),
            Err(e) => {
                warn!("forced final completion failed: {:#}", e);
                FALLBACK_REPLY.to_string()
            }
        }
    }
}
