// Shared test helpers; not all items used by every test binary.
#![allow(unused)]

use async_trait::async_trait;
use hostbridge::agent::tools::{ExecutionContext, standard_registry};
use hostbridge::agent::{AgentLoop, AgentLoopConfig};
use hostbridge::ipc::Mailbox;
use hostbridge::providers::base::{
    ChatRequest, LLMProvider, LLMResponse, Message, RetryConfig, ToolCallRequest, ToolDefinition,
};
use hostbridge::registry::{ResourceMapping, ResourceRegistry};
use hostbridge::session::SessionManager;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl RecordedCall {
    pub fn tool_names(&self) -> Vec<String> {
        self.tools
            .iter()
            .flatten()
            .map(|t| t.name.clone())
            .collect()
    }
}

/// Replays scripted responses, then `default_response` forever.
pub struct MockLLMProvider {
    responses: Mutex<VecDeque<LLMResponse>>,
    pub calls: Arc<Mutex<Vec<RecordedCall>>>,
    pub default_response: LLMResponse,
}

impl MockLLMProvider {
    pub fn with_responses(responses: Vec<LLMResponse>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
            calls: Arc::new(Mutex::new(Vec::new())),
            default_response: text_response("Mock response"),
        }
    }

    /// Every call returns `response` unless the request offers no tools.
    pub fn repeating(response: LLMResponse) -> Self {
        let mut mock = Self::with_responses(Vec::new());
        mock.default_response = response;
        mock
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn chat(&self, req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        let text_only = req.tools.as_ref().is_some_and(Vec::is_empty);
        self.calls.lock().unwrap().push(RecordedCall {
            messages: req.messages,
            tools: req.tools,
        });
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return Ok(response);
        }
        if text_only {
            return Ok(text_response("Forced answer"));
        }
        Ok(self.default_response.clone())
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }
}

/// Always fails with the given message.
pub struct FailingMockProvider {
    pub message: String,
}

#[async_trait]
impl LLMProvider for FailingMockProvider {
    async fn chat(&self, _req: ChatRequest<'_>) -> anyhow::Result<LLMResponse> {
        Err(anyhow::anyhow!("{}", self.message))
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }
}

// --- Response builders ---

pub fn text_response(content: &str) -> LLMResponse {
    LLMResponse::text(content)
}

pub fn tool_response(calls: Vec<ToolCallRequest>) -> LLMResponse {
    LLMResponse {
        content: None,
        tool_calls: calls,
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest {
        id: id.to_string(),
        name: name.to_string(),
        arguments,
    }
}

// --- Fixtures ---

/// `chat-main` owned by the privileged `main` group, `chat-fam` by `family`.
pub fn standard_registry_mappings() -> Arc<ResourceRegistry> {
    Arc::new(ResourceRegistry::from_mappings(vec![
        ResourceMapping {
            external_id: "chat-main".into(),
            owner_group: "main".into(),
            is_privileged: true,
        },
        ResourceMapping {
            external_id: "chat-fam".into(),
            owner_group: "family".into(),
            is_privileged: false,
        },
    ]))
}

pub fn agent_context(tmp: &TempDir, group: &str, privileged: bool, chat: &str) -> ExecutionContext {
    ExecutionContext::new(Mailbox::new(tmp.path()), group, privileged)
        .with_chat_jid(Some(chat.to_string()))
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(10))
}

pub fn create_test_agent(provider: impl LLMProvider + 'static, tmp: &TempDir) -> AgentLoop {
    let config = AgentLoopConfig {
        retry: RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        },
        ..AgentLoopConfig::default()
    };
    AgentLoop::new(
        Arc::new(provider),
        Arc::new(SessionManager::new(tmp.path().join("sessions"))),
        Arc::new(standard_registry()),
        config,
    )
}
