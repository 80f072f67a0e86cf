use crate::ipc::{self, IpcResult, Mailbox};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Convert a `Result<String>` into a `ToolResult`, formatting errors with
    /// the given prefix.
    pub fn from_result(result: anyhow::Result<String>, error_prefix: &str) -> Self {
        match result {
            Ok(content) => Self::new(content),
            Err(e) => Self::error(format!("{} error: {}", error_prefix, e)),
        }
    }
}

impl From<IpcResult> for ToolResult {
    fn from(result: IpcResult) -> Self {
        if result.success {
            Self::new(result.message)
        } else {
            Self::error(result.message)
        }
    }
}

impl std::fmt::Display for ToolResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.content)
    }
}

/// How a tool's effect is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fulfillment {
    /// Runs inside the sandbox against the group's working directory.
    Local,
    /// Enqueues a request for the host and returns an acknowledgement.
    FireAndForget,
    /// Enqueues a request and blocks until the host's result or a timeout.
    RoundTrip,
}

/// Caller identity and mailbox wiring for one agent invocation.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub group: String,
    pub is_privileged: bool,
    /// The chat this invocation answers, used as the default message target.
    pub chat_jid: Option<String>,
    /// Private working directory for local file tools.
    pub group_dir: PathBuf,
    pub mailbox: Mailbox,
    pub result_timeout: Duration,
    pub poll_interval: Duration,
}

impl ExecutionContext {
    pub fn new(mailbox: Mailbox, group: impl Into<String>, is_privileged: bool) -> Self {
        let group = group.into();
        Self {
            group_dir: mailbox.data_dir().join("groups").join(&group),
            group,
            is_privileged,
            chat_jid: None,
            mailbox,
            result_timeout: Duration::from_secs(30),
            poll_interval: ipc::DEFAULT_POLL_INTERVAL,
        }
    }

    #[must_use]
    pub fn with_chat_jid(mut self, chat_jid: Option<String>) -> Self {
        self.chat_jid = chat_jid;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, result_timeout: Duration, poll_interval: Duration) -> Self {
        self.result_timeout = result_timeout;
        self.poll_interval = poll_interval;
        self
    }

    fn envelope(&self, mut fields: Map<String, Value>) -> Map<String, Value> {
        fields.insert("sourceGroup".into(), Value::String(self.group.clone()));
        fields.insert("isPrivileged".into(), Value::Bool(self.is_privileged));
        fields
    }

    /// Fire-and-forget: publish a request without a correlation id.
    pub async fn submit(&self, kind: &str, fields: Map<String, Value>) -> Result<String> {
        let tasks_dir = self.mailbox.tasks_dir(&self.group);
        ipc::enqueue(&tasks_dir, kind, self.envelope(fields)).await
    }

    /// Round trip: publish a request with a fresh request id and wait for its result.
    pub async fn call(&self, kind: &str, fields: Map<String, Value>) -> Result<IpcResult> {
        let request_id = ipc::new_request_id();
        let mut fields = self.envelope(fields);
        fields.insert("requestId".into(), Value::String(request_id.clone()));
        ipc::enqueue(&self.mailbox.tasks_dir(&self.group), kind, fields).await?;
        debug!("waiting for {} result {}", kind, request_id);
        Ok(ipc::await_result(
            &self.mailbox.results_dir(&self.group),
            &request_id,
            self.result_timeout,
            self.poll_interval,
        )
        .await)
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value; // JSON Schema

    fn fulfillment(&self) -> Fulfillment;

    /// Hidden from the schema and rejected for non-privileged callers.
    fn privileged_only(&self) -> bool {
        false
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> anyhow::Result<ToolResult>;

    /// Per-tool execution timeout. Round-trip tools are additionally given the
    /// context's result timeout.
    fn execution_timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn to_schema(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters()
            }
        })
    }
}

/// Middleware that can intercept tool execution for cross-cutting concerns
/// like truncation and logging.
#[async_trait]
pub trait ToolMiddleware: Send + Sync {
    /// Called before tool execution. Return `Some` to short-circuit.
    async fn before_execute(
        &self,
        _name: &str,
        _params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
    ) -> Option<ToolResult> {
        None
    }

    /// Called after tool execution. Can modify the result.
    async fn after_execute(
        &self,
        _name: &str,
        _params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
        _result: &mut ToolResult,
    ) {
    }
}

/// Required string argument, trimmed.
pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str, ToolResult> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolResult::error(format!("Missing required parameter '{}'", key)))
}

pub fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
