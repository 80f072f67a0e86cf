use crate::agent::tools::base::{ExecutionContext, Fulfillment, ToolMiddleware};
use crate::agent::tools::{Tool, ToolResult};
use crate::agent::truncation::{MAX_TOOL_RESULT_CHARS, truncate_tool_result};
use crate::providers::base::ToolDefinition;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Headroom on top of the mailbox wait so a round trip times out in the
/// mailbox rather than in the guard.
const ROUND_TRIP_GRACE: Duration = Duration::from_secs(5);

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    middleware: Vec<Arc<dyn ToolMiddleware>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            middleware: vec![
                Arc::new(TruncationMiddleware::new(MAX_TOOL_RESULT_CHARS)),
                Arc::new(LoggingMiddleware),
            ],
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if name.is_empty() || name.len() > 64 || name.chars().any(char::is_control) {
            warn!("tool registry: rejecting tool with invalid name {:?}", name);
            return;
        }
        if self.tools.contains_key(&name) {
            warn!("tool registry: overwriting duplicate tool '{}'", name);
        }
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Returns a sorted list of all registered tool names.
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Schema offered to the model. Privileged-only tools appear only for
    /// privileged callers.
    pub fn get_tool_definitions(&self, is_privileged: bool) -> Vec<ToolDefinition> {
        let mut defs: Vec<_> = self
            .tools
            .values()
            .filter(|t| is_privileged || !t.privileged_only())
            .map(|t| {
                let schema = t.to_schema();
                ToolDefinition {
                    name: schema["function"]["name"]
                        .as_str()
                        .unwrap_or("")
                        .to_string(),
                    description: schema["function"]["description"]
                        .as_str()
                        .unwrap_or("")
                        .to_string(),
                    parameters: schema["function"]["parameters"].clone(),
                }
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute a tool through the middleware pipeline.
    ///
    /// Unknown names, privilege violations, timeouts and panics all come back
    /// as error results so the agent loop keeps going.
    pub async fn execute(&self, name: &str, params: Value, ctx: &ExecutionContext) -> ToolResult {
        let Some(tool) = self.tools.get(name).cloned() else {
            warn!("model requested unknown tool '{}'", name);
            return ToolResult::error(format!("Unknown tool: {}", name));
        };
        if tool.privileged_only() && !ctx.is_privileged {
            warn!("{} tried privileged-only tool '{}'", ctx.group, name);
            return ToolResult::error(format!(
                "The {} tool is only available to the main group",
                name
            ));
        }

        for mw in &self.middleware {
            if let Some(result) = mw.before_execute(name, &params, ctx, tool.as_ref()).await {
                return result;
            }
        }

        let mut result = self
            .execute_with_guards(name, Arc::clone(&tool), params.clone(), ctx)
            .await;

        for mw in &self.middleware {
            mw.after_execute(name, &params, ctx, tool.as_ref(), &mut result)
                .await;
        }
        result
    }

    /// Execute a tool in a spawned `tokio::task` with timeout and panic isolation.
    async fn execute_with_guards(
        &self,
        name: &str,
        tool: Arc<dyn Tool>,
        params: Value,
        ctx: &ExecutionContext,
    ) -> ToolResult {
        let tool_name = name.to_string();
        let ctx = ctx.clone();
        let mut timeout = tool.execution_timeout();
        if tool.fulfillment() == Fulfillment::RoundTrip {
            timeout = timeout.max(ctx.result_timeout + ROUND_TRIP_GRACE);
        }
        let timeout_secs = timeout.as_secs();

        let handle = tokio::task::spawn(async move {
            tokio::time::timeout(timeout, tool.execute(params, &ctx)).await
        });

        match handle.await {
            Ok(Ok(Ok(result))) => result,
            Ok(Ok(Err(e))) => ToolResult::error(format!("Tool '{}' failed: {}", tool_name, e)),
            Ok(Err(_)) => {
                warn!("Tool '{}' timed out after {}s", tool_name, timeout_secs);
                ToolResult::error(format!(
                    "Tool '{}' timed out after {}s",
                    tool_name, timeout_secs
                ))
            }
            Err(join_err) => {
                if join_err.is_panic() {
                    let panic_payload = join_err.into_panic();
                    let panic_msg = panic_payload
                        .downcast_ref::<String>()
                        .map(String::as_str)
                        .or_else(|| panic_payload.downcast_ref::<&str>().copied())
                        .unwrap_or("unknown cause");
                    error!("Tool '{}' panicked: {}", tool_name, panic_msg);
                    ToolResult::error(format!("Tool '{}' crashed: {}", tool_name, panic_msg))
                } else {
                    ToolResult::error(format!("Tool '{}' was cancelled", tool_name))
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncation middleware: truncates tool results to a maximum character count.
pub struct TruncationMiddleware {
    max_chars: usize,
}

impl TruncationMiddleware {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait::async_trait]
impl ToolMiddleware for TruncationMiddleware {
    async fn after_execute(
        &self,
        _name: &str,
        _params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
        result: &mut ToolResult,
    ) {
        result.content = truncate_tool_result(&result.content, self.max_chars);
    }
}

/// Logging middleware: logs tool execution and results.
pub struct LoggingMiddleware;

#[async_trait::async_trait]
impl ToolMiddleware for LoggingMiddleware {
    async fn before_execute(
        &self,
        name: &str,
        params: &Value,
        ctx: &ExecutionContext,
        _tool: &dyn Tool,
    ) -> Option<ToolResult> {
        debug!(
            "Executing tool: {} (group={}) with arguments: {}",
            name, ctx.group, params
        );
        None
    }

    async fn after_execute(
        &self,
        name: &str,
        _params: &Value,
        _ctx: &ExecutionContext,
        _tool: &dyn Tool,
        result: &mut ToolResult,
    ) {
        if result.is_error {
            warn!("Tool '{}' returned error: {}", name, result.content);
        } else {
            info!("Tool '{}' completed ({} chars)", name, result.content.len());
        }
    }
}
