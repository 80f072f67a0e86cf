use crate::agent::tools::base::{ExecutionContext, Fulfillment};
use crate::agent::tools::{Tool, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Ask the host to re-read the resource mapping file. Main group only.
pub struct RefreshMappingsTool;

#[async_trait]
impl Tool for RefreshMappingsTool {
    fn name(&self) -> &str {
        "refresh_mappings"
    }

    fn description(&self) -> &str {
        "Reload the channel-to-group mappings on the host after they were edited."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::FireAndForget
    }

    fn privileged_only(&self) -> bool {
        true
    }

    async fn execute(&self, _params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        ctx.submit("refresh_mappings", Map::new()).await?;
        Ok(ToolResult::new("Mapping refresh requested."))
    }
}
