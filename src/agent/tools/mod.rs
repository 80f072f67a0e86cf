pub mod base;
pub mod filesystem;
pub mod mappings;
pub mod message;
pub mod registry;
pub mod tasks;

pub use base::{ExecutionContext, Fulfillment, Tool, ToolResult};
pub use registry::ToolRegistry;

use std::sync::Arc;

/// Registry with every built-in tool the agent can offer.
pub fn standard_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(filesystem::ReadFileTool));
    registry.register(Arc::new(filesystem::WriteFileTool));
    registry.register(Arc::new(filesystem::ListFilesTool));
    registry.register(Arc::new(message::SendMessageTool));
    registry.register(Arc::new(message::ChannelSendTool));
    registry.register(Arc::new(tasks::ScheduleTaskTool));
    registry.register(Arc::new(tasks::ListTasksTool));
    for action in [
        tasks::TaskAction::Pause,
        tasks::TaskAction::Resume,
        tasks::TaskAction::Cancel,
    ] {
        registry.register(Arc::new(tasks::TaskControlTool::new(action)));
    }
    registry.register(Arc::new(mappings::RefreshMappingsTool));
    registry
}
