use crate::agent::tools::base::{ExecutionContext, Fulfillment, optional_str, required_str};
use crate::agent::tools::{Tool, ToolResult};
use crate::dispatch::scheduler::{ScheduleType, ScheduledTask, TaskStatus, validate_schedule};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt::Write as _;

pub struct ScheduleTaskTool;

#[async_trait]
impl Tool for ScheduleTaskTool {
    fn name(&self) -> &str {
        "schedule_task"
    }

    fn description(&self) -> &str {
        "Schedule a recurring or one-time task that runs the given prompt later. \
         schedule_type 'cron' takes a cron expression (e.g. '0 9 * * 1'), 'interval' \
         takes milliseconds, 'once' takes a local timestamp like 2026-03-01T09:00:00."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "What the agent should do when the task runs"
                },
                "schedule_type": {
                    "type": "string",
                    "enum": ["cron", "interval", "once"]
                },
                "schedule_value": {
                    "type": "string",
                    "description": "Cron expression, interval in milliseconds, or timestamp"
                },
                "target_channel_id": {
                    "type": "string",
                    "description": "Optional: chat the task reports to (defaults to the current chat)"
                }
            },
            "required": ["prompt", "schedule_type", "schedule_value"]
        })
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::FireAndForget
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let (prompt, raw_type, value) = match (
            required_str(&params, "prompt"),
            required_str(&params, "schedule_type"),
            required_str(&params, "schedule_value"),
        ) {
            (Ok(p), Ok(t), Ok(v)) => (p, t, v),
            (Err(e), _, _) | (_, Err(e), _) | (_, _, Err(e)) => return Ok(e),
        };
        let Some(schedule_type) = ScheduleType::parse(raw_type) else {
            return Ok(ToolResult::error(format!(
                "Invalid schedule_type '{}': use cron, interval or once",
                raw_type
            )));
        };
        if let Err(e) = validate_schedule(schedule_type, value) {
            return Ok(ToolResult::error(e.to_string()));
        }
        let Some(target) = optional_str(&params, "target_channel_id").or(ctx.chat_jid.as_deref())
        else {
            return Ok(ToolResult::error(
                "No target chat: pass 'target_channel_id'",
            ));
        };

        let mut fields = Map::new();
        fields.insert("prompt".into(), Value::String(prompt.to_string()));
        fields.insert("scheduleType".into(), Value::String(schedule_type.as_str().into()));
        fields.insert("scheduleValue".into(), Value::String(value.to_string()));
        fields.insert("targetChannelId".into(), Value::String(target.to_string()));
        ctx.submit("schedule_task", fields).await?;
        Ok(ToolResult::new(format!(
            "Task scheduling requested ({}: {}). Use list_tasks to confirm.",
            schedule_type.as_str(),
            value
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Pause,
    Resume,
    Cancel,
}

/// `pause_task`, `resume_task` and `cancel_task`.
pub struct TaskControlTool {
    action: TaskAction,
}

impl TaskControlTool {
    pub fn new(action: TaskAction) -> Self {
        Self { action }
    }
}

#[async_trait]
impl Tool for TaskControlTool {
    fn name(&self) -> &str {
        match self.action {
            TaskAction::Pause => "pause_task",
            TaskAction::Resume => "resume_task",
            TaskAction::Cancel => "cancel_task",
        }
    }

    fn description(&self) -> &str {
        match self.action {
            TaskAction::Pause => "Pause a scheduled task. It will not run until resumed.",
            TaskAction::Resume => "Resume a paused task.",
            TaskAction::Cancel => "Cancel and delete a scheduled task.",
        }
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task_id": {
                    "type": "string",
                    "description": "Task id as shown by list_tasks"
                }
            },
            "required": ["task_id"]
        })
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::FireAndForget
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let task_id = match required_str(&params, "task_id") {
            Ok(id) => id,
            Err(e) => return Ok(e),
        };
        let mut fields = Map::new();
        fields.insert("taskId".into(), Value::String(task_id.to_string()));
        ctx.submit(self.name(), fields).await?;
        let verb = match self.action {
            TaskAction::Pause => "pause",
            TaskAction::Resume => "resume",
            TaskAction::Cancel => "cancellation",
        };
        Ok(ToolResult::new(format!("Task {} {} requested.", task_id, verb)))
    }
}

/// Reads the host-maintained snapshot; no round trip needed.
pub struct ListTasksTool;

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &str {
        "list_tasks"
    }

    fn description(&self) -> &str {
        "List scheduled tasks visible to this group."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::Local
    }

    async fn execute(&self, _params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let path = ctx.mailbox.task_snapshot_path(&ctx.group);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ToolResult::new("No scheduled tasks found."));
            }
            Err(e) => return Ok(ToolResult::error(format!("error reading tasks: {}", e))),
        };
        let tasks: Vec<ScheduledTask> = match serde_json::from_str(&content) {
            Ok(t) => t,
            Err(e) => return Ok(ToolResult::error(format!("error parsing tasks: {}", e))),
        };
        if tasks.is_empty() {
            return Ok(ToolResult::new("No scheduled tasks found."));
        }

        let mut out = String::from("Scheduled tasks:\n");
        for task in &tasks {
            let status = match task.status {
                TaskStatus::Active => "active",
                TaskStatus::Paused => "paused",
            };
            let _ = writeln!(
                out,
                "- [{}] {} ({}: {}) - {}{}",
                task.id,
                task.prompt,
                task.schedule_type.as_str(),
                task.schedule_value,
                status,
                if task.group_folder == ctx.group {
                    String::new()
                } else {
                    format!(" [group: {}]", task.group_folder)
                }
            );
        }
        Ok(ToolResult::new(out.trim_end().to_string()))
    }
}
