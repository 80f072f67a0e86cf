use super::TaskDispatcher;
use crate::auth::{AuthDecision, AuthorizationGate, CallerIdentity};
use crate::ipc::{IpcResult, Mailbox, TaskRequest};
use crate::utils::{atomic_write, is_valid_group_name, now_millis, random_suffix};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Cron,
    Interval,
    Once,
}

impl ScheduleType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cron" => Some(Self::Cron),
            "interval" => Some(Self::Interval),
            "once" => Some(Self::Once),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cron => "cron",
            Self::Interval => "interval",
            Self::Once => "once",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: String,
    pub group_folder: String,
    pub prompt: String,
    pub schedule_type: ScheduleType,
    pub schedule_value: String,
    pub target_channel_id: String,
    pub status: TaskStatus,
    pub created_at: String,
}

/// Normalize a cron expression and validate it.
///
/// Standard 5-field expressions get a leading `0` seconds field.
pub fn validate_cron_expr(expr: &str) -> Result<String> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {}", expr)
    } else {
        expr.to_string()
    };
    normalized
        .parse::<Schedule>()
        .map_err(|e| anyhow::anyhow!("Invalid cron expression '{}': {}", expr, e))?;
    Ok(normalized)
}

/// Check a schedule value against its type: cron expression, interval in
/// milliseconds, or a one-shot timestamp (RFC 3339 or local `YYYY-MM-DDTHH:MM:SS`).
pub fn validate_schedule(schedule_type: ScheduleType, value: &str) -> Result<()> {
    let value = value.trim();
    match schedule_type {
        ScheduleType::Cron => validate_cron_expr(value).map(|_| ()),
        ScheduleType::Interval => match value.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(()),
            _ => anyhow::bail!("Invalid interval '{}': expected positive milliseconds", value),
        },
        ScheduleType::Once => {
            if DateTime::parse_from_rfc3339(value).is_ok()
                || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").is_ok()
            {
                Ok(())
            } else {
                anyhow::bail!("Invalid timestamp '{}': expected an ISO 8601 time", value)
            }
        }
    }
}

/// Persistence boundary for scheduled tasks. Executing them is not the host's job here.
#[async_trait]
pub trait TaskScheduler: Send + Sync {
    async fn create(&self, task: ScheduledTask) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>>;
    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<ScheduledTask>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TaskStore {
    #[serde(default)]
    tasks: Vec<ScheduledTask>,
}

/// JSON-file task store, rewritten atomically on every change.
pub struct FileTaskScheduler {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTaskScheduler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<TaskStore> {
        if !self.path.exists() {
            return Ok(TaskStore::default());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(TaskStore::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn save(&self, store: &TaskStore) -> Result<()> {
        atomic_write(&self.path, &serde_json::to_string_pretty(store)?)
    }
}

#[async_trait]
impl TaskScheduler for FileTaskScheduler {
    async fn create(&self, task: ScheduledTask) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut store = self.load()?;
        if store.tasks.iter().any(|t| t.id == task.id) {
            anyhow::bail!("Task {} already exists", task.id);
        }
        store.tasks.push(task);
        self.save(&store)
    }

    async fn get(&self, id: &str) -> Result<Option<ScheduledTask>> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.tasks.into_iter().find(|t| t.id == id))
    }

    async fn set_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut store = self.load()?;
        let task = store
            .tasks
            .iter_mut()
            .find(|t| t.id == id)
            .with_context(|| format!("Task {} not found", id))?;
        task.status = status;
        self.save(&store)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut store = self.load()?;
        let before = store.tasks.len();
        store.tasks.retain(|t| t.id != id);
        if store.tasks.len() == before {
            anyhow::bail!("Task {} not found", id);
        }
        self.save(&store)
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>> {
        let _guard = self.lock.lock().await;
        Ok(self.load()?.tasks)
    }
}

/// `schedule_task`, `pause_task`, `resume_task` and `cancel_task`.
pub struct SchedulerDispatcher {
    gate: AuthorizationGate,
    scheduler: Arc<dyn TaskScheduler>,
    mailbox: Mailbox,
}

impl SchedulerDispatcher {
    pub fn new(
        gate: AuthorizationGate,
        scheduler: Arc<dyn TaskScheduler>,
        mailbox: Mailbox,
    ) -> Self {
        Self {
            gate,
            scheduler,
            mailbox,
        }
    }

    async fn schedule(&self, request: &TaskRequest, caller: &CallerIdentity) -> IpcResult {
        let (Some(prompt), Some(raw_type), Some(value), Some(target)) = (
            request.str_field("prompt"),
            request.str_field("scheduleType"),
            request.str_field("scheduleValue"),
            request.str_field("targetChannelId"),
        ) else {
            return IpcResult::failure(
                "Missing prompt, scheduleType, scheduleValue or targetChannelId",
            );
        };
        let Some(schedule_type) = ScheduleType::parse(raw_type) else {
            return IpcResult::failure(format!(
                "Invalid scheduleType '{}': expected cron, interval or once",
                raw_type
            ));
        };
        if let Err(e) = validate_schedule(schedule_type, value) {
            return IpcResult::failure(e.to_string());
        }
        if let AuthDecision::Deny(reason) = self.gate.authorize_caller(caller, target) {
            return IpcResult::failure(reason);
        }
        // The task runs in the context of whoever owns the target channel.
        let group_folder = self
            .gate
            .registry()
            .find_by_external_id(target)
            .map_or_else(|| caller.group.clone(), |m| m.owner_group);

        let task = ScheduledTask {
            id: format!("task-{}-{}", now_millis(), random_suffix(6)),
            group_folder,
            prompt: prompt.to_string(),
            schedule_type,
            schedule_value: value.trim().to_string(),
            target_channel_id: target.to_string(),
            status: TaskStatus::Active,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let id = task.id.clone();
        if let Err(e) = self.scheduler.create(task).await {
            return IpcResult::failure(format!("Failed to schedule task: {}", e));
        }
        info!("{} scheduled task {} ({}: {})", caller.group, id, raw_type, value);
        self.refresh_snapshots().await;
        IpcResult::ok(format!("Task {} scheduled ({}: {})", id, raw_type, value.trim()))
    }

    async fn update(&self, request: &TaskRequest, caller: &CallerIdentity) -> IpcResult {
        let Some(task_id) = request.str_field("taskId") else {
            return IpcResult::failure("Missing taskId");
        };
        let task = match self.scheduler.get(task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => return IpcResult::failure(format!("Task {} not found", task_id)),
            Err(e) => return IpcResult::failure(format!("Failed to load tasks: {}", e)),
        };
        if !caller.is_privileged && task.group_folder != caller.group {
            warn!(
                "{} tried to {} task {} owned by {}",
                caller.group, request.kind, task_id, task.group_folder
            );
            return IpcResult::failure("not authorized for this task");
        }

        let (outcome, verb) = match request.kind.as_str() {
            "pause_task" => (
                self.scheduler.set_status(task_id, TaskStatus::Paused).await,
                "paused",
            ),
            "resume_task" => (
                self.scheduler.set_status(task_id, TaskStatus::Active).await,
                "resumed",
            ),
            _ => (self.scheduler.delete(task_id).await, "cancelled"),
        };
        match outcome {
            Ok(()) => {
                self.refresh_snapshots().await;
                IpcResult::ok(format!("Task {} {}", task_id, verb))
            }
            Err(e) => IpcResult::failure(e.to_string()),
        }
    }

    /// Rewrite `current_tasks.json` for every group with a mailbox directory.
    /// Privileged groups see every task; others see only their own.
    pub async fn refresh_snapshots(&self) {
        let tasks = match self.scheduler.list().await {
            Ok(tasks) => tasks,
            Err(e) => {
                warn!("cannot list tasks for snapshots: {}", e);
                return;
            }
        };
        let Ok(entries) = std::fs::read_dir(self.mailbox.ipc_root()) else {
            return;
        };
        let registry = self.gate.registry();
        for entry in entries.flatten() {
            let group = entry.file_name().to_string_lossy().to_string();
            if !is_valid_group_name(&group) || !entry.path().is_dir() {
                continue;
            }
            let privileged = registry.is_privileged_group(&group);
            let visible: Vec<&ScheduledTask> = tasks
                .iter()
                .filter(|t| privileged || t.group_folder == group)
                .collect();
            let written = serde_json::to_string_pretty(&visible)
                .map_err(anyhow::Error::from)
                .and_then(|body| atomic_write(&self.mailbox.task_snapshot_path(&group), &body));
            if let Err(e) = written {
                warn!("failed to write task snapshot for {}: {}", group, e);
            }
        }
    }
}

#[async_trait]
impl TaskDispatcher for SchedulerDispatcher {
    fn name(&self) -> &'static str {
        "scheduler"
    }

    fn can_handle(&self, kind: &str) -> bool {
        matches!(
            kind,
            "schedule_task" | "pause_task" | "resume_task" | "cancel_task"
        )
    }

    async fn execute(&self, request: &TaskRequest, caller: &CallerIdentity) -> IpcResult {
        if request.kind == "schedule_task" {
            self.schedule(request, caller).await
        } else {
            self.update(request, caller).await
        }
    }
}
