//! Filesystem mailbox shared between a sandboxed agent and the host.
//!
//! Every group owns a directory pair under `{data_dir}/ipc/{group}/`:
//! `tasks/` receives requests and `results/` holds replies keyed by request id.
//! Writers publish with temp-write + rename, so a reader never sees a partial
//! document. Only the host deletes requests and only the original waiter deletes
//! results, which is why no locking is needed.

use crate::utils::{now_millis, random_suffix};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const TIMEOUT_MESSAGE: &str = "Request timed out";

const TMP_SUFFIX: &str = ".tmp";
const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlated reply written by the host once per request id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcResult {
    pub success: bool,
    pub message: String,
}

impl IpcResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Request envelope. Type-specific fields land in `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub source_group: String,
    #[serde(default, alias = "isMain")]
    pub is_privileged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl TaskRequest {
    /// Non-empty string field from the type-specific payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// Directory layout of the mailbox rooted at a data directory.
#[derive(Debug, Clone)]
pub struct Mailbox {
    data_dir: PathBuf,
}

impl Mailbox {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn ipc_root(&self) -> PathBuf {
        self.data_dir.join("ipc")
    }

    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.ipc_root().join(group)
    }

    pub fn tasks_dir(&self, group: &str) -> PathBuf {
        self.group_dir(group).join("tasks")
    }

    pub fn results_dir(&self, group: &str) -> PathBuf {
        self.group_dir(group).join("results")
    }

    /// Quarantine for request files the host could not parse.
    pub fn errors_dir(&self) -> PathBuf {
        self.ipc_root().join("errors")
    }

    /// Read-only snapshot of the group's scheduled tasks, written by the host.
    pub fn task_snapshot_path(&self, group: &str) -> PathBuf {
        self.group_dir(group).join("current_tasks.json")
    }
}

/// Globally unique correlation key: wall-clock millis plus a random suffix.
pub fn new_request_id() -> String {
    format!("req-{}-{}", now_millis(), random_suffix(8))
}

/// Request ids become file names on the host, so only a conservative
/// character set is accepted.
pub fn is_valid_request_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_REQUEST_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

/// Publish `{type, timestamp, ...fields}` into `directory` and return the file name.
///
/// An explicit `timestamp` in `fields` is kept as-is.
pub async fn enqueue(directory: &Path, kind: &str, fields: Map<String, Value>) -> Result<String> {
    tokio::fs::create_dir_all(directory)
        .await
        .with_context(|| format!("Failed to create mailbox dir {}", directory.display()))?;

    let mut doc = fields;
    doc.insert("type".to_string(), Value::String(kind.to_string()));
    doc.entry("timestamp")
        .or_insert_with(|| Value::String(chrono::Utc::now().to_rfc3339()));

    let filename = format!("{}-{}.json", now_millis(), random_suffix(6));
    let body = serde_json::to_string_pretty(&Value::Object(doc))?;
    publish(&directory.join(&filename), body.as_bytes()).await?;
    debug!("enqueued {} request as {}", kind, filename);
    Ok(filename)
}

/// Host side: write the single reply for `request_id` into `results_dir`.
pub async fn write_result(
    results_dir: &Path,
    request_id: &str,
    result: &IpcResult,
) -> Result<PathBuf> {
    if !is_valid_request_id(request_id) {
        anyhow::bail!("refusing to write result for invalid request id {:?}", request_id);
    }
    tokio::fs::create_dir_all(results_dir)
        .await
        .with_context(|| format!("Failed to create results dir {}", results_dir.display()))?;
    let path = results_dir.join(format!("{}.json", request_id));
    let body = serde_json::to_string(result)?;
    publish(&path, body.as_bytes()).await?;
    Ok(path)
}

/// Poll `results_dir` for the reply to `request_id`.
///
/// The reply is deleted once read. A reply that fails to parse is reported
/// immediately and left on disk. Exceeding `max_wait` is a normal outcome.
pub async fn await_result(
    results_dir: &Path,
    request_id: &str,
    max_wait: Duration,
    poll_interval: Duration,
) -> IpcResult {
    let path = results_dir.join(format!("{}.json", request_id));
    let deadline = Instant::now() + max_wait;
    let poll_interval = poll_interval.max(Duration::from_millis(1));

    loop {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return match read_result(&path).await {
                Ok(result) => {
                    if let Err(e) = tokio::fs::remove_file(&path).await {
                        warn!("failed to remove delivered result {}: {}", path.display(), e);
                    }
                    result
                }
                Err(e) => IpcResult::failure(format!("Failed to read result: {}", e)),
            };
        }

        let now = Instant::now();
        if now >= deadline {
            debug!("gave up waiting for {} after {:?}", request_id, max_wait);
            return IpcResult::failure(TIMEOUT_MESSAGE);
        }
        tokio::time::sleep(poll_interval.min(deadline - now)).await;
    }
}

/// Published request files in `tasks_dir`, oldest first. In-flight `.tmp` files are skipped.
pub async fn list_pending(tasks_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(tasks_dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", tasks_dir.display()));
        }
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json && entry.file_type().await.is_ok_and(|t| t.is_file()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

pub async fn read_request(path: &Path) -> Result<TaskRequest> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read request {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse request {}", path.display()))
}

async fn read_result(path: &Path) -> Result<IpcResult> {
    let content = tokio::fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Temp-write next to `path`, then rename over it.
async fn publish(path: &Path, body: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .context("publish path has no file name")?
        .to_string_lossy();
    let tmp = path.with_file_name(format!("{}{}", file_name, TMP_SUFFIX));
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to publish {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests;
