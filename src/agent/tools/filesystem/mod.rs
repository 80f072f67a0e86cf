use crate::agent::tools::base::{ExecutionContext, Fulfillment, optional_str, required_str};
use crate::agent::tools::{Tool, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tracing::warn;

/// Largest payload `write_file` accepts.
pub const MAX_WRITE_BYTES: usize = 64 * 1024;

/// Maximum file size that `read_file` will load (1 MB).
const MAX_READ_BYTES: u64 = 1024 * 1024;

/// Resolve `relative` inside `root`, refusing anything that could land outside it.
///
/// Absolute paths and `..` components are rejected lexically. When the target
/// or its nearest existing ancestor resolves through a symlink, the resolved
/// location must still be under the resolved root.
pub fn resolve_in_group(root: &Path, relative: &str) -> Result<PathBuf, String> {
    let rel = Path::new(relative);
    if relative.trim().is_empty() {
        return Err("Path must not be empty".to_string());
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(format!("Path '{}' must not contain '..'", relative));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(format!(
                    "Path '{}' must be relative to the group directory",
                    relative
                ));
            }
        }
    }

    let target = root.join(rel);
    if let Ok(root_resolved) = root.canonicalize() {
        let mut probe = target.as_path();
        loop {
            if let Ok(resolved) = probe.canonicalize() {
                if !resolved.starts_with(&root_resolved) {
                    warn!("path {} escapes {} via symlink", target.display(), root.display());
                    return Err(format!("Path '{}' is outside the group directory", relative));
                }
                break;
            }
            match probe.parent() {
                Some(parent) if parent.starts_with(root) => probe = parent,
                _ => break,
            }
        }
    }
    Ok(target)
}

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Read a text file from the group's working directory."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the group directory"
                }
            },
            "required": ["path"]
        })
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::Local
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = match required_str(&params, "path") {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        let path = match resolve_in_group(&ctx.group_dir, path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e)),
        };

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                return Ok(ToolResult::error(format!(
                    "not a file (path is a directory): {}. Use list_files to list directory contents",
                    path_str
                )));
            }
            Ok(meta) if meta.len() > MAX_READ_BYTES => {
                return Ok(ToolResult::error(format!(
                    "file too large ({} bytes, max {})",
                    meta.len(),
                    MAX_READ_BYTES
                )));
            }
            Err(_) => return Ok(ToolResult::error(format!("file not found: {}", path_str))),
            _ => {}
        }

        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(ToolResult::new(content)),
            Err(e) => Ok(ToolResult::error(format!("error reading file: {}", e))),
        }
    }
}

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Create or overwrite a text file in the group's working directory."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the group directory"
                },
                "content": {
                    "type": "string",
                    "description": "Full file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::Local
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = match required_str(&params, "path") {
            Ok(p) => p,
            Err(e) => return Ok(e),
        };
        let Some(content) = params.get("content").and_then(Value::as_str) else {
            return Ok(ToolResult::error("Missing required parameter 'content'"));
        };
        if content.len() > MAX_WRITE_BYTES {
            return Ok(ToolResult::error(format!(
                "content too large ({} bytes); the limit is {} bytes",
                content.len(),
                MAX_WRITE_BYTES
            )));
        }
        let path = match resolve_in_group(&ctx.group_dir, path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e)),
        };

        if let Some(parent) = path.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::error(format!("error creating directory: {}", e)));
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => Ok(ToolResult::new(format!(
                "Wrote {} bytes to {}",
                content.len(),
                path_str
            ))),
            Err(e) => Ok(ToolResult::error(format!("error writing file: {}", e))),
        }
    }
}

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "list_files"
    }

    fn description(&self) -> &'static str {
        "List the entries of a directory in the group's working directory."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory relative to the group directory (default: the group directory itself)"
                }
            }
        })
    }

    fn fulfillment(&self) -> Fulfillment {
        Fulfillment::Local
    }

    async fn execute(&self, params: Value, ctx: &ExecutionContext) -> Result<ToolResult> {
        let path_str = optional_str(&params, "path").unwrap_or(".");
        let dir = match resolve_in_group(&ctx.group_dir, path_str) {
            Ok(p) => p,
            Err(e) => return Ok(ToolResult::error(e)),
        };

        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ToolResult::error(format!("directory not found: {}", path_str)));
            }
            Err(e) => return Ok(ToolResult::error(format!("error reading directory: {}", e))),
        };

        let mut entries = Vec::new();
        while let Ok(Some(entry)) = read_dir.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            entries.push(format!("{}{}", name, if is_dir { "/" } else { "" }));
        }
        if entries.is_empty() {
            return Ok(ToolResult::new("(empty directory)"));
        }
        entries.sort();
        Ok(ToolResult::new(entries.join("\n")))
    }
}
