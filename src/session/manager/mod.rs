use crate::providers::base::{Message, Role};
use crate::session::store::SessionStore;
use crate::utils::{atomic_write, is_safe_filename, is_valid_group_name};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Number of stored messages replayed into a new invocation.
pub const SESSION_WINDOW: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(skip)]
    pub group: String,
    #[serde(skip)]
    pub session_id: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "chrono::Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(group: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            session_id: session_id.into(),
            messages: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
        self.updated_at = Utc::now();
    }

    /// Exactly the most recent `max_messages` entries, whatever their roles.
    pub fn history(&self, max_messages: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(max_messages);
        &self.messages[start..]
    }
}

/// One JSON file per session at `{sessions_dir}/{group}/{session_id}.json`.
pub struct SessionManager {
    sessions_dir: PathBuf,
}

impl SessionManager {
    pub fn new(sessions_dir: impl Into<PathBuf>) -> Self {
        Self {
            sessions_dir: sessions_dir.into(),
        }
    }

    pub fn session_path(&self, group: &str, session_id: &str) -> Result<PathBuf> {
        if !is_valid_group_name(group) {
            anyhow::bail!("invalid group name {:?}", group);
        }
        // Ids are used verbatim so two distinct ids never share a file.
        if !is_safe_filename(session_id) {
            anyhow::bail!("invalid session id {:?}", session_id);
        }
        Ok(self.sessions_dir.join(group).join(format!("{}.json", session_id)))
    }

    pub async fn get_or_create(&self, group: &str, session_id: &str) -> Result<Session> {
        let path = self.session_path(group, session_id)?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("new session {}/{}", group, session_id);
                return Ok(Session::new(group, session_id));
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read session file: {}", path.display()));
            }
        };

        let mut session: Session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))?;
        session.group = group.to_string();
        session.session_id = session_id.to_string();
        debug!(
            "loaded session {}/{} with {} messages",
            group,
            session_id,
            session.messages.len()
        );
        Ok(session)
    }

    pub async fn save(&self, session: &Session) -> Result<()> {
        let path = self.session_path(&session.group, &session.session_id)?;
        let messages = match session.messages.split_first() {
            Some((first, rest)) if first.role == Role::System => rest,
            _ => session.messages.as_slice(),
        };
        let content = serde_json::to_string_pretty(&serde_json::json!({
            "messages": messages,
            "updatedAt": session.updated_at,
        }))?;
        atomic_write(&path, &content)
            .with_context(|| format!("Failed to write session file: {}", path.display()))
    }
}

#[async_trait]
impl SessionStore for SessionManager {
    async fn get_or_create(&self, group: &str, session_id: &str) -> Result<Session> {
        SessionManager::get_or_create(self, group, session_id).await
    }

    async fn save(&self, session: &Session) -> Result<()> {
        SessionManager::save(self, session).await
    }
}

#[cfg(test)]
mod tests;
