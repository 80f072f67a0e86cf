use crate::session::Session;
use anyhow::Result;
use async_trait::async_trait;

/// Trait for session storage backends, keyed by (group, session id).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the stored session, or a new empty one when none exists.
    async fn get_or_create(&self, group: &str, session_id: &str) -> Result<Session>;

    /// Overwrite the stored session wholesale.
    async fn save(&self, session: &Session) -> Result<()>;
}
