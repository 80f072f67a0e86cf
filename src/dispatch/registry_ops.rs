use super::TaskDispatcher;
use crate::auth::CallerIdentity;
use crate::ipc::{IpcResult, TaskRequest};
use crate::registry::ResourceRegistry;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

pub const PRIVILEGED_ONLY_MESSAGE: &str = "refresh_mappings is restricted to the privileged group";

/// `refresh_mappings`: re-read the mapping file on request of the privileged group.
pub struct RegistryDispatcher {
    registry: Arc<ResourceRegistry>,
}

impl RegistryDispatcher {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl TaskDispatcher for RegistryDispatcher {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn can_handle(&self, kind: &str) -> bool {
        kind == "refresh_mappings"
    }

    async fn execute(&self, _request: &TaskRequest, caller: &CallerIdentity) -> IpcResult {
        if !caller.is_privileged {
            warn!("{} attempted refresh_mappings", caller.group);
            return IpcResult::failure(PRIVILEGED_ONLY_MESSAGE);
        }
        match self.registry.reload() {
            Ok(count) => IpcResult::ok(format!("Reloaded {} mappings", count)),
            Err(e) => IpcResult::failure(format!("Mapping reload failed: {}", e)),
        }
    }
}
