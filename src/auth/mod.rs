use crate::registry::ResourceRegistry;
use std::sync::Arc;
use tracing::warn;

pub const DENY_UNMAPPED: &str = "resource not mapped to any group";
pub const DENY_NOT_OWNER: &str = "not authorized for this resource";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    Allow,
    Deny(String),
}

impl AuthDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Identity the host assigns to a request, derived from the mailbox directory
/// the request arrived in and the registry, never from the request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub group: String,
    pub is_privileged: bool,
}

impl CallerIdentity {
    pub fn new(group: impl Into<String>, is_privileged: bool) -> Self {
        Self {
            group: group.into(),
            is_privileged,
        }
    }
}

/// The single decision point every privileged action passes through.
#[derive(Clone)]
pub struct AuthorizationGate {
    registry: Arc<ResourceRegistry>,
}

impl AuthorizationGate {
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    /// Resolve the identity for a group directory on the host.
    pub fn identify(&self, group: &str) -> CallerIdentity {
        CallerIdentity::new(group, self.registry.is_privileged_group(group))
    }

    pub fn authorize(
        &self,
        source_group: &str,
        is_privileged_caller: bool,
        target_external_id: &str,
    ) -> AuthDecision {
        let Some(mapping) = self.registry.find_by_external_id(target_external_id) else {
            warn!(
                "denied {} -> {}: {}",
                source_group, target_external_id, DENY_UNMAPPED
            );
            return AuthDecision::Deny(DENY_UNMAPPED.to_string());
        };
        if is_privileged_caller || mapping.owner_group == source_group {
            return AuthDecision::Allow;
        }
        warn!(
            "denied {} -> {} (owned by {}): {}",
            source_group, target_external_id, mapping.owner_group, DENY_NOT_OWNER
        );
        AuthDecision::Deny(DENY_NOT_OWNER.to_string())
    }

    pub fn authorize_caller(&self, caller: &CallerIdentity, target: &str) -> AuthDecision {
        self.authorize(&caller.group, caller.is_privileged, target)
    }
}
