//! Host-side request handling.
//!
//! Several independent integrations share one task queue per group. Each
//! integration is a [`TaskDispatcher`] that claims a family of request types;
//! the [`DispatcherChain`] offers a request to each in order and the first
//! claimant handles it. New integrations are appended to the chain.

pub mod channel;
pub mod registry_ops;
pub mod scheduler;
pub mod watcher;

pub use channel::{
    ChannelClient, ChannelDispatcher, MessageDispatcher, UnconfiguredChannelClient,
    WebhookChannelClient,
};
pub use registry_ops::RegistryDispatcher;
pub use scheduler::{FileTaskScheduler, ScheduledTask, SchedulerDispatcher, TaskScheduler};
pub use watcher::HostWatcher;

use crate::auth::CallerIdentity;
use crate::ipc::{self, IpcResult, Mailbox, TaskRequest};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `kind` belongs to this dispatcher's family.
    fn can_handle(&self, kind: &str) -> bool;

    /// Whether requests of `kind` are only meaningful with a correlated reply.
    /// Such requests are dropped when they carry no request id.
    fn requires_reply(&self, _kind: &str) -> bool {
        false
    }

    /// Run the request on behalf of `caller`. Authorization and external
    /// failures are reported through the returned result, never as panics.
    async fn execute(&self, request: &TaskRequest, caller: &CallerIdentity) -> IpcResult;
}

pub struct DispatcherChain {
    mailbox: Mailbox,
    dispatchers: Vec<Arc<dyn TaskDispatcher>>,
}

impl DispatcherChain {
    pub fn new(mailbox: Mailbox) -> Self {
        Self {
            mailbox,
            dispatchers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, dispatcher: Arc<dyn TaskDispatcher>) -> Self {
        self.push(dispatcher);
        self
    }

    pub fn push(&mut self, dispatcher: Arc<dyn TaskDispatcher>) {
        self.dispatchers.push(dispatcher);
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Returns `false` when no dispatcher claims the request type.
    ///
    /// A claimed request produces at most one result file under the caller's
    /// own `results/` directory, and only when it carries a usable request id.
    pub async fn handle(&self, request: &TaskRequest, caller: &CallerIdentity) -> Result<bool> {
        let Some(dispatcher) = self.dispatchers.iter().find(|d| d.can_handle(&request.kind))
        else {
            return Ok(false);
        };

        let request_id = request
            .request_id
            .as_deref()
            .filter(|id| ipc::is_valid_request_id(id));
        if request_id.is_none() && request.request_id.is_some() {
            warn!(
                "{}: {} request from {} has an unusable request id {:?}",
                dispatcher.name(),
                request.kind,
                caller.group,
                request.request_id
            );
        }
        if request_id.is_none() && dispatcher.requires_reply(&request.kind) {
            warn!(
                "{}: dropping {} request from {} without request id",
                dispatcher.name(),
                request.kind,
                caller.group
            );
            return Ok(true);
        }

        let result = dispatcher.execute(request, caller).await;
        info!(
            "{}: {} from {} -> success={} ({})",
            dispatcher.name(),
            request.kind,
            caller.group,
            result.success,
            result.message
        );

        if let Some(id) = request_id {
            ipc::write_result(&self.mailbox.results_dir(&caller.group), id, &result).await?;
        }
        Ok(true)
    }
}
