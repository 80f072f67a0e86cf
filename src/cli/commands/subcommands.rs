use crate::agent::tools::{ExecutionContext, standard_registry};
use crate::agent::{AgentLoop, AgentLoopConfig};
use crate::auth::{AuthDecision, AuthorizationGate};
use crate::config::Config;
use crate::dispatch::{
    ChannelClient, ChannelDispatcher, DispatcherChain, FileTaskScheduler, HostWatcher,
    MessageDispatcher, RegistryDispatcher, SchedulerDispatcher, UnconfiguredChannelClient,
    WebhookChannelClient,
};
use crate::ipc::Mailbox;
use crate::providers::openai::OpenAIProvider;
use crate::registry::{ResourceRegistry, watcher::start_watching};
use crate::session::SessionManager;
use crate::utils::{ensure_dir, is_valid_group_name};
use anyhow::{Result, bail};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

fn channel_client(config: &Config) -> Result<Arc<dyn ChannelClient>> {
    match &config.channels.webhook_url {
        Some(url) => Ok(Arc::new(WebhookChannelClient::new(
            url.clone(),
            Duration::from_secs(config.channels.webhook_timeout_secs),
        )?)),
        None => {
            warn!("channels.webhookUrl is not set, channel delivery will fail");
            Ok(Arc::new(UnconfiguredChannelClient))
        }
    }
}

/// The standard host chain: channel delivery, chat messages, scheduling, registry refresh.
pub(super) async fn build_chain(
    config: &Config,
    mailbox: Mailbox,
    registry: Arc<ResourceRegistry>,
    client: Arc<dyn ChannelClient>,
) -> DispatcherChain {
    let gate = AuthorizationGate::new(registry.clone());
    let scheduler = Arc::new(SchedulerDispatcher::new(
        gate.clone(),
        Arc::new(FileTaskScheduler::new(config.scheduled_tasks_path())),
        mailbox.clone(),
    ));
    scheduler.refresh_snapshots().await;

    DispatcherChain::new(mailbox)
        .with(Arc::new(ChannelDispatcher::new(gate.clone(), client.clone())))
        .with(Arc::new(MessageDispatcher::new(gate, client)))
        .with(scheduler)
        .with(Arc::new(RegistryDispatcher::new(registry)))
}

pub(super) async fn host(config: &Config) -> Result<()> {
    let data_dir = ensure_dir(config.data_dir_path())?;
    let mailbox = Mailbox::new(&data_dir);
    let registry = Arc::new(ResourceRegistry::load(config.mappings_path())?);

    let registry_watch = if config.registry.watch {
        match start_watching(registry.clone()) {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("mapping file watch disabled: {:#}", e);
                None
            }
        }
    } else {
        None
    };

    let gate = AuthorizationGate::new(registry.clone());
    let chain = build_chain(config, mailbox, registry, channel_client(config)?).await;
    let watcher = HostWatcher::new(Arc::new(chain), gate, config.ipc.host_scan_interval());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    info!("host running with data dir {}", data_dir.display());
    let result = watcher.run(shutdown_rx).await;
    signal.abort();
    if let Some(handle) = registry_watch {
        handle.abort();
    }
    result
}

pub(super) async fn agent(
    config: &Config,
    group: &str,
    session: &str,
    is_privileged: bool,
    chat_jid: Option<String>,
    message: &str,
) -> Result<()> {
    if !is_valid_group_name(group) {
        bail!("invalid group name: {}", group);
    }
    let provider = Arc::new(OpenAIProvider::new(
        config.provider.api_key.clone(),
        config.provider.model.clone(),
        &config.provider.api_base,
        Duration::from_secs(config.provider.request_timeout_secs),
    ));
    let sessions = Arc::new(SessionManager::new(config.sessions_dir()));
    let agent = AgentLoop::new(
        provider,
        sessions,
        Arc::new(standard_registry()),
        AgentLoopConfig::from_config(config),
    );

    let ctx = ExecutionContext::new(Mailbox::new(config.data_dir_path()), group, is_privileged)
        .with_chat_jid(chat_jid)
        .with_timeouts(config.ipc.result_timeout(), config.ipc.poll_interval());
    let output = agent.process(&ctx, session, message).await;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub(super) fn mappings_list(config: &Config) -> Result<()> {
    let registry = ResourceRegistry::load(config.mappings_path())?;
    if registry.is_empty() {
        println!("No mappings in {}", registry.path().display());
        return Ok(());
    }
    println!("Mappings ({}):", registry.path().display());
    for m in registry.snapshot().iter() {
        println!(
            "  {} -> {}{}",
            m.external_id,
            m.owner_group,
            if m.is_privileged { " (main)" } else { "" }
        );
    }
    Ok(())
}

/// One-line verdict for `mappings check`.
pub(super) fn describe_check(gate: &AuthorizationGate, group: &str, resource: &str) -> String {
    let caller = gate.identify(group);
    let role = if caller.is_privileged { "main" } else { "group" };
    match gate.authorize_caller(&caller, resource) {
        AuthDecision::Allow => format!("allow: {} ({}) may act on {}", group, role, resource),
        AuthDecision::Deny(reason) => {
            format!("deny: {} ({}) -> {}: {}", group, role, resource, reason)
        }
    }
}

pub(super) fn mappings_check(config: &Config, group: &str, resource: &str) -> Result<()> {
    let registry = Arc::new(ResourceRegistry::load(config.mappings_path())?);
    let gate = AuthorizationGate::new(registry);
    println!("{}", describe_check(&gate, group, resource));
    Ok(())
}
