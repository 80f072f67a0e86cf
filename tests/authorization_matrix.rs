mod common;

use async_trait::async_trait;
use common::standard_registry_mappings;
use hostbridge::auth::{AuthDecision, AuthorizationGate, DENY_NOT_OWNER, DENY_UNMAPPED};
use hostbridge::dispatch::{ChannelClient, ChannelDispatcher, DispatcherChain, HostWatcher};
use hostbridge::ipc::{self, IpcResult, Mailbox};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct CountingClient {
    sends: AtomicUsize,
}

#[async_trait]
impl ChannelClient for CountingClient {
    async fn send_text(&self, channel_id: &str, _text: &str) -> anyhow::Result<String> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        Ok(format!("sent to {}", channel_id))
    }
}

#[test]
fn gate_decision_matrix() {
    let gate = AuthorizationGate::new(standard_registry_mappings());
    let cases = [
        // (group, privileged, target, expected)
        ("family", false, "chat-fam", AuthDecision::Allow),
        ("family", false, "chat-main", AuthDecision::Deny(DENY_NOT_OWNER.into())),
        ("family", false, "chat-nowhere", AuthDecision::Deny(DENY_UNMAPPED.into())),
        ("main", true, "chat-fam", AuthDecision::Allow),
        ("main", true, "chat-main", AuthDecision::Allow),
        ("main", true, "chat-nowhere", AuthDecision::Deny(DENY_UNMAPPED.into())),
    ];
    for (group, privileged, target, expected) in cases {
        assert_eq!(
            gate.authorize(group, privileged, target),
            expected,
            "{} (privileged={}) -> {}",
            group,
            privileged,
            target
        );
    }
}

#[test]
fn identity_comes_from_registry() {
    let gate = AuthorizationGate::new(standard_registry_mappings());
    assert!(gate.identify("main").is_privileged);
    assert!(!gate.identify("family").is_privileged);
    assert!(!gate.identify("stranger").is_privileged);
}

async fn read_result(mailbox: &Mailbox, group: &str, id: &str) -> IpcResult {
    let path = mailbox.results_dir(group).join(format!("{}.json", id));
    serde_json::from_str(&tokio::fs::read_to_string(path).await.unwrap()).unwrap()
}

/// A request in family's mailbox that claims to come from main is still treated as family.
#[tokio::test]
async fn spoofed_privilege_claim_is_ignored() {
    let tmp = tempfile::tempdir().unwrap();
    let mailbox = Mailbox::new(tmp.path());
    let client = Arc::new(CountingClient::default());
    let gate = AuthorizationGate::new(standard_registry_mappings());
    let chain = DispatcherChain::new(mailbox.clone())
        .with(Arc::new(ChannelDispatcher::new(gate.clone(), client.clone())));
    let watcher = HostWatcher::new(Arc::new(chain), gate, Duration::from_millis(10));

    let mut fields = serde_json::Map::new();
    fields.insert("requestId".into(), json!("spoof-1"));
    fields.insert("sourceGroup".into(), json!("main"));
    fields.insert("isMain".into(), json!(true));
    fields.insert("channelId".into(), json!("chat-main"));
    fields.insert("text".into(), json!("let me in"));
    ipc::enqueue(&mailbox.tasks_dir("family"), "channel_send", fields)
        .await
        .unwrap();

    assert_eq!(watcher.scan_once().await.unwrap(), 1);
    assert_eq!(client.sends.load(Ordering::SeqCst), 0);

    // The result goes back to the directory the request came from
    let result = read_result(&mailbox, "family", "spoof-1").await;
    assert_eq!(result, IpcResult::failure(DENY_NOT_OWNER));
    assert!(!mailbox.results_dir("main").join("spoof-1.json").exists());
}

#[tokio::test]
async fn each_group_reaches_only_its_own_channel() {
    let tmp = tempfile::tempdir().unwrap();
    let mailbox = Mailbox::new(tmp.path());
    let client = Arc::new(CountingClient::default());
    let gate = AuthorizationGate::new(standard_registry_mappings());
    let chain = DispatcherChain::new(mailbox.clone())
        .with(Arc::new(ChannelDispatcher::new(gate.clone(), client.clone())));
    let watcher = HostWatcher::new(Arc::new(chain), gate, Duration::from_millis(10));

    for (group, target, id) in [
        ("family", "chat-fam", "m1"),
        ("family", "chat-main", "m2"),
        ("main", "chat-fam", "m3"),
    ] {
        let mut fields = serde_json::Map::new();
        fields.insert("requestId".into(), json!(id));
        fields.insert("channelId".into(), json!(target));
        fields.insert("text".into(), json!("hi"));
        ipc::enqueue(&mailbox.tasks_dir(group), "channel_send", fields)
            .await
            .unwrap();
    }

    assert_eq!(watcher.scan_once().await.unwrap(), 3);
    assert!(read_result(&mailbox, "family", "m1").await.success);
    assert!(!read_result(&mailbox, "family", "m2").await.success);
    assert!(read_result(&mailbox, "main", "m3").await.success);
    assert_eq!(client.sends.load(Ordering::SeqCst), 2);
}
