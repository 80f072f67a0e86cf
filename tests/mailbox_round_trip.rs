mod common;

use async_trait::async_trait;
use common::{
    MockLLMProvider, agent_context, create_test_agent, standard_registry_mappings, text_response,
    tool_call, tool_response,
};
use hostbridge::auth::{AuthorizationGate, DENY_NOT_OWNER};
use hostbridge::dispatch::{
    ChannelClient, ChannelDispatcher, DispatcherChain, HostWatcher, MessageDispatcher,
};
use hostbridge::ipc::{self, Mailbox};
use hostbridge::providers::base::Role;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

#[derive(Default)]
struct RecordingClient {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChannelClient for RecordingClient {
    async fn send_text(&self, channel_id: &str, text: &str) -> anyhow::Result<String> {
        self.sent
            .lock()
            .unwrap()
            .push((channel_id.to_string(), text.to_string()));
        Ok(format!("Posted to {}", channel_id))
    }
}

/// Runs a host over `tmp` until the returned sender is dropped.
fn start_host(tmp: &TempDir, client: Arc<RecordingClient>) -> watch::Sender<bool> {
    let registry = standard_registry_mappings();
    let gate = AuthorizationGate::new(registry);
    let chain = DispatcherChain::new(Mailbox::new(tmp.path()))
        .with(Arc::new(ChannelDispatcher::new(gate.clone(), client.clone())))
        .with(Arc::new(MessageDispatcher::new(gate.clone(), client)));
    let watcher = HostWatcher::new(Arc::new(chain), gate, Duration::from_millis(10));
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move { watcher.run(rx).await });
    tx
}

fn last_tool_message(calls: &[common::RecordedCall]) -> String {
    calls
        .last()
        .and_then(|c| c.messages.iter().rev().find(|m| m.role == Role::Tool))
        .map(|m| m.text().to_string())
        .unwrap_or_default()
}

#[tokio::test]
async fn channel_send_round_trips_through_host() {
    let tmp = TempDir::new().unwrap();
    let client = Arc::new(RecordingClient::default());
    let _host = start_host(&tmp, client.clone());

    let provider = MockLLMProvider::with_responses(vec![
        tool_response(vec![tool_call(
            "tc1",
            "channel_send",
            json!({"channel_id": "chat-fam", "text": "dinner at 7"}),
        )]),
        text_response("Posted it."),
    ]);
    let calls = provider.calls.clone();
    let agent = create_test_agent(provider, &tmp);
    let ctx = agent_context(&tmp, "family", false, "chat-fam");

    let reply = agent.run(&ctx, "s1", "tell everyone dinner is at 7").await.unwrap();
    assert_eq!(reply.text, "Posted it.");
    assert_eq!(
        client.sent.lock().unwrap().as_slice(),
        &[("chat-fam".to_string(), "dinner at 7".to_string())]
    );
    assert_eq!(last_tool_message(&calls.lock().unwrap()), "Posted to chat-fam");

    // The waiter consumed its result and the host consumed the request
    let results = Mailbox::new(tmp.path()).results_dir("family");
    assert!(std::fs::read_dir(&results).unwrap().next().is_none());
    assert!(
        ipc::list_pending(&Mailbox::new(tmp.path()).tasks_dir("family"))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn foreign_channel_is_denied_and_reported_to_model() {
    let tmp = TempDir::new().unwrap();
    let client = Arc::new(RecordingClient::default());
    let _host = start_host(&tmp, client.clone());

    let provider = MockLLMProvider::with_responses(vec![
        tool_response(vec![tool_call(
            "tc1",
            "channel_send",
            json!({"channel_id": "chat-main", "text": "psst"}),
        )]),
        text_response("I can't post there."),
    ]);
    let calls = provider.calls.clone();
    let agent = create_test_agent(provider, &tmp);
    let ctx = agent_context(&tmp, "family", false, "chat-fam");

    agent.run(&ctx, "s1", "post to main").await.unwrap();
    assert!(client.sent.lock().unwrap().is_empty());
    assert_eq!(last_tool_message(&calls.lock().unwrap()), DENY_NOT_OWNER);
}

#[tokio::test]
async fn round_trip_without_host_times_out() {
    let tmp = TempDir::new().unwrap();
    let provider = MockLLMProvider::with_responses(vec![
        tool_response(vec![tool_call(
            "tc1",
            "channel_send",
            json!({"channel_id": "chat-fam", "text": "anyone?"}),
        )]),
        text_response("The host did not answer."),
    ]);
    let calls = provider.calls.clone();
    let agent = create_test_agent(provider, &tmp);
    let ctx = agent_context(&tmp, "family", false, "chat-fam")
        .with_timeouts(Duration::from_millis(50), Duration::from_millis(10));

    let reply = agent.run(&ctx, "s1", "post").await.unwrap();
    assert_eq!(reply.text, "The host did not answer.");
    assert_eq!(last_tool_message(&calls.lock().unwrap()), ipc::TIMEOUT_MESSAGE);
}

#[tokio::test]
async fn fire_and_forget_message_is_delivered_without_result_file() {
    let tmp = TempDir::new().unwrap();
    let client = Arc::new(RecordingClient::default());
    let _host = start_host(&tmp, client.clone());

    let provider = MockLLMProvider::with_responses(vec![
        tool_response(vec![tool_call("tc1", "send_message", json!({"text": "working on it"}))]),
        text_response("Done."),
    ]);
    let agent = create_test_agent(provider, &tmp);
    let ctx = agent_context(&tmp, "family", false, "chat-fam");
    agent.run(&ctx, "s1", "do the thing").await.unwrap();

    let mut delivered = false;
    for _ in 0..200 {
        if !client.sent.lock().unwrap().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(delivered, "host never delivered the message");
    assert_eq!(
        client.sent.lock().unwrap()[0],
        ("chat-fam".to_string(), "working on it".to_string())
    );
    let results = Mailbox::new(tmp.path()).results_dir("family");
    assert!(!results.exists() || std::fs::read_dir(&results).unwrap().next().is_none());
}
