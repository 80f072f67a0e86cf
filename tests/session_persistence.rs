mod common;

use common::{
    MockLLMProvider, RecordedCall, agent_context, create_test_agent, text_response, tool_call,
    tool_response,
};
use hostbridge::providers::base::Role;
use hostbridge::session::{SESSION_WINDOW, SessionManager};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

async fn run_turns(tmp: &TempDir, turns: usize) -> Arc<Mutex<Vec<RecordedCall>>> {
    let provider = MockLLMProvider::with_responses(Vec::new());
    let calls = provider.calls.clone();
    let agent = create_test_agent(provider, tmp);
    let ctx = agent_context(tmp, "family", false, "chat-fam");
    for i in 0..turns {
        agent
            .run(&ctx, "chat", &format!("message {}", i))
            .await
            .unwrap();
    }
    calls
}

#[tokio::test]
async fn short_history_is_replayed_in_full() {
    let tmp = TempDir::new().unwrap();
    let calls = run_turns(&tmp, 6).await;
    let calls = calls.lock().unwrap();

    // Turn 6 sees system + 5 earlier turns (user + assistant each) + the new user message
    let last = calls.last().unwrap();
    assert_eq!(last.messages.len(), 1 + 10 + 1);
    assert_eq!(last.messages[0].role, Role::System);
    assert_eq!(last.messages[1].text(), "message 0");
    assert_eq!(last.messages.last().unwrap().text(), "message 5");
}

#[tokio::test]
async fn long_history_is_windowed_but_kept_on_disk() {
    let tmp = TempDir::new().unwrap();
    let turns = 16;
    let calls = run_turns(&tmp, turns).await;
    let last = calls.lock().unwrap().last().cloned().unwrap();

    assert_eq!(last.messages.len(), 1 + SESSION_WINDOW + 1);
    // 15 earlier turns = 30 messages; the window keeps the last 20, starting at turn 5
    assert_eq!(last.messages[1].text(), "message 5");
    assert_eq!(last.messages[1].role, Role::User);

    let sessions = SessionManager::new(tmp.path().join("sessions"));
    let session = sessions.get_or_create("family", "chat").await.unwrap();
    assert_eq!(session.messages.len(), turns * 2);
    assert_eq!(session.messages[0].text(), "message 0");
}

#[tokio::test]
async fn sessions_are_isolated_per_group() {
    let tmp = TempDir::new().unwrap();
    let agent = create_test_agent(MockLLMProvider::with_responses(Vec::new()), &tmp);
    let family = agent_context(&tmp, "family", false, "chat-fam");
    let main = agent_context(&tmp, "main", true, "chat-main");

    agent.run(&family, "chat", "family secret").await.unwrap();
    agent.run(&main, "chat", "main note").await.unwrap();

    let sessions = SessionManager::new(tmp.path().join("sessions"));
    let fam = sessions.get_or_create("family", "chat").await.unwrap();
    let mn = sessions.get_or_create("main", "chat").await.unwrap();
    assert_eq!(fam.messages[0].text(), "family secret");
    assert_eq!(mn.messages[0].text(), "main note");
    assert_eq!(fam.messages.len(), 2);
}

#[tokio::test]
async fn window_starting_on_a_tool_result_still_replays_twenty() {
    let tmp = TempDir::new().unwrap();
    // 6 tool turns (user, assistant call, tool, assistant) and 2 plain turns
    let mut responses = Vec::new();
    for i in 0..6 {
        responses.push(tool_response(vec![tool_call(
            &format!("tc{}", i),
            "list_tasks",
            json!({}),
        )]));
        responses.push(text_response(&format!("answer {}", i)));
    }
    responses.push(text_response("plain"));
    responses.push(text_response("last"));
    let provider = MockLLMProvider::with_responses(responses);
    let calls = provider.calls.clone();
    let agent = create_test_agent(provider, &tmp);
    let ctx = agent_context(&tmp, "family", false, "chat-fam");
    for i in 0..8 {
        agent
            .run(&ctx, "chat", &format!("message {}", i))
            .await
            .unwrap();
    }

    // 26 stored before the last turn; the newest 20 start at a tool result
    let last = calls.lock().unwrap().last().cloned().unwrap();
    assert_eq!(last.messages.len(), 1 + SESSION_WINDOW + 1);
    assert_eq!(last.messages[1].role, Role::Tool);

    let sessions = SessionManager::new(tmp.path().join("sessions"));
    let session = sessions.get_or_create("family", "chat").await.unwrap();
    assert_eq!(session.messages.len(), 6 * 4 + 2 * 2);
}
