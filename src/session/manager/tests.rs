use super::*;
use proptest::prelude::*;

fn numbered(count: usize) -> Session {
    let mut session = Session::new("family", "s1");
    for i in 0..count {
        if i % 2 == 0 {
            session.push(Message::user(format!("msg {}", i)));
        } else {
            session.push(Message::assistant(Some(format!("msg {}", i)), None));
        }
    }
    session
}

proptest! {
    #[test]
    fn history_is_most_recent_window(count in 0..120usize) {
        let session = numbered(count);
        let history = session.history(SESSION_WINDOW);
        prop_assert_eq!(history.len(), count.min(SESSION_WINDOW));
        if let Some(last) = history.last() {
            prop_assert_eq!(last.text(), format!("msg {}", count - 1));
        }
    }
}

#[test]
fn history_window_may_start_on_a_tool_result() {
    let mut session = Session::new("family", "s1");
    session.push(Message::user("hi"));
    session.push(Message::tool_result("call_1", "listing"));
    session.push(Message::assistant(Some("ok".into()), None));
    let history = session.history(2);
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::Tool);
    assert_eq!(history[1].role, Role::Assistant);
}

#[tokio::test]
async fn missing_file_creates_empty_session() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(tmp.path());
    let session = manager.get_or_create("family", "s1").await.unwrap();
    assert!(session.messages.is_empty());
    assert_eq!(session.group, "family");
}

#[tokio::test]
async fn save_and_reload_keeps_every_message() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(tmp.path());
    manager.save(&numbered(25)).await.unwrap();

    let loaded = manager.get_or_create("family", "s1").await.unwrap();
    assert_eq!(loaded.messages.len(), 25);
    assert_eq!(loaded.history(SESSION_WINDOW).len(), 20);
    assert_eq!(loaded.history(SESSION_WINDOW)[0].text(), "msg 5");

    let raw: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(tmp.path().join("family").join("s1.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(raw["messages"].as_array().unwrap().len(), 25);
    assert!(raw["updatedAt"].is_string());
}

#[tokio::test]
async fn leading_system_message_is_not_persisted() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(tmp.path());
    let mut session = Session::new("family", "s1");
    session.push(Message::system("you are helpful"));
    session.push(Message::user("hi"));
    manager.save(&session).await.unwrap();

    let loaded = manager.get_or_create("family", "s1").await.unwrap();
    assert_eq!(loaded.messages.len(), 1);
    assert_eq!(loaded.messages[0].role, Role::User);
}

#[tokio::test]
async fn sessions_are_isolated_per_group() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(tmp.path());
    manager.save(&numbered(3)).await.unwrap();
    let other = manager.get_or_create("work", "s1").await.unwrap();
    assert!(other.messages.is_empty());
}

#[tokio::test]
async fn rejects_unsafe_keys() {
    let manager = SessionManager::new("/tmp/unused");
    assert!(manager.session_path("../etc", "s1").is_err());
    assert!(manager.session_path("family", "..").is_err());
    assert!(manager.session_path("family", "").is_err());
    assert!(manager.session_path("family", "a/b").is_err());
    assert!(manager.session_path("family", "a\\b").is_err());
    let path = manager.session_path("family", "a_b").unwrap();
    assert!(path.ends_with("family/a_b.json"));
}

#[tokio::test]
async fn separator_ids_do_not_alias_other_sessions() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(tmp.path());
    let mut session = manager.get_or_create("family", "a_b").await.unwrap();
    session.push(Message::user("kept apart"));
    manager.save(&session).await.unwrap();

    assert!(manager.get_or_create("family", "a/b").await.is_err());
    let reloaded = manager.get_or_create("family", "a_b").await.unwrap();
    assert_eq!(reloaded.messages.len(), 1);
}

#[tokio::test]
async fn corrupt_file_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(tmp.path());
    std::fs::create_dir_all(tmp.path().join("family")).unwrap();
    std::fs::write(tmp.path().join("family").join("s1.json"), "{oops").unwrap();
    assert!(manager.get_or_create("family", "s1").await.is_err());
}
