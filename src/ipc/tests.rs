use super::*;
use serde_json::json;

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn enqueue_publishes_json_without_tmp_leftovers() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("tasks");

    let name = enqueue(&dir, "message", fields(json!({"text": "hi"})))
        .await
        .unwrap();

    assert!(name.ends_with(".json"));
    let entries: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(entries, vec![name.clone()]);

    let doc: Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join(&name)).unwrap()).unwrap();
    assert_eq!(doc["type"], "message");
    assert_eq!(doc["text"], "hi");
    assert!(doc["timestamp"].as_str().is_some());
}

#[tokio::test]
async fn enqueue_generates_distinct_names() {
    let tmp = tempfile::tempdir().unwrap();
    let a = enqueue(tmp.path(), "message", Map::new()).await.unwrap();
    let b = enqueue(tmp.path(), "message", Map::new()).await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn await_result_reads_and_deletes() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("results");
    write_result(&results, "req-1", &IpcResult::ok("sent"))
        .await
        .unwrap();

    let result = await_result(
        &results,
        "req-1",
        Duration::from_secs(1),
        Duration::from_millis(10),
    )
    .await;
    assert_eq!(result, IpcResult::ok("sent"));
    assert!(!results.join("req-1.json").exists());
}

#[tokio::test]
async fn await_result_sees_late_writer() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("results");
    let writer_dir = results.clone();
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        write_result(&writer_dir, "req-late", &IpcResult::failure("denied"))
            .await
            .unwrap();
    });

    let result = await_result(
        &results,
        "req-late",
        Duration::from_secs(2),
        Duration::from_millis(10),
    )
    .await;
    writer.await.unwrap();
    assert_eq!(result, IpcResult::failure("denied"));
    assert!(!results.join("req-late.json").exists());
}

#[tokio::test]
async fn await_result_times_out() {
    let tmp = tempfile::tempdir().unwrap();
    let started = std::time::Instant::now();
    let result = await_result(
        tmp.path(),
        "req-missing",
        Duration::from_millis(60),
        Duration::from_millis(10),
    )
    .await;
    assert!(!result.success);
    assert_eq!(result.message, TIMEOUT_MESSAGE);
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn result_written_after_timeout_stays_orphaned() {
    let tmp = tempfile::tempdir().unwrap();
    let results = tmp.path().join("results");

    let result = await_result(
        &results,
        "req-slow",
        Duration::from_millis(30),
        Duration::from_millis(10),
    )
    .await;
    assert_eq!(result, IpcResult::failure(TIMEOUT_MESSAGE));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let path = write_result(&results, "req-slow", &IpcResult::ok("sent"))
        .await
        .unwrap();

    // Nobody is waiting any more; the reply persists until someone reads it
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(path.exists());
    let late: IpcResult = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(late, IpcResult::ok("sent"));
}

#[tokio::test]
async fn await_result_reports_parse_failure_without_retry() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("req-bad.json"), "{not json").unwrap();

    let result = await_result(
        tmp.path(),
        "req-bad",
        Duration::from_secs(1),
        Duration::from_millis(10),
    )
    .await;
    assert!(!result.success);
    assert!(result.message.starts_with("Failed to read result: "));
}

#[tokio::test]
async fn write_result_rejects_path_like_ids() {
    let tmp = tempfile::tempdir().unwrap();
    for id in ["../escape", "a/b", "", ".hidden"] {
        assert!(
            write_result(tmp.path(), id, &IpcResult::ok("x")).await.is_err(),
            "should reject {:?}",
            id
        );
    }
}

#[tokio::test]
async fn list_pending_skips_tmp_and_sorts() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("200-b.json"), "{}").unwrap();
    std::fs::write(tmp.path().join("100-a.json"), "{}").unwrap();
    std::fs::write(tmp.path().join("150-c.json.tmp"), "{").unwrap();

    let pending = list_pending(tmp.path()).await.unwrap();
    let names: Vec<_> = pending
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec!["100-a.json", "200-b.json"]);
}

#[tokio::test]
async fn list_pending_missing_dir_is_empty() {
    let tmp = tempfile::tempdir().unwrap();
    assert!(list_pending(&tmp.path().join("nope")).await.unwrap().is_empty());
}

#[test]
fn request_envelope_accepts_is_main_alias() {
    let req: TaskRequest = serde_json::from_value(json!({
        "type": "channel_send",
        "requestId": "req-1",
        "sourceGroup": "main",
        "isMain": true,
        "channelId": "C1",
        "text": "hello"
    }))
    .unwrap();
    assert_eq!(req.kind, "channel_send");
    assert_eq!(req.request_id.as_deref(), Some("req-1"));
    assert!(req.is_privileged);
    assert_eq!(req.str_field("channelId"), Some("C1"));
    assert_eq!(req.str_field("missing"), None);
}

#[test]
fn request_ids_are_unique_and_valid() {
    let a = new_request_id();
    let b = new_request_id();
    assert_ne!(a, b);
    assert!(is_valid_request_id(&a));
}

#[test]
fn mailbox_layout() {
    let mb = Mailbox::new("/data");
    assert_eq!(mb.tasks_dir("g1"), PathBuf::from("/data/ipc/g1/tasks"));
    assert_eq!(mb.results_dir("g1"), PathBuf::from("/data/ipc/g1/results"));
    assert_eq!(mb.errors_dir(), PathBuf::from("/data/ipc/errors"));
}
