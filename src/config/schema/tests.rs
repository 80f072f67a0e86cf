use super::*;

#[test]
fn test_default_config_validates() {
    let config = Config::default();
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_json_uses_defaults() {
    let config: Config = serde_json::from_str("{}").unwrap();
    assert_eq!(config.ipc.poll_interval_ms, 500);
    assert_eq!(config.ipc.result_timeout_ms, 30_000);
    assert_eq!(config.agent.max_tokens, 4096);
    assert_eq!(config.provider.api_base, DEFAULT_API_BASE);
    assert!(config.registry.watch);
    assert!(config.channels.webhook_url.is_none());
}

#[test]
fn test_camel_case_keys() {
    let config: Config = serde_json::from_value(serde_json::json!({
        "dataDir": "/srv/hostbridge",
        "registry": {"mappingsFile": "/etc/hostbridge/mappings.json", "watch": false},
        "ipc": {"pollIntervalMs": 100, "resultTimeoutMs": 5000, "hostScanIntervalMs": 250},
        "agent": {"model": "llama-3.3-70b", "maxTokens": 1024, "systemPrompt": "Be brief."},
        "provider": {"apiKey": "sk-test", "apiBase": "http://localhost:8080/v1"},
        "channels": {"webhookUrl": "https://hooks.example.com/x", "webhookTimeoutSecs": 5}
    }))
    .unwrap();
    assert_eq!(config.data_dir_path(), PathBuf::from("/srv/hostbridge"));
    assert_eq!(
        config.mappings_path(),
        PathBuf::from("/etc/hostbridge/mappings.json")
    );
    assert!(!config.registry.watch);
    assert_eq!(config.ipc.host_scan_interval(), Duration::from_millis(250));
    assert_eq!(config.agent.system_prompt.as_deref(), Some("Be brief."));
    assert_eq!(config.provider.api_key, "sk-test");
    assert_eq!(config.channels.webhook_timeout_secs, 5);
    assert!(config.validate().is_ok());
}

#[test]
fn test_derived_paths_follow_data_dir() {
    let config = Config {
        data_dir: "/data".into(),
        ..Config::default()
    };
    assert_eq!(config.mappings_path(), PathBuf::from("/data/mappings.json"));
    assert_eq!(config.sessions_dir(), PathBuf::from("/data/sessions"));
    assert_eq!(
        config.scheduled_tasks_path(),
        PathBuf::from("/data/scheduled_tasks.json")
    );
}

#[test]
fn test_invalid_zero_max_tokens() {
    let mut config = Config::default();
    config.agent.max_tokens = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_temperature() {
    for t in [-1.0, 3.0, f32::NAN] {
        let mut config = Config::default();
        config.agent.temperature = t;
        assert!(config.validate().is_err(), "temperature {} accepted", t);
    }
}

#[test]
fn test_invalid_zero_poll_interval() {
    let mut config = Config::default();
    config.ipc.poll_interval_ms = 0;
    let err = config.validate().unwrap_err();
    assert!(matches!(err, HostbridgeError::Config(_)));
    assert!(err.to_string().contains("pollIntervalMs"));
}

#[test]
fn test_result_timeout_shorter_than_poll_rejected() {
    let mut config = Config::default();
    config.ipc.result_timeout_ms = 100;
    config.ipc.poll_interval_ms = 500;
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_api_base() {
    let mut config = Config::default();
    config.provider.api_base = "api.openai.com".into();
    assert!(config.validate().is_err());
}

#[test]
fn test_invalid_webhook_url_not_echoed() {
    let mut config = Config::default();
    config.channels.webhook_url = Some("ftp://secret-token@host".into());
    let err = config.validate().unwrap_err().to_string();
    assert!(!err.contains("secret-token"));
}

#[test]
fn test_debug_redacts_secrets() {
    let mut config = Config::default();
    config.provider.api_key = "sk-very-secret".into();
    config.channels.webhook_url = Some("https://hooks.example.com/token123".into());
    let debug = format!("{:?}", config);
    assert!(!debug.contains("sk-very-secret"));
    assert!(!debug.contains("token123"));
    assert!(debug.contains("[REDACTED]"));
}

#[test]
fn test_debug_shows_empty_key() {
    let debug = format!("{:?}", ProviderConfig::default());
    assert!(debug.contains("[empty]"));
}
