use robun_config::ConfigLoader;

#[test]
fn load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("robun.toml");
    std::fs::write(
        &path,
        r#"
[agents]
model = "gpt-4o-mini"
memory_window = 12

[tools]
exec_timeout_secs = 5

[providers.openai]
api_key = "sk-test"

[channels.telegram]
enabled = true
allow_from = ["42"]
token = "tg-token"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load(Some(&path)).unwrap();
    assert_eq!(config.agents.model, "gpt-4o-mini");
    assert_eq!(config.agents.memory_window, 12);
    assert_eq!(config.tools.exec_timeout_secs, 5);
    assert_eq!(
        config.providers["openai"].api_key.as_deref(),
        Some("sk-test")
    );
    let tg = &config.channels["telegram"];
    assert!(tg.enabled);
    assert_eq!(tg.allow_from, vec!["42"]);
    assert_eq!(tg.settings["token"], serde_json::json!("tg-token"));
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("does-not-exist.toml");
    let config = ConfigLoader::load(Some(&path)).unwrap();
    assert_eq!(config.agents.max_tool_iterations, 20);
    assert!(config.heartbeat.enabled);
}

#[test]
fn invalid_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("robun.toml");
    std::fs::write(&path, "agents = \"not a table\"").unwrap();
    assert!(ConfigLoader::load(Some(&path)).is_err());
}
