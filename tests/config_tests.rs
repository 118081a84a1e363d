//! Configuration module tests

use imagerelay::adapters::ApiType;
use imagerelay::config::{AppConfig, Settings};
use imagerelay::services::ChannelRouter;
use std::env;
use std::io::Write;
use std::sync::Mutex;
use tempfile::NamedTempFile;

/// Environment variables are process-wide; tests touching them take this lock
static ENV_LOCK: Mutex<()> = Mutex::new(());

const ENV_VARS: [&str; 7] = [
    "PASS_THROUGH_REQUEST_ENABLED",
    "DEBUG_ENABLED",
    "UPSTREAM_TIMEOUT",
    "MULTIPART_TIMEOUT",
    "MAX_REQUEST_SIZE",
    "RUST_LOG",
    "LOG_FORMAT",
];

/// Clean up test environment variables
fn cleanup_test_env() {
    for var in &ENV_VARS {
        env::remove_var(var);
    }
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_settings_defaults() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_test_env();

    let settings = Settings::new().unwrap();
    assert!(!settings.relay.pass_through_request_enabled);
    assert!(!settings.relay.debug_enabled);
    assert_eq!(settings.relay.upstream_timeout, 300);
    assert_eq!(settings.relay.multipart_timeout, 30);
    assert_eq!(settings.request.max_request_size, 32 * 1024 * 1024);
    assert_eq!(settings.logging.format, "text");
}

#[test]
fn test_settings_from_env() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    cleanup_test_env();
    env::set_var("PASS_THROUGH_REQUEST_ENABLED", "true");
    env::set_var("DEBUG_ENABLED", "true");
    env::set_var("UPSTREAM_TIMEOUT", "120");
    env::set_var("MULTIPART_TIMEOUT", "5");
    env::set_var("MAX_REQUEST_SIZE", "1048576");
    env::set_var("LOG_FORMAT", "json");

    let settings = Settings::new().unwrap();
    assert!(settings.relay.pass_through_request_enabled);
    assert!(settings.relay.debug_enabled);
    assert_eq!(settings.relay.upstream_timeout().as_secs(), 120);
    assert_eq!(settings.relay.multipart_timeout().as_secs(), 5);
    assert_eq!(settings.request.max_request_size, 1048576);
    assert_eq!(settings.logging.format, "json");

    cleanup_test_env();
}

#[test]
fn test_settings_rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());

    let cases = [
        ("UPSTREAM_TIMEOUT", "0", "Timeout values cannot be 0"),
        ("UPSTREAM_TIMEOUT", "soon", "Invalid upstream timeout"),
        ("PASS_THROUGH_REQUEST_ENABLED", "yes", "Invalid PASS_THROUGH_REQUEST_ENABLED flag"),
        ("MAX_REQUEST_SIZE", "0", "Maximum request size cannot be 0"),
        ("LOG_FORMAT", "xml", "Invalid log format"),
    ];

    for (var, value, message) in cases {
        cleanup_test_env();
        env::set_var(var, value);

        let error = Settings::new().unwrap_err();
        assert!(
            format!("{:#}", error).contains(message),
            "{}={} gave: {:#}",
            var,
            value,
            error
        );
    }

    cleanup_test_env();
}

#[test]
fn test_load_channel_config() {
    let file = write_config(
        r#"{
            "server": {"host": "0.0.0.0", "port": 9000},
            "channels": {
                "openai": {
                    "type": "openai",
                    "baseUrl": "https://api.openai.com/v1",
                    "models": ["dall-e-3"],
                    "modelMapping": {"dall-e-3": "gpt-image-1"},
                    "paramOverride": {"operations": [{"path": "moderation", "mode": "set", "value": "low"}]},
                    "statusCodeMapping": "{\"429\": \"503\"}",
                    "passThroughBody": true
                }
            },
            "tokens": [{"key": "sk-1", "id": "tok-1", "userId": "user-1"}]
        }"#,
    );

    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 9000);

    let channel = &config.channels["openai"];
    assert_eq!(channel.api_type, ApiType::OpenAi);
    assert!(channel.pass_through_body);
    assert!(channel.param_override.contains_key("operations"));

    let router = ChannelRouter::new(&config);
    let routed = router.route("dall-e-3").unwrap();
    assert!(routed.settings.pass_through_body_enabled);
    assert_eq!(routed.settings.model_mapping["dall-e-3"], "gpt-image-1");
    assert!(!routed.settings.status_code_mapping.is_empty());

    assert_eq!(config.find_token("sk-1").unwrap().user_id, "user-1");
}

#[test]
fn test_server_defaults() {
    let file = write_config(
        r#"{"channels": {"a": {"type": "ark", "baseUrl": "https://ark.example.com", "models": ["m"]}}}"#,
    );

    let config = AppConfig::load(file.path()).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8082);
    assert!(config.tokens.is_empty());
}

#[test]
fn test_invalid_configs_are_rejected() {
    let cases = [
        r#"{"channels": {}}"#,
        r#"{"channels": {"a": {"type": "openai", "baseUrl": "ftp://x", "models": ["m"]}}}"#,
        r#"{"channels": {"a": {"type": "openai", "baseUrl": "https://x", "models": []}}}"#,
        r#"{"channels": {"a": {"type": "gemini", "baseUrl": "https://x", "models": ["m"]}}}"#,
        r#"{"channels": {"a": {"type": "openai", "baseUrl": "https://x", "models": ["m"], "statusCodeMapping": "[1]"}}}"#,
        r#"{"channels": {"a": {"type": "openai", "baseUrl": "https://x", "models": ["m"]}},
            "tokens": [{"key": "k", "id": "1", "userId": "u"}, {"key": "k", "id": "2", "userId": "u"}]}"#,
        "not json",
    ];

    for content in cases {
        let file = write_config(content);
        assert!(AppConfig::load(file.path()).is_err(), "accepted: {}", content);
    }
}

#[test]
fn test_missing_config_file() {
    let result = AppConfig::load(std::path::Path::new("/nonexistent/imagerelay.json"));
    assert!(result.is_err());
}
