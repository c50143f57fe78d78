//! Tests for CLI configuration loading.

use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_defaults_match_client_defaults() {
    let config = CliConfig::default();

    let client = config.client.to_client_config().unwrap();

    assert_eq!(client, ClientConfig::default());
    assert_eq!(config.logging.format, LogFormat::Text);
    assert_eq!(config.output.format, OutputFormat::Text);
    assert_eq!(config.store.directory, None);
}

#[test]
fn test_missing_optional_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let config = load_from(Some(&path), false, "BUS_LENS_TEST_ABSENT").unwrap();

    assert_eq!(config, CliConfig::default());
}

#[test]
fn test_missing_explicit_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("absent.toml");

    let result = load_configuration(Some(&path));

    assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
}

#[test]
fn test_file_values_override_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r#"
[client]
relay_url = "http://localhost:3001/proxy"
request_timeout_seconds = 10

[logging]
level = "debug"
format = "json"

[output]
format = "json"

[store]
directory = "/tmp/bus-lens-store"
"#,
    )
    .unwrap();

    let config = load_from(Some(&path), true, "BUS_LENS_TEST_FILE").unwrap();

    assert_eq!(
        config.client.relay_url.as_deref(),
        Some("http://localhost:3001/proxy")
    );
    assert_eq!(config.client.request_timeout_seconds, 10);
    assert_eq!(config.client.api_version, "2021-05");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.output.format, OutputFormat::Json);
    assert_eq!(
        config.store.resolve_directory(),
        PathBuf::from("/tmp/bus-lens-store")
    );
}

#[test]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
    std::env::set_var("BUS_LENS_TEST_ENV__LOGGING__LEVEL", "trace");

    let config = load_from(Some(&path), true, "BUS_LENS_TEST_ENV").unwrap();

    std::env::remove_var("BUS_LENS_TEST_ENV__LOGGING__LEVEL");
    assert_eq!(config.logging.level, "trace");
}

#[test]
fn test_malformed_file_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[client\nrelay_url = ").unwrap();

    let result = load_from(Some(&path), true, "BUS_LENS_TEST_MALFORMED");

    assert!(matches!(result, Err(ConfigError::Load(_))));
}

#[test]
fn test_invalid_client_settings_are_rejected() {
    let settings = ClientSettings {
        relay_url: Some("ftp://relay".to_string()),
        ..Default::default()
    };

    assert!(matches!(
        settings.to_client_config(),
        Err(ConfigError::InvalidClient(_))
    ));
}

#[test]
fn test_blank_relay_means_direct() {
    let settings = ClientSettings {
        relay_url: Some("  ".to_string()),
        ..Default::default()
    };

    assert_eq!(settings.to_client_config().unwrap().relay_url, None);
}
