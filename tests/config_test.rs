//! Integration tests for configuration loading

use ru_monitor::domain::Thresholds;
use ru_monitor::infra::{Config, SinkMode, StatsMode};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut temp_file = NamedTempFile::new().unwrap();

    let config_content = r#"
[site]
id = "ru-sede"
name = "RU Sede"

[refresh]
interval_ms = 15000

[stats]
mode = "http"
http_url = "http://backend.local/stats"
timeout_ms = 2500
mock_delay_ms = 0

[classification]
min_contributors = 5
yellow_threshold_minutes = 8.0
red_threshold_minutes = 25.0
max_valid_wait_minutes = 120.0

[events]
sink = "file"
file = "data/events.jsonl"
channel_capacity = 32

[server]
port = 9090

[metrics]
interval_secs = 15
"#;

    temp_file.write_all(config_content.as_bytes()).unwrap();
    temp_file.flush().unwrap();

    let config = Config::from_file(temp_file.path()).unwrap();

    assert_eq!(config.site_id(), "ru-sede");
    assert_eq!(config.site_name(), "RU Sede");
    assert_eq!(config.refresh_interval_ms(), 15_000);
    assert_eq!(config.stats_mode(), StatsMode::Http);
    assert_eq!(config.stats_http_url(), "http://backend.local/stats");
    assert_eq!(config.stats_timeout_ms(), 2500);
    assert_eq!(config.mock_delay_ms(), 0);
    assert_eq!(
        config.thresholds(),
        Thresholds { min_contributors: 5, yellow_minutes: 8.0, red_minutes: 25.0 }
    );
    assert_eq!(config.max_valid_wait_minutes(), 120.0);
    assert_eq!(config.sink_mode(), SinkMode::File);
    assert_eq!(config.events_file(), "data/events.jsonl");
    assert_eq!(config.events_channel_capacity(), 32);
    assert_eq!(config.server_port(), 9090);
    assert_eq!(config.metrics_interval_secs(), 15);
}

#[test]
fn test_load_from_path_fallback() {
    let config = Config::load_from_path("/nonexistent/config.toml");
    assert_eq!(config.site_id(), "ru");
    assert_eq!(config.refresh_interval_ms(), 30_000);
    assert_eq!(config.stats_mode(), StatsMode::Mock);
    assert_eq!(config.sink_mode(), SinkMode::Log);
    assert_eq!(config.config_file(), "default");
}

#[test]
fn test_invalid_toml_falls_back_to_defaults() {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(b"[stats]\nmode = \"carrier-pigeon\"\n").unwrap();
    temp_file.flush().unwrap();

    assert!(Config::from_file(temp_file.path()).is_err());
    let config = Config::load_from_path(temp_file.path());
    assert_eq!(config.stats_mode(), StatsMode::Mock);
}

#[test]
fn test_resolve_config_path_from_args() {
    let args = vec!["ru-monitor".to_string(), "--config".to_string(), "a.toml".to_string()];
    assert_eq!(Config::resolve_config_path(&args), "a.toml");

    let args = vec!["ru-monitor".to_string(), "--config=b.toml".to_string()];
    assert_eq!(Config::resolve_config_path(&args), "b.toml");
}

#[test]
fn test_shipped_dev_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
    let config = Config::from_file(path).unwrap();
    assert_eq!(config.thresholds(), Thresholds::default());
    assert_eq!(config.max_valid_wait_minutes(), 180.0);
}
