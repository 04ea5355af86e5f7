//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::Thresholds;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Where queue snapshots come from
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsMode {
    /// Daypart-based synthetic statistics
    Mock,
    /// Snapshot JSON fetched from a backend
    Http,
}

/// Where completed legs are submitted
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkMode {
    Log,
    File,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "ru-sede")
    #[serde(default = "default_site_id")]
    pub id: String,
    /// Name shown in the header
    #[serde(default = "default_site_name")]
    pub name: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id(), name: default_site_name() }
    }
}

fn default_site_id() -> String {
    "ru".to_string()
}

fn default_site_name() -> String {
    "RU Monitor".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_refresh_interval_ms")]
    pub interval_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { interval_ms: default_refresh_interval_ms() }
    }
}

fn default_refresh_interval_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsConfig {
    #[serde(default = "default_stats_mode")]
    pub mode: StatsMode,
    #[serde(default = "default_stats_http_url")]
    pub http_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Artificial latency of the mock source
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            mode: default_stats_mode(),
            http_url: default_stats_http_url(),
            timeout_ms: default_timeout_ms(),
            mock_delay_ms: default_mock_delay_ms(),
        }
    }
}

fn default_stats_mode() -> StatsMode {
    StatsMode::Mock
}

fn default_stats_http_url() -> String {
    "http://127.0.0.1:8080/stats".to_string()
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_mock_delay_ms() -> u64 {
    800
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassificationConfig {
    #[serde(default = "default_min_contributors")]
    pub min_contributors: u32,
    #[serde(default = "default_yellow_threshold")]
    pub yellow_threshold_minutes: f64,
    #[serde(default = "default_red_threshold")]
    pub red_threshold_minutes: f64,
    /// Reported legs longer than this are discarded
    #[serde(default = "default_max_valid_wait")]
    pub max_valid_wait_minutes: f64,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            min_contributors: default_min_contributors(),
            yellow_threshold_minutes: default_yellow_threshold(),
            red_threshold_minutes: default_red_threshold(),
            max_valid_wait_minutes: default_max_valid_wait(),
        }
    }
}

fn default_min_contributors() -> u32 {
    10
}

fn default_yellow_threshold() -> f64 {
    10.0
}

fn default_red_threshold() -> f64 {
    20.0
}

fn default_max_valid_wait() -> f64 {
    180.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default = "default_sink_mode")]
    pub sink: SinkMode,
    /// File path for queue events (JSONL format)
    #[serde(default = "default_events_file")]
    pub file: String,
    #[serde(default = "default_events_http_url")]
    pub http_url: String,
    /// Bounded channel between tracker and submission worker
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            sink: default_sink_mode(),
            file: default_events_file(),
            http_url: default_events_http_url(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_sink_mode() -> SinkMode {
    SinkMode::Log
}

fn default_events_file() -> String {
    "queue_events.jsonl".to_string()
}

fn default_events_http_url() -> String {
    "http://127.0.0.1:8080/events".to_string()
}

fn default_channel_capacity() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP port for /stats, /events, /metrics (0 to disable)
    #[serde(default = "default_server_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: default_server_port() }
    }
}

fn default_server_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub classification: ClassificationConfig,
    #[serde(default)]
    pub events: EventsConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    site_name: String,
    refresh_interval_ms: u64,
    stats_mode: StatsMode,
    stats_http_url: String,
    stats_timeout_ms: u64,
    mock_delay_ms: u64,
    thresholds: Thresholds,
    max_valid_wait_minutes: f64,
    sink_mode: SinkMode,
    events_file: String,
    events_http_url: String,
    events_channel_capacity: usize,
    server_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let classification = toml_config.classification;
        Self {
            site_id: toml_config.site.id,
            site_name: toml_config.site.name,
            refresh_interval_ms: toml_config.refresh.interval_ms,
            stats_mode: toml_config.stats.mode,
            stats_http_url: toml_config.stats.http_url,
            stats_timeout_ms: toml_config.stats.timeout_ms,
            mock_delay_ms: toml_config.stats.mock_delay_ms,
            thresholds: Thresholds {
                min_contributors: classification.min_contributors,
                yellow_minutes: classification.yellow_threshold_minutes,
                red_minutes: classification.red_threshold_minutes,
            },
            max_valid_wait_minutes: classification.max_valid_wait_minutes,
            sink_mode: toml_config.events.sink,
            events_file: toml_config.events.file,
            events_http_url: toml_config.events.http_url,
            events_channel_capacity: toml_config.events.channel_capacity.max(1),
            server_port: toml_config.server.port,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration from a path, falling back to defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn site_name(&self) -> &str {
        &self.site_name
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        self.refresh_interval_ms
    }

    pub fn stats_mode(&self) -> StatsMode {
        self.stats_mode
    }

    pub fn stats_http_url(&self) -> &str {
        &self.stats_http_url
    }

    pub fn stats_timeout_ms(&self) -> u64 {
        self.stats_timeout_ms
    }

    pub fn mock_delay_ms(&self) -> u64 {
        self.mock_delay_ms
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn max_valid_wait_minutes(&self) -> f64 {
        self.max_valid_wait_minutes
    }

    pub fn sink_mode(&self) -> SinkMode {
        self.sink_mode
    }

    pub fn events_file(&self) -> &str {
        &self.events_file
    }

    pub fn events_http_url(&self) -> &str {
        &self.events_http_url
    }

    pub fn events_channel_capacity(&self) -> usize {
        self.events_channel_capacity
    }

    pub fn server_port(&self) -> u16 {
        self.server_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to skip the mock latency
    pub fn with_mock_delay_ms(mut self, ms: u64) -> Self {
        self.mock_delay_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "ru");
        assert_eq!(config.refresh_interval_ms(), 30_000);
        assert_eq!(config.stats_mode(), StatsMode::Mock);
        assert_eq!(config.mock_delay_ms(), 800);
        assert_eq!(config.thresholds(), Thresholds::default());
        assert_eq!(config.max_valid_wait_minutes(), 180.0);
        assert_eq!(config.sink_mode(), SinkMode::Log);
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str("").unwrap();
        let config = Config::from_toml(toml_config, "empty.toml");
        assert_eq!(config.refresh_interval_ms(), 30_000);
        assert_eq!(config.events_file(), "queue_events.jsonl");
        assert_eq!(config.config_file(), "empty.toml");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[classification]
red_threshold_minutes = 30.0
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "partial.toml");
        assert_eq!(config.thresholds().red_minutes, 30.0);
        assert_eq!(config.thresholds().yellow_minutes, 10.0);
        assert_eq!(config.thresholds().min_contributors, 10);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let toml_config: TomlConfig = toml::from_str("[events]\nchannel_capacity = 0\n").unwrap();
        let config = Config::from_toml(toml_config, "x.toml");
        assert_eq!(config.events_channel_capacity(), 1);
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> =
            vec!["ru-monitor".to_string(), "--config".to_string(), "config/sede.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/sede.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["ru-monitor".to_string(), "--config=config/cabo.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/cabo.toml");
    }
}
