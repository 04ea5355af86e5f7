//! Pick the stats source and event sink named in config

use crate::infra::config::{Config, SinkMode, StatsMode};
use crate::io::egress::{FileEventSink, LogEventSink};
use crate::io::http_client::{HttpEventSink, HttpStatsSource};
use crate::services::estimator::{MockStatsSource, StatsSource};
use crate::services::event_worker::EventSink;
use std::sync::Arc;

pub fn stats_source_from_config(config: &Config) -> anyhow::Result<Arc<dyn StatsSource>> {
    Ok(match config.stats_mode() {
        StatsMode::Mock => Arc::new(MockStatsSource::from_config(config)),
        StatsMode::Http => Arc::new(HttpStatsSource::from_config(config)?),
    })
}

pub fn event_sink_from_config(config: &Config) -> anyhow::Result<Arc<dyn EventSink>> {
    Ok(match config.sink_mode() {
        SinkMode::Log => Arc::new(LogEventSink),
        SinkMode::File => Arc::new(FileEventSink::new(config.events_file())),
        SinkMode::Http => Arc::new(HttpEventSink::from_config(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn config_from(toml: &str) -> Config {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml.as_bytes()).unwrap();
        Config::from_file(file.path()).unwrap()
    }

    #[test]
    fn test_default_is_log_sink() {
        let sink = event_sink_from_config(&Config::default()).unwrap();
        assert_eq!(sink.name(), "log");
    }

    #[test]
    fn test_sink_modes() {
        let file = config_from("[events]\nsink = \"file\"\nfile = \"out/events.jsonl\"\n");
        assert_eq!(event_sink_from_config(&file).unwrap().name(), "file");

        let http = config_from("[events]\nsink = \"http\"\n");
        assert_eq!(event_sink_from_config(&http).unwrap().name(), "http");
    }

    #[test]
    fn test_stats_modes_build() {
        assert!(stats_source_from_config(&Config::default()).is_ok());
        let http = config_from("[stats]\nmode = \"http\"\nhttp_url = \"http://10.0.0.5/stats\"\n");
        assert!(stats_source_from_config(&http).is_ok());
    }

    #[tokio::test]
    async fn test_mock_source_from_config_fetches() {
        let config = Config::default().with_mock_delay_ms(0);
        let source = stats_source_from_config(&config).unwrap();

        let fetch = source.fetch_queue_stats();
        let snapshot = tokio::time::timeout(std::time::Duration::from_millis(200), fetch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            snapshot.total_wait_minutes,
            snapshot.cashier_wait_minutes + snapshot.turnstile_wait_minutes
        );
    }
}
