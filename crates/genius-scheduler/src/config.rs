//! Scheduler extender configuration

use anyhow::{bail, Context, Result};
use genius_lib::health::DEFAULT_UNHEALTHY_AFTER_FAILURES;
use genius_lib::normalize::DEFAULT_MAX_SCORE;
use genius_lib::{ScoringWeights, TelemetryConfig};
use serde::Deserialize;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "GENIUS_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Base URL of the Prometheus server holding GPU telemetry
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// Port for the extender, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Upper bound on each telemetry call, in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Look-back window for node and device discovery, in seconds
    #[serde(default = "default_label_window")]
    pub label_window_secs: u64,

    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,

    #[serde(default = "default_node_label")]
    pub node_label: String,

    #[serde(default = "default_device_label")]
    pub device_label: String,

    /// Upper bound of normalized scores
    #[serde(default = "default_max_score")]
    pub max_score: u64,

    #[serde(default)]
    pub weights: ScoringWeights,

    /// Consecutive collection failures before telemetry is reported unhealthy
    #[serde(default = "default_unhealthy_after_failures")]
    pub unhealthy_after_failures: u32,
}

fn default_prometheus_url() -> String {
    "http://127.0.0.1:30090".to_string()
}

fn default_api_port() -> u16 {
    8888
}

fn default_query_timeout() -> u64 {
    10
}

fn default_label_window() -> u64 {
    3600
}

fn default_metric_prefix() -> String {
    "observerward_".to_string()
}

fn default_node_label() -> String {
    "kubernetes_node".to_string()
}

fn default_device_label() -> String {
    "id".to_string()
}

fn default_max_score() -> u64 {
    DEFAULT_MAX_SCORE
}

fn default_unhealthy_after_failures() -> u32 {
    DEFAULT_UNHEALTHY_AFTER_FAILURES
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            prometheus_url: default_prometheus_url(),
            api_port: default_api_port(),
            query_timeout_secs: default_query_timeout(),
            label_window_secs: default_label_window(),
            metric_prefix: default_metric_prefix(),
            node_label: default_node_label(),
            device_label: default_device_label(),
            max_score: default_max_score(),
            weights: ScoringWeights::default(),
            unhealthy_after_failures: default_unhealthy_after_failures(),
        }
    }
}

impl SchedulerConfig {
    /// Load from the optional config file, then `GENIUS_*` environment variables
    ///
    /// Nested keys use `__`, e.g. `GENIUS_WEIGHTS__POWER=0.5`.
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("GENIUS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read scheduler configuration")?;

        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("Invalid scheduler configuration")?;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if self.query_timeout_secs == 0 {
            bail!("query_timeout_secs must be positive");
        }
        if self.label_window_secs == 0 {
            bail!("label_window_secs must be positive");
        }
        if self.max_score == 0 {
            bail!("max_score must be positive");
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            metric_prefix: self.metric_prefix.clone(),
            node_label: self.node_label.clone(),
            device_label: self.device_label.clone(),
            label_window: Duration::from_secs(self.label_window_secs),
            query_timeout: self.query_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(overrides: &[(&str, &str)]) -> Result<SchedulerConfig> {
        let mut builder = config::Config::builder();
        for (key, value) in overrides {
            builder = builder.set_override(*key, *value).unwrap();
        }
        SchedulerConfig::from_config(builder.build().unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = build(&[]).unwrap();

        assert_eq!(config.prometheus_url, "http://127.0.0.1:30090");
        assert_eq!(config.api_port, 8888);
        assert_eq!(config.max_score, 100);
        assert_eq!(config.weights, ScoringWeights::default());
        assert_eq!(config.telemetry(), TelemetryConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = build(&[
            ("api_port", "9000"),
            ("query_timeout_secs", "3"),
            ("node_label", "node"),
            ("weights.power", "0.5"),
        ])
        .unwrap();

        assert_eq!(config.api_port, 9000);
        assert_eq!(config.telemetry().query_timeout, Duration::from_secs(3));
        assert_eq!(config.telemetry().node_label, "node");
        assert_eq!(config.weights.power, 0.5);
        assert_eq!(config.weights.free_memory, 2.0);
    }

    #[test]
    fn test_rejects_zero_timeout() {
        assert!(build(&[("query_timeout_secs", "0")]).is_err());
        assert!(build(&[("max_score", "0")]).is_err());
    }
}
