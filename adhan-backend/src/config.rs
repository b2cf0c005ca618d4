use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

use adhan_common::Location;
use serde::{Deserialize, Serialize};

use crate::module::net::RetryOptions;

/// Where raw prayer times come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Remote,
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub source: SourceKind,
    pub base_url: String,
    pub connectivity_probe_url: String,
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Remote,
            base_url: "https://api.aladhan.com/v1".to_string(),
            connectivity_probe_url: "https://clients3.google.com/generate_204".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
    pub attempt_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 10_000,
            backoff_factor: 2.0,
            attempt_timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    pub fn to_options(&self) -> RetryOptions {
        RetryOptions {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_factor: self.backoff_factor,
            attempt_timeout: Duration::from_secs(self.attempt_timeout_secs),
            retry_condition: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Used when the device location is unknown
    pub default_latitude: f64,
    pub default_longitude: f64,
    pub default_city: Option<String>,
    pub throttle_minutes: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            default_latitude: 21.4225,
            default_longitude: 39.8262,
            default_city: Some("Makkah".to_string()),
            throttle_minutes: 5,
        }
    }
}

impl LocationConfig {
    pub fn default_location(&self) -> Location {
        let location = Location::new(self.default_latitude, self.default_longitude);
        match &self.default_city {
            Some(city) => location.with_city(city.clone()),
            None => location,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyConfig {
    /// Minutes after local midnight at which the daily recreation runs
    pub wake_offset_minutes: u32,
    /// Period of the catch-up check for days missed while suspended
    pub check_interval_minutes: u64,
}

impl Default for DailyConfig {
    fn default() -> Self {
        Self {
            wake_offset_minutes: 1,
            check_interval_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub daily: DailyConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            data_dir: default_data_dir(),
            api: ApiConfig::default(),
            retry: RetryConfig::default(),
            location: LocationConfig::default(),
            daily: DailyConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: BackendConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

pub static CONFIG: OnceLock<BackendConfig> = OnceLock::new();

/// Load `path` into `CONFIG`. A missing file means defaults; a malformed one is an error.
pub fn read_config(path: impl AsRef<Path>) -> anyhow::Result<&'static BackendConfig> {
    let path = path.as_ref();
    let config = if path.exists() {
        BackendConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file {:?}: {}", path, e))?
    } else {
        tracing::warn!("Config file {:?} not found, using defaults", path);
        BackendConfig::default()
    };

    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: BackendConfig = toml::from_str(
            r#"
            log_level = "debug"

            [api]
            source = "offline"

            [retry]
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.data_dir, "data");
        assert_eq!(config.api.source, SourceKind::Offline);
        assert_eq!(config.api.base_url, "https://api.aladhan.com/v1");
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_delay_ms, 1_000);
        assert_eq!(config.location.throttle_minutes, 5);
    }

    #[test]
    fn test_retry_options_from_config() {
        let options = RetryConfig::default().to_options();
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.initial_delay, Duration::from_secs(1));
        assert_eq!(options.max_delay, Duration::from_secs(10));
        assert_eq!(options.attempt_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_default_location() {
        let location = LocationConfig::default().default_location();
        assert_eq!(location.city.as_deref(), Some("Makkah"));
    }
}
