use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

use crate::sky::Site;
use crate::telescope::{DEFAULT_POLL_INTERVAL, DEFAULT_PORT};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid duration for {0}: must be greater than zero")]
    InvalidDuration(&'static str),
    #[error("invalid site coordinates: {0}")]
    InvalidSite(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telescope: TelescopeConfig,
    pub site: Option<SiteConfig>,
    #[serde(default)]
    pub observation: ObservationConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelescopeConfig {
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_poll_interval", deserialize_with = "duration")]
    pub poll_interval: Duration,
    #[serde(default = "default_command_timeout", deserialize_with = "duration")]
    pub command_timeout: Duration,
}

impl Default for TelescopeConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            poll_interval: default_poll_interval(),
            command_timeout: default_command_timeout(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_poll_interval() -> Duration {
    DEFAULT_POLL_INTERVAL
}

fn default_command_timeout() -> Duration {
    DEFAULT_COMMAND_TIMEOUT
}

fn duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub coordinates: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservationConfig {
    #[serde(default = "default_exposure")]
    pub exposure_s: f64,
    #[serde(default = "default_gain")]
    pub gain: f64,
}

impl Default for ObservationConfig {
    fn default() -> Self {
        Self {
            exposure_s: default_exposure(),
            gain: default_gain(),
        }
    }
}

fn default_exposure() -> f64 {
    30.0
}

fn default_gain() -> f64 {
    20.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub permissions: HashSet<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Control,
    ReadStatus,
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)?;
        if config.telescope.poll_interval.is_zero() {
            return Err(ConfigError::InvalidDuration("telescope.poll_interval"));
        }
        if config.telescope.command_timeout.is_zero() {
            return Err(ConfigError::InvalidDuration("telescope.command_timeout"));
        }
        config.site()?;
        Ok(config)
    }

    /// Observer location, if one is configured.
    pub fn site(&self) -> Result<Option<Site>, ConfigError> {
        self.site
            .as_ref()
            .map(|s| {
                Site::from_coordinates(&s.coordinates)
                    .ok_or_else(|| ConfigError::InvalidSite(s.coordinates.clone()))
            })
            .transpose()
    }

    pub fn find_api_key(&self, key: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config.telescope.host, None);
        assert_eq!(config.telescope.port, 8082);
        assert_eq!(config.telescope.poll_interval, Duration::from_secs(2));
        assert_eq!(config.telescope.command_timeout, Duration::from_secs(10));
        assert_eq!(config.observation.exposure_s, 30.0);
        assert_eq!(config.observation.gain, 20.0);
        assert_eq!(config.web.bind, "0.0.0.0:8080");
        assert!(config.site().unwrap().is_none());
    }

    #[test]
    fn full_file() {
        let yaml = r#"
telescope:
  host: 10.0.0.1
  port: 9000
  poll_interval: 500ms
  command_timeout: 1m
site:
  coordinates: "48.85, 2.35"
observation:
  exposure_s: 10
  gain: 5.5
web:
  bind: 127.0.0.1:9090
api_keys:
  - key: secret
    name: operator
    permissions: [control, read_status]
  - key: viewer
    name: dome-display
    permissions: [read_status]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.telescope.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(config.telescope.port, 9000);
        assert_eq!(config.telescope.poll_interval, Duration::from_millis(500));
        assert_eq!(config.telescope.command_timeout, Duration::from_secs(60));
        assert_eq!(config.observation.exposure_s, 10.0);
        assert_eq!(config.site().unwrap().unwrap().latitude_deg, 48.85);

        let viewer = config.find_api_key("viewer").unwrap();
        assert_eq!(viewer.name, "dome-display");
        assert!(viewer.permissions.contains(&Permission::ReadStatus));
        assert!(!viewer.permissions.contains(&Permission::Control));
        assert!(config.find_api_key("nope").is_none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            Config::from_yaml("telescope:\n  poll_interval: soon\n"),
            Err(ConfigError::Yaml(_))
        ));
        assert!(matches!(
            Config::from_yaml("telescope:\n  poll_interval: 0s\n"),
            Err(ConfigError::InvalidDuration("telescope.poll_interval"))
        ));
        assert!(matches!(
            Config::from_yaml("telescope:\n  command_timeout: 0ms\n"),
            Err(ConfigError::InvalidDuration("telescope.command_timeout"))
        ));
        assert!(matches!(
            Config::from_yaml("site:\n  coordinates: \"somewhere\"\n"),
            Err(ConfigError::InvalidSite(_))
        ));
    }
}
