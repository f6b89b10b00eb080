use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::info;

pub mod defaults;
pub mod duration_serde;

use crate::errors::ConfigError;
use crate::models::JobDescriptor;
use defaults::*;
use duration_serde::duration;

/// Environment variables with this prefix override file values; `__`
/// separates nesting levels (`IPTV_ARBITER_SELECTOR__RACE_WIDTH=3`)
pub const ENV_PREFIX: &str = "IPTV_ARBITER_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub prober: ProberConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Job descriptors, consumed once at start
    #[serde(default)]
    pub jobs: Vec<JobDescriptor>,
}

/// Job engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long `stop()` waits for in-flight jobs
    #[serde(default = "default_shutdown_grace", with = "duration")]
    pub shutdown_grace: Duration,
    /// Poll period while waiting for in-flight jobs during shutdown
    #[serde(default = "default_shutdown_poll", with = "duration")]
    pub shutdown_poll: Duration,
    /// JSON file for persisted job history; kept in memory when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_path: Option<PathBuf>,
}

fn default_shutdown_grace() -> Duration {
    DEFAULT_SHUTDOWN_GRACE
}
fn default_shutdown_poll() -> Duration {
    DEFAULT_SHUTDOWN_POLL
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shutdown_grace: default_shutdown_grace(),
            shutdown_poll: default_shutdown_poll(),
            history_path: None,
        }
    }
}

/// Source selector tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Candidates probed concurrently in the first round
    pub race_width: usize,
    /// Score distance from the best candidate that still counts as a tie
    pub tie_window: f64,
    #[serde(with = "duration")]
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    /// How far back 502s count against a provider
    #[serde(with = "duration")]
    pub error_window: Duration,
    /// How far back AGTV selections count toward the round-robin nudge
    #[serde(with = "duration")]
    pub selection_window: Duration,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            race_width: DEFAULT_RACE_WIDTH,
            tie_window: DEFAULT_TIE_WINDOW,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            error_window: DEFAULT_ERROR_WINDOW,
            selection_window: DEFAULT_SELECTION_WINDOW,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Error events older than this are dropped by the sweeper
    #[serde(with = "duration")]
    pub retention: Duration,
    #[serde(with = "duration")]
    pub sweep_interval: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            retention: DEFAULT_HEALTH_RETENTION,
            sweep_interval: DEFAULT_HEALTH_SWEEP_INTERVAL,
        }
    }
}

/// URL prober configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProberConfig {
    /// Budget for one probe including its redirect chain
    #[serde(with = "duration")]
    pub timeout: Duration,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    pub user_agent: String,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_PROBE_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Disable a provider whose authentication fails
    pub disable_on_auth_failure: bool,
    /// JSON snapshot of providers and titles loaded into the in-memory store
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
    /// Timeout for provider API calls
    #[serde(with = "duration")]
    pub request_timeout: Duration,
    /// Titles handled per `details_refresh` run
    pub details_batch_size: usize,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            disable_on_auth_failure: DEFAULT_DISABLE_ON_AUTH_FAILURE,
            catalog_path: None,
            request_timeout: DEFAULT_PROVIDER_REQUEST_TIMEOUT,
            details_batch_size: DEFAULT_DETAILS_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load defaults, then the TOML file (if present), then environment overrides
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> Result<Self, ConfigError> {
        let path = config_file.as_ref();
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
        }

        let figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        Self::extract(figment)
    }

    /// Parse a TOML document on top of the defaults, without environment overrides
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Config::default())).merge(Toml::string(contents));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract().map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.selector.race_width == 0 {
            return Err(ConfigError::invalid("selector.race_width", "must be at least 1"));
        }
        if !self.selector.tie_window.is_finite() || self.selector.tie_window < 0.0 {
            return Err(ConfigError::invalid(
                "selector.tie_window",
                "must be a non-negative number",
            ));
        }
        if self.selector.cache_capacity == 0 {
            return Err(ConfigError::invalid("selector.cache_capacity", "must be at least 1"));
        }
        if self.prober.timeout.is_zero() {
            return Err(ConfigError::invalid("prober.timeout", "must be greater than zero"));
        }
        if self.health.sweep_interval.is_zero() {
            return Err(ConfigError::invalid(
                "health.sweep_interval",
                "must be greater than zero",
            ));
        }
        if self.engine.shutdown_poll.is_zero() {
            return Err(ConfigError::invalid("engine.shutdown_poll", "must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.engine.shutdown_grace, Duration::from_secs(30));
        assert_eq!(config.selector.race_width, 5);
        assert_eq!(config.selector.tie_window, 200.0);
        assert_eq!(config.selector.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.health.retention, Duration::from_secs(300));
        assert_eq!(config.prober.timeout, Duration::from_millis(7500));
        assert_eq!(config.prober.max_redirects, 3);
        assert_eq!(config.prober.max_body_bytes, 100);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.jobs.is_empty());
    }

    #[test]
    fn test_jobs_and_overrides_from_toml() {
        let toml = r#"
            [selector]
            race_width = 3
            cache_ttl = "10s"

            [prober]
            timeout = 2000

            [logging]
            format = "json"

            [[jobs]]
            name = "catalog_sync"
            interval = "6h"
            runOnStartup = true
            postExecute = ["title_cleanup"]

            [[jobs]]
            name = "title_cleanup"
        "#;
        let config = Config::from_toml_str(toml).unwrap();

        assert_eq!(config.selector.race_width, 3);
        assert_eq!(config.selector.cache_ttl, Duration::from_secs(10));
        assert_eq!(config.selector.cache_capacity, 1000);
        assert_eq!(config.prober.timeout, Duration::from_secs(2));
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.jobs.len(), 2);
        assert_eq!(config.jobs[0].interval, Some(Duration::from_secs(6 * 3600)));
        assert_eq!(config.jobs[0].post_execute, vec!["title_cleanup"]);
    }

    #[test]
    fn test_invalid_duration_is_hard_error() {
        let toml = r#"
            [[jobs]]
            name = "catalog_sync"
            interval = "6 hours"
        "#;
        assert!(matches!(
            Config::from_toml_str(toml),
            Err(ConfigError::Load { .. })
        ));
    }

    #[test]
    fn test_zero_race_width_rejected() {
        let result = Config::from_toml_str("[selector]\nrace_width = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }
}
