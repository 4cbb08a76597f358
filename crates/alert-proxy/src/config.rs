//! Runtime configuration: env-driven defaults (spec.md §6) plus an optional
//! TOML override file, mirroring the teacher's `Config::default()` +
//! `Config::merge` split between environment defaults and file overrides.

use std::env;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::model::FilterAction;

/// Hard caps spec.md §6 never lets `max_request_size`/`max_alerts_per_req`
/// exceed, regardless of configured value.
pub const MAX_REQUEST_SIZE_HARD_CAP: usize = 100 * 1024 * 1024;
pub const MAX_ALERTS_PER_REQ_HARD_CAP: usize = 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub max_request_size: usize,
    pub max_alerts_per_req: usize,
    pub request_timeout: Duration,

    pub enable_classification: bool,
    pub enable_filtering: bool,
    pub enable_publishing: bool,

    pub classification_timeout: Duration,
    pub filtering_timeout: Duration,
    pub publishing_timeout: Duration,

    pub classification_cache_ttl: Duration,
    pub classification_fallback_enabled: bool,

    pub filtering_default_action: FilterAction,
    pub filtering_rules_file: Option<String>,

    pub publishing_parallel: usize,
    pub publishing_timeout_per_target: Duration,
    pub publishing_retry_enabled: bool,
    pub publishing_retry_max_attempts: u32,
    pub publishing_dlq_enabled: bool,

    pub max_concurrent_alerts: usize,
    pub max_publishing_targets: usize,
    pub continue_on_error: bool,
    pub block_private_ips: bool,

    pub targets_file: Option<String>,
    pub targets_reload_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: env_parsed("ALERT_PROXY_PORT").unwrap_or(8080),
            max_request_size: env_parsed("ALERT_PROXY_MAX_REQUEST_SIZE").unwrap_or(10 * 1024 * 1024),
            max_alerts_per_req: env_parsed("ALERT_PROXY_MAX_ALERTS_PER_REQ").unwrap_or(100),
            request_timeout: env_secs("ALERT_PROXY_REQUEST_TIMEOUT_SECS").unwrap_or(Duration::from_secs(30)),

            enable_classification: env_bool("ALERT_PROXY_ENABLE_CLASSIFICATION", true),
            enable_filtering: env_bool("ALERT_PROXY_ENABLE_FILTERING", true),
            enable_publishing: env_bool("ALERT_PROXY_ENABLE_PUBLISHING", true),

            classification_timeout: env_secs("ALERT_PROXY_CLASSIFICATION_TIMEOUT_SECS")
                .unwrap_or(Duration::from_secs(5)),
            filtering_timeout: env_secs("ALERT_PROXY_FILTERING_TIMEOUT_SECS")
                .unwrap_or(Duration::from_secs(1)),
            publishing_timeout: env_secs("ALERT_PROXY_PUBLISHING_TIMEOUT_SECS")
                .unwrap_or(Duration::from_secs(5)),

            classification_cache_ttl: env_secs("ALERT_PROXY_CLASSIFICATION_CACHE_TTL_SECS")
                .unwrap_or(Duration::from_secs(60)),
            classification_fallback_enabled: env_bool(
                "ALERT_PROXY_CLASSIFICATION_FALLBACK_ENABLED",
                true,
            ),

            filtering_default_action: env::var("ALERT_PROXY_FILTERING_DEFAULT_ACTION")
                .ok()
                .and_then(|v| parse_filter_action(&v))
                .unwrap_or(FilterAction::Allow),
            filtering_rules_file: env::var("ALERT_PROXY_FILTERING_RULES_FILE")
                .ok()
                .filter(|s| !s.is_empty()),

            publishing_parallel: env_parsed("ALERT_PROXY_PUBLISHING_PARALLEL").unwrap_or(10),
            publishing_timeout_per_target: env_secs("ALERT_PROXY_PUBLISHING_TIMEOUT_PER_TARGET_SECS")
                .unwrap_or(Duration::from_secs(5)),
            publishing_retry_enabled: env_bool("ALERT_PROXY_PUBLISHING_RETRY_ENABLED", true),
            publishing_retry_max_attempts: env_parsed("ALERT_PROXY_PUBLISHING_RETRY_MAX_ATTEMPTS")
                .unwrap_or(3),
            publishing_dlq_enabled: env_bool("ALERT_PROXY_PUBLISHING_DLQ_ENABLED", false),

            max_concurrent_alerts: env_parsed("ALERT_PROXY_MAX_CONCURRENT_ALERTS").unwrap_or(10),
            max_publishing_targets: env_parsed("ALERT_PROXY_MAX_PUBLISHING_TARGETS").unwrap_or(10),
            continue_on_error: env_bool("ALERT_PROXY_CONTINUE_ON_ERROR", true),
            block_private_ips: env_bool("ALERT_PROXY_BLOCK_PRIVATE_IPS", false),

            targets_file: env::var("ALERT_PROXY_TARGETS_FILE").ok(),
            targets_reload_interval: env_secs("ALERT_PROXY_TARGETS_RELOAD_INTERVAL_SECS")
                .unwrap_or(Duration::from_secs(30)),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parsed::<u64>(key).map(Duration::from_secs)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

fn parse_filter_action(raw: &str) -> Option<FilterAction> {
    match raw {
        "allow" => Some(FilterAction::Allow),
        "deny" => Some(FilterAction::Deny),
        _ => None,
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive, got {value}")]
    NotPositive { field: &'static str, value: i64 },
    #[error("{field} ({value}) exceeds the hard cap of {cap}")]
    ExceedsHardCap {
        field: &'static str,
        value: usize,
        cap: usize,
    },
    #[error("filtering.default_action must be 'allow' or 'deny'")]
    InvalidDefaultAction,
}

impl Config {
    /// Reject non-positive sizes/timeouts/concurrency and oversize caps, per
    /// spec.md §6's configuration validation rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_request_size == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_request_size",
                value: 0,
            });
        }
        if self.max_request_size > MAX_REQUEST_SIZE_HARD_CAP {
            return Err(ConfigError::ExceedsHardCap {
                field: "max_request_size",
                value: self.max_request_size,
                cap: MAX_REQUEST_SIZE_HARD_CAP,
            });
        }
        if self.max_alerts_per_req == 0 {
            return Err(ConfigError::NotPositive {
                field: "max_alerts_per_req",
                value: 0,
            });
        }
        if self.max_alerts_per_req > MAX_ALERTS_PER_REQ_HARD_CAP {
            return Err(ConfigError::ExceedsHardCap {
                field: "max_alerts_per_req",
                value: self.max_alerts_per_req,
                cap: MAX_ALERTS_PER_REQ_HARD_CAP,
            });
        }
        for (field, d) in [
            ("request_timeout", self.request_timeout),
            ("classification_timeout", self.classification_timeout),
            ("filtering_timeout", self.filtering_timeout),
            ("publishing_timeout", self.publishing_timeout),
            ("publishing_timeout_per_target", self.publishing_timeout_per_target),
            ("targets_reload_interval", self.targets_reload_interval),
        ] {
            if d.is_zero() {
                return Err(ConfigError::NotPositive { field, value: 0 });
            }
        }
        for (field, n) in [
            ("max_concurrent_alerts", self.max_concurrent_alerts),
            ("max_publishing_targets", self.max_publishing_targets),
            ("publishing_parallel", self.publishing_parallel),
        ] {
            if n == 0 {
                return Err(ConfigError::NotPositive {
                    field,
                    value: 0,
                });
            }
        }
        if self.publishing_retry_max_attempts == 0 {
            return Err(ConfigError::NotPositive {
                field: "publishing_retry_max_attempts",
                value: 0,
            });
        }
        Ok(())
    }
}

/// Optional TOML file of overrides, applied over the environment defaults.
/// Mirrors the teacher's `Config::merge` pattern: every field is optional
/// and only present values replace the default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub max_request_size: Option<usize>,
    pub max_alerts_per_req: Option<usize>,
    pub request_timeout_secs: Option<u64>,
    pub enable_classification: Option<bool>,
    pub enable_filtering: Option<bool>,
    pub enable_publishing: Option<bool>,
    pub classification_timeout_secs: Option<u64>,
    pub filtering_timeout_secs: Option<u64>,
    pub publishing_timeout_secs: Option<u64>,
    pub filtering_default_action: Option<String>,
    pub filtering_rules_file: Option<String>,
    pub publishing_parallel: Option<usize>,
    pub publishing_timeout_per_target_secs: Option<u64>,
    pub publishing_retry_enabled: Option<bool>,
    pub publishing_retry_max_attempts: Option<u32>,
    pub publishing_dlq_enabled: Option<bool>,
    pub max_concurrent_alerts: Option<usize>,
    pub max_publishing_targets: Option<usize>,
    pub continue_on_error: Option<bool>,
    pub block_private_ips: Option<bool>,
    pub targets_file: Option<String>,
    pub targets_reload_interval_secs: Option<u64>,
}

impl ConfigOverrides {
    pub fn load_from_file(path: &str) -> Result<Self, ConfigFileError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigFileError::Parse {
            path: path.to_string(),
            source,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl Config {
    /// Overlay an optional TOML override set onto the environment defaults.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.port {
            self.port = v;
        }
        if let Some(v) = overrides.max_request_size {
            self.max_request_size = v;
        }
        if let Some(v) = overrides.max_alerts_per_req {
            self.max_alerts_per_req = v;
        }
        if let Some(v) = overrides.request_timeout_secs {
            self.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = overrides.enable_classification {
            self.enable_classification = v;
        }
        if let Some(v) = overrides.enable_filtering {
            self.enable_filtering = v;
        }
        if let Some(v) = overrides.enable_publishing {
            self.enable_publishing = v;
        }
        if let Some(v) = overrides.classification_timeout_secs {
            self.classification_timeout = Duration::from_secs(v);
        }
        if let Some(v) = overrides.filtering_timeout_secs {
            self.filtering_timeout = Duration::from_secs(v);
        }
        if let Some(v) = overrides.publishing_timeout_secs {
            self.publishing_timeout = Duration::from_secs(v);
        }
        if let Some(raw) = &overrides.filtering_default_action {
            if let Some(action) = parse_filter_action(raw) {
                self.filtering_default_action = action;
            }
        }
        if overrides.filtering_rules_file.is_some() {
            self.filtering_rules_file.clone_from(&overrides.filtering_rules_file);
        }
        if let Some(v) = overrides.publishing_parallel {
            self.publishing_parallel = v;
        }
        if let Some(v) = overrides.publishing_timeout_per_target_secs {
            self.publishing_timeout_per_target = Duration::from_secs(v);
        }
        if let Some(v) = overrides.publishing_retry_enabled {
            self.publishing_retry_enabled = v;
        }
        if let Some(v) = overrides.publishing_retry_max_attempts {
            self.publishing_retry_max_attempts = v;
        }
        if let Some(v) = overrides.publishing_dlq_enabled {
            self.publishing_dlq_enabled = v;
        }
        if let Some(v) = overrides.max_concurrent_alerts {
            self.max_concurrent_alerts = v;
        }
        if let Some(v) = overrides.max_publishing_targets {
            self.max_publishing_targets = v;
        }
        if let Some(v) = overrides.continue_on_error {
            self.continue_on_error = v;
        }
        if let Some(v) = overrides.block_private_ips {
            self.block_private_ips = v;
        }
        if overrides.targets_file.is_some() {
            self.targets_file.clone_from(&overrides.targets_file);
        }
        if let Some(v) = overrides.targets_reload_interval_secs {
            self.targets_reload_interval = Duration::from_secs(v);
        }
    }
}
