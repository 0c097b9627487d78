//! Configuration system for the Pulse client
//! Holds every tunable of the request pipeline and the chart, with defaults
//! equal to the production values.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod parser;
pub mod validation;

pub use parser::{ConfigFormat, ConfigParser, ConfigSerializer, TemplateExpander};
pub use validation::ConfigValidator;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

impl From<ConfigError> for pulse_shared::PulseError {
    fn from(err: ConfigError) -> Self {
        pulse_shared::PulseError::InvalidConfig {
            message: err.to_string(),
            field: None,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub backend: BackendConfig,
    pub requests: RequestDefaults,
    pub submit_backoff: BackoffConfig,
    pub poll_backoff: BackoffConfig,
    pub chart: ChartSettings,
    pub storage: StorageConfig,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            requests: RequestDefaults::default(),
            submit_backoff: BackoffConfig::submission(),
            poll_backoff: BackoffConfig::polling(),
            chart: ChartSettings::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl PulseConfig {
    /// Parse and validate a configuration file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let config = ConfigParser::parse_file(path)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        ConfigSerializer::serialize_string(self, ConfigFormat::Yaml)
    }
}

/// Which job processor the client talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// In-process processor, for demos and offline use
    Local,
    /// Supabase project (PostgREST + realtime)
    Supabase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: String,
    pub anon_key: String,
    /// User access token of the current session, if signed in
    pub access_token: Option<String>,
    pub request_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Local,
            url: String::new(),
            anon_key: String::new(),
            access_token: None,
            request_timeout_ms: 15_000,
            heartbeat_interval_ms: 25_000,
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Per-request defaults of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestDefaults {
    pub cache_ttl_ms: u64,
    pub cooldown_ms: u64,
    pub timeout_ms: u64,
}

impl Default for RequestDefaults {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 30_000,
            cooldown_ms: 1_500,
            timeout_ms: 80_000,
        }
    }
}

/// Exponential backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub initial_ms: u64,
    pub factor: f64,
    pub max_ms: u64,
    /// Attempt limit; `None` retries until something else stops the loop
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl BackoffConfig {
    /// Retry policy for submissions rejected by the server-side cooldown
    pub fn submission() -> Self {
        Self {
            initial_ms: 1_200,
            factor: 1.7,
            max_ms: 10_000,
            max_attempts: Some(4),
        }
    }

    /// Status polling cadence while waiting for a job
    pub fn polling() -> Self {
        Self {
            initial_ms: 2_000,
            factor: 1.4,
            max_ms: 15_000,
            max_attempts: None,
        }
    }

    /// Delay following `previous_ms`: `min(max_ms, floor(previous_ms * factor))`
    ///
    /// Shared by the retry loops and by config validation.
    pub fn next_delay_ms(&self, previous_ms: u64) -> u64 {
        let scaled = (previous_ms as f64 * self.factor).floor();
        let scaled = if scaled.is_finite() && scaled > 0.0 {
            scaled as u64
        } else {
            0
        };
        scaled.min(self.max_ms)
    }
}

/// Interactive chart tunables
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSettings {
    /// Window shown when no explicit range is set
    pub default_days: u32,
    /// "Now" is snapped down to a multiple of this
    pub snap_ms: u64,
    pub refresh_debounce_ms: u64,
    pub refetch_debounce_ms: u64,
    pub render_debounce_ms: u64,
    pub hover_radius_px: f64,
    pub tooltip_hide_ms: u64,
    pub tooltip_hide_from_tip_ms: u64,
    pub tooltip_hide_from_canvas_ms: u64,
    pub min_range_ms: i64,
    pub wheel_sensitivity: f64,
}

impl Default for ChartSettings {
    fn default() -> Self {
        Self {
            default_days: 30,
            snap_ms: 60_000,
            refresh_debounce_ms: 180,
            refetch_debounce_ms: 260,
            render_debounce_ms: 16,
            hover_radius_px: 16.0,
            tooltip_hide_ms: 220,
            tooltip_hide_from_tip_ms: 10,
            tooltip_hide_from_canvas_ms: 0,
            min_range_ms: 10_000,
            wheel_sensitivity: 0.0012,
        }
    }
}

/// Where cache entries and active-job markers are persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// JSON store file; `None` keeps everything in memory
    pub path: Option<PathBuf>,
}
