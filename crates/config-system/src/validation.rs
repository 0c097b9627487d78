//! Configuration validation utilities

use crate::{BackendKind, BackoffConfig, ConfigError, PulseConfig, Result};

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate a complete configuration
    pub fn validate(config: &PulseConfig) -> Result<()> {
        Self::validate_backend(config)?;
        Self::validate_requests(config)?;
        Self::validate_backoff("submit_backoff", &config.submit_backoff)?;
        Self::validate_backoff("poll_backoff", &config.poll_backoff)?;
        Self::validate_chart(config)?;
        Self::validate_cross_field(config);
        Ok(())
    }

    fn validate_backend(config: &PulseConfig) -> Result<()> {
        let backend = &config.backend;

        if backend.kind == BackendKind::Supabase {
            if backend.url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "backend.url is required for the supabase backend".to_string(),
                ));
            }
            if !backend.url.starts_with("http://") && !backend.url.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "Invalid backend.url: {}. Must be an http(s) URL",
                    backend.url
                )));
            }
            if backend.anon_key.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "backend.anon_key is required for the supabase backend".to_string(),
                ));
            }
            if backend.access_token.is_none() {
                log::warn!("No access token configured; every request will report NotAuthenticated");
            }
        }

        if backend.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "backend.request_timeout_ms must be positive".to_string(),
            ));
        }
        if backend.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "backend.heartbeat_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_requests(config: &PulseConfig) -> Result<()> {
        if config.requests.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "requests.timeout_ms must be positive".to_string(),
            ));
        }
        if config.requests.cache_ttl_ms == 0 {
            log::warn!("requests.cache_ttl_ms is 0; results will never be served from cache");
        }
        Ok(())
    }

    fn validate_backoff(name: &str, backoff: &BackoffConfig) -> Result<()> {
        if backoff.initial_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "{}.initial_ms must be positive",
                name
            )));
        }
        if !backoff.factor.is_finite() || backoff.factor <= 1.0 {
            return Err(ConfigError::Validation(format!(
                "Invalid {}.factor: {}. Must be greater than 1.0",
                name, backoff.factor
            )));
        }
        if backoff.initial_ms > backoff.max_ms {
            return Err(ConfigError::Validation(format!(
                "{}.initial_ms ({}) exceeds {}.max_ms ({})",
                name, backoff.initial_ms, name, backoff.max_ms
            )));
        }
        if backoff.max_attempts == Some(0) {
            return Err(ConfigError::Validation(format!(
                "{}.max_attempts must be at least 1",
                name
            )));
        }
        Ok(())
    }

    fn validate_chart(config: &PulseConfig) -> Result<()> {
        let chart = &config.chart;

        if chart.default_days == 0 {
            return Err(ConfigError::Validation(
                "chart.default_days must be positive".to_string(),
            ));
        }
        if chart.snap_ms == 0 {
            return Err(ConfigError::Validation(
                "chart.snap_ms must be positive".to_string(),
            ));
        }
        if chart.min_range_ms <= 0 {
            return Err(ConfigError::Validation(format!(
                "Invalid chart.min_range_ms: {}. Must be positive",
                chart.min_range_ms
            )));
        }
        if !(chart.hover_radius_px > 0.0) {
            return Err(ConfigError::Validation(format!(
                "Invalid chart.hover_radius_px: {}. Must be positive",
                chart.hover_radius_px
            )));
        }
        if !(chart.wheel_sensitivity > 0.0) || chart.wheel_sensitivity > 0.1 {
            return Err(ConfigError::Validation(format!(
                "Invalid chart.wheel_sensitivity: {}. Must be in (0, 0.1]",
                chart.wheel_sensitivity
            )));
        }
        Ok(())
    }

    fn validate_cross_field(config: &PulseConfig) {
        let max_wait: u64 = Self::submission_wait_ms(&config.submit_backoff);
        if max_wait >= config.requests.timeout_ms {
            log::warn!(
                "Submission retries can wait {}ms, longer than the {}ms job timeout",
                max_wait,
                config.requests.timeout_ms
            );
        }

        if config.chart.refetch_debounce_ms < config.chart.render_debounce_ms {
            log::warn!("Refetch debounce is shorter than a render frame; zooming will refetch eagerly");
        }
    }

    /// Total sleep between submission attempts when every attempt is rejected
    pub fn submission_wait_ms(backoff: &BackoffConfig) -> u64 {
        let attempts = backoff.max_attempts.unwrap_or(1).max(1);
        let mut delay = backoff.initial_ms;
        let mut total = 0u64;
        for _ in 1..attempts {
            total = total.saturating_add(delay);
            delay = backoff.next_delay_ms(delay);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&PulseConfig::default()).is_ok());
    }

    #[test]
    fn test_supabase_requires_credentials() {
        let mut config = PulseConfig::default();
        config.backend.kind = BackendKind::Supabase;
        assert!(ConfigValidator::validate(&config).is_err());

        config.backend.url = "https://example.supabase.co".to_string();
        assert!(ConfigValidator::validate(&config).is_err());

        config.backend.anon_key = "anon".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());

        config.backend.url = "ftp://example".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_backoff_rules() {
        let mut config = PulseConfig::default();
        config.poll_backoff.factor = 0.5;
        assert!(ConfigValidator::validate(&config).is_err());
        config.poll_backoff.factor = 1.0;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = PulseConfig::default();
        config.submit_backoff.initial_ms = 20_000;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = PulseConfig::default();
        config.submit_backoff.max_attempts = Some(0);
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_chart_rules() {
        let mut config = PulseConfig::default();
        config.chart.min_range_ms = 0;
        assert!(ConfigValidator::validate(&config).is_err());

        let mut config = PulseConfig::default();
        config.chart.default_days = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_submission_wait() {
        // 1200 + 2040 + 3468 between four attempts
        assert_eq!(
            ConfigValidator::submission_wait_ms(&BackoffConfig::submission()),
            6_708
        );
    }
}
