//! Configuration validation logic.

use crate::errors::ConfigError;
use crate::types::ExplainerConfig;

/// Validate an [`ExplainerConfig`], returning the first invalid value found.
///
/// # Validation Rules
///
/// - `base_url` must be an `http://` or `https://` URL
/// - all intervals and delays must be non-zero
/// - `poll_interval_ms` and `retry_delay_ms` must not exceed `poll_backoff_max_ms`
/// - backoff multipliers must be >= 1.0, the panel step must be > 0
pub fn validate_config(config: &ExplainerConfig) -> Result<(), ConfigError> {
    let base_url = config.ajax.base_url();
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(invalid(format!(
            "ajax.base_url must start with http:// or https:// (got '{base_url}')"
        )));
    }

    let polling = &config.polling;
    let poll_interval = polling.poll_interval();
    let backoff_max = polling.poll_backoff_max();
    let retry_delay = polling.retry_delay();

    if poll_interval.is_zero() {
        return Err(invalid("polling.poll_interval_ms must be > 0"));
    }
    if retry_delay.is_zero() {
        return Err(invalid("polling.retry_delay_ms must be > 0"));
    }
    if poll_interval > backoff_max {
        return Err(invalid(format!(
            "polling.poll_interval_ms ({}) must not exceed polling.poll_backoff_max_ms ({})",
            poll_interval.as_millis(),
            backoff_max.as_millis()
        )));
    }
    if retry_delay > backoff_max {
        return Err(invalid(format!(
            "polling.retry_delay_ms ({}) must not exceed polling.poll_backoff_max_ms ({})",
            retry_delay.as_millis(),
            backoff_max.as_millis()
        )));
    }
    let multiplier = polling.retry_backoff_multiplier();
    if !multiplier.is_finite() || multiplier < 1.0 {
        return Err(invalid(format!(
            "polling.retry_backoff_multiplier must be >= 1.0 (got {multiplier})"
        )));
    }

    let panels = &config.panels;
    if panels.interval().is_zero() {
        return Err(invalid("panels.interval_ms must be > 0"));
    }
    if panels.max_idle_cycles() == 0 {
        return Err(invalid("panels.max_idle_cycles must be > 0"));
    }
    if panels.backoff_window().is_zero() {
        return Err(invalid("panels.backoff_window_secs must be > 0"));
    }
    let step = panels.backoff_step();
    if !step.is_finite() || step <= 0.0 {
        return Err(invalid(format!(
            "panels.backoff_step must be > 0 (got {step})"
        )));
    }
    let max_multiplier = panels.backoff_max_multiplier();
    if !max_multiplier.is_finite() || max_multiplier < 1.0 {
        return Err(invalid(format!(
            "panels.backoff_max_multiplier must be >= 1.0 (got {max_multiplier})"
        )));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::InvalidConfiguration {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&ExplainerConfig::default()).is_ok());
    }

    #[test]
    fn test_rejects_non_http_url() {
        let mut config = ExplainerConfig::default();
        config.ajax.base_url = Some("ftp://example.com/admin-ajax.php".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn test_rejects_zero_retry_delay() {
        let mut config = ExplainerConfig::default();
        config.polling.retry_delay_ms = Some(0);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("retry_delay_ms"));
    }

    #[test]
    fn test_rejects_interval_above_backoff_max() {
        let mut config = ExplainerConfig::default();
        config.polling.poll_interval_ms = Some(60_000);
        config.polling.poll_backoff_max_ms = Some(10_000);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("poll_backoff_max_ms"));
    }

    #[test]
    fn test_rejects_shrinking_multiplier() {
        let mut config = ExplainerConfig::default();
        config.polling.retry_backoff_multiplier = Some(0.5);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_idle_cycles() {
        let mut config = ExplainerConfig::default();
        config.panels.max_idle_cycles = Some(0);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("max_idle_cycles"));
    }

    #[test]
    fn test_allows_zero_max_retries() {
        let mut config = ExplainerConfig::default();
        config.polling.max_retries = Some(0);
        assert!(validate_config(&config).is_ok());
    }
}
