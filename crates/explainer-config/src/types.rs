//! Configuration types.
//!
//! Every leaf is optional so that config layers can be merged; accessors
//! return the built-in default when a value was never set.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost/wp-admin/admin-ajax.php";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_POLL_BACKOFF_MAX_MS: u64 = 30_000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1_000;
pub const DEFAULT_RETRY_BACKOFF_MULTIPLIER: f64 = 1.0;

pub const DEFAULT_PANEL_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MAX_IDLE_CYCLES: u32 = 10;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;
pub const DEFAULT_BACKOFF_WINDOW_SECS: u64 = 120;
pub const DEFAULT_BACKOFF_STEP: f64 = 1.0;
pub const DEFAULT_BACKOFF_MAX_MULTIPLIER: f64 = 4.0;

/// Top-level configuration, as read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExplainerConfig {
    #[serde(default)]
    pub ajax: AjaxConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub panels: PanelConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where and how to reach the `admin-ajax.php` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AjaxConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Opaque nonce forwarded with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl AjaxConfig {
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn nonce(&self) -> &str {
        self.nonce.as_deref().unwrap_or("")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }

    pub fn merge(base: &Self, over: &Self) -> Self {
        Self {
            base_url: over.base_url.clone().or_else(|| base.base_url.clone()),
            nonce: over.nonce.clone().or_else(|| base.nonce.clone()),
            request_timeout_secs: over.request_timeout_secs.or(base.request_timeout_secs),
        }
    }
}

/// Per-job subscription polling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_backoff_max_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_delay_ms: Option<u64>,
    /// 1.0 keeps the retry delay fixed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_backoff_multiplier: Option<f64>,
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.unwrap_or(DEFAULT_POLL_INTERVAL_MS))
    }

    pub fn poll_backoff_max(&self) -> Duration {
        Duration::from_millis(
            self.poll_backoff_max_ms
                .unwrap_or(DEFAULT_POLL_BACKOFF_MAX_MS),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS))
    }

    pub fn retry_backoff_multiplier(&self) -> f64 {
        self.retry_backoff_multiplier
            .unwrap_or(DEFAULT_RETRY_BACKOFF_MULTIPLIER)
    }

    pub fn merge(base: &Self, over: &Self) -> Self {
        Self {
            poll_interval_ms: over.poll_interval_ms.or(base.poll_interval_ms),
            poll_backoff_max_ms: over.poll_backoff_max_ms.or(base.poll_backoff_max_ms),
            max_retries: over.max_retries.or(base.max_retries),
            retry_delay_ms: over.retry_delay_ms.or(base.retry_delay_ms),
            retry_backoff_multiplier: over
                .retry_backoff_multiplier
                .or(base.retry_backoff_multiplier),
        }
    }
}

/// Defaults for panel polling loops and their idle growth curve.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PanelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_cycles: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settle_delay_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_window_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_max_multiplier: Option<f64>,
}

impl PanelConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.unwrap_or(DEFAULT_PANEL_INTERVAL_MS))
    }

    pub fn max_idle_cycles(&self) -> u32 {
        self.max_idle_cycles.unwrap_or(DEFAULT_MAX_IDLE_CYCLES)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS))
    }

    pub fn backoff_window(&self) -> Duration {
        Duration::from_secs(
            self.backoff_window_secs
                .unwrap_or(DEFAULT_BACKOFF_WINDOW_SECS),
        )
    }

    pub fn backoff_step(&self) -> f64 {
        self.backoff_step.unwrap_or(DEFAULT_BACKOFF_STEP)
    }

    pub fn backoff_max_multiplier(&self) -> f64 {
        self.backoff_max_multiplier
            .unwrap_or(DEFAULT_BACKOFF_MAX_MULTIPLIER)
    }

    pub fn merge(base: &Self, over: &Self) -> Self {
        Self {
            interval_ms: over.interval_ms.or(base.interval_ms),
            max_idle_cycles: over.max_idle_cycles.or(base.max_idle_cycles),
            settle_delay_ms: over.settle_delay_ms.or(base.settle_delay_ms),
            backoff_window_secs: over.backoff_window_secs.or(base.backoff_window_secs),
            backoff_step: over.backoff_step.or(base.backoff_step),
            backoff_max_multiplier: over
                .backoff_max_multiplier
                .or(base.backoff_max_multiplier),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

impl LoggingConfig {
    pub fn debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }

    pub fn merge(base: &Self, over: &Self) -> Self {
        Self {
            debug: over.debug.or(base.debug),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = ExplainerConfig::default();
        assert_eq!(config.ajax.base_url(), DEFAULT_BASE_URL);
        assert_eq!(config.ajax.nonce(), "");
        assert_eq!(config.polling.poll_interval(), Duration::from_millis(2_000));
        assert_eq!(config.polling.max_retries(), 3);
        assert_eq!(config.polling.retry_delay(), Duration::from_millis(1_000));
        assert_eq!(config.panels.max_idle_cycles(), 10);
        assert_eq!(config.panels.backoff_window(), Duration::from_secs(120));
        assert_eq!(config.panels.backoff_max_multiplier(), 4.0);
        assert!(!config.logging.debug());
    }

    #[test]
    fn test_polling_merge_prefers_override() {
        let base = PollingConfig {
            poll_interval_ms: Some(1_000),
            max_retries: Some(5),
            ..Default::default()
        };
        let over = PollingConfig {
            max_retries: Some(2),
            ..Default::default()
        };
        let merged = PollingConfig::merge(&base, &over);
        assert_eq!(merged.poll_interval_ms, Some(1_000));
        assert_eq!(merged.max_retries, Some(2));
        assert_eq!(merged.retry_delay_ms, None);
    }

    #[test]
    fn test_unset_fields_are_not_serialized() {
        let config = ExplainerConfig::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(!toml.contains("poll_interval_ms"));
    }
}
