use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use explainer_config::{ExplainerConfig, PollingConfig};
use explainer_protocol::{JobStatus, JobUpdate};

use super::errors::AdapterError;
use crate::errors::ErrorReport;
use crate::retry::RetryPolicy;

pub type UpdateCallback = Arc<dyn Fn(&JobUpdate, &UpdateContext) + Send + Sync>;
pub type StatusChangeCallback = Arc<dyn Fn(ConnectionStatus, &UpdateContext) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&ErrorReport) + Send + Sync>;

/// Passed alongside every update and status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateContext {
    pub id: String,
}

/// Connection state of one subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// The last poll failed and a retry is scheduled.
    Error,
    /// Retries exhausted. No further polling.
    Failed,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-assigned importance. Reported in diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

/// Per-subscription options for [`super::JobConnectionAdapter::connect`].
#[derive(Clone, Default)]
pub struct ConnectOptions {
    pub priority: Priority,
    /// Restart the subscription on the next resume if it ended in `Failed`.
    pub auto_reconnect: bool,
    /// Overrides the adapter-wide retry budget.
    ///
    /// Counts retries after the first failure: a subscription gives up after
    /// `max_retries + 1` consecutive failed requests, so `0` means a single
    /// failure is final.
    pub max_retries: Option<u32>,
    /// Called on every connection status transition and once more after each
    /// successful poll with `Connected`.
    pub on_status_change: Option<StatusChangeCallback>,
}

impl ConnectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// See [`ConnectOptions::max_retries`] (the field) for how retries are counted.
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn on_status_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionStatus, &UpdateContext) + Send + Sync + 'static,
    {
        self.on_status_change = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("priority", &self.priority)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("max_retries", &self.max_retries)
            .field("on_status_change", &self.on_status_change.is_some())
            .finish()
    }
}

/// Runtime settings of the subscription layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdapterConfig {
    pub poll_interval: Duration,
    pub poll_backoff_max: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff_multiplier: f64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::from_polling(&PollingConfig::default())
    }
}

impl AdapterConfig {
    pub fn from_config(config: &ExplainerConfig) -> Self {
        Self::from_polling(&config.polling)
    }

    pub fn from_polling(polling: &PollingConfig) -> Self {
        Self {
            poll_interval: polling.poll_interval(),
            poll_backoff_max: polling.poll_backoff_max(),
            max_retries: polling.max_retries(),
            retry_delay: polling.retry_delay(),
            retry_backoff_multiplier: polling.retry_backoff_multiplier(),
        }
    }

    pub fn validate(&self) -> Result<(), AdapterError> {
        if self.poll_interval.is_zero() {
            return Err(config_error("poll interval must be > 0"));
        }
        if self.retry_delay.is_zero() {
            return Err(config_error("retry delay must be > 0"));
        }
        if self.poll_interval > self.poll_backoff_max || self.retry_delay > self.poll_backoff_max {
            return Err(config_error(format!(
                "poll interval ({}ms) and retry delay ({}ms) must not exceed poll backoff max ({}ms)",
                self.poll_interval.as_millis(),
                self.retry_delay.as_millis(),
                self.poll_backoff_max.as_millis()
            )));
        }
        if !self.retry_backoff_multiplier.is_finite() || self.retry_backoff_multiplier < 1.0 {
            return Err(config_error(format!(
                "retry backoff multiplier must be >= 1.0 (got {})",
                self.retry_backoff_multiplier
            )));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: self.retry_delay,
            multiplier: self.retry_backoff_multiplier,
            max_delay: self.poll_backoff_max,
        }
    }
}

fn config_error(message: impl Into<String>) -> AdapterError {
    AdapterError::Config {
        message: message.into(),
    }
}

/// Diagnostic snapshot returned by [`super::JobConnectionAdapter::get_status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdapterStatus {
    pub initialised: bool,
    pub total_connections: usize,
    pub global_paused: bool,
    pub connections: BTreeMap<String, ConnectionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionSnapshot {
    pub status: ConnectionStatus,
    pub retry_count: u32,
    pub paused: bool,
    pub priority: Priority,
    /// Whether a poll task is still running for this subscription.
    pub polling: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_job_status: Option<JobStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AdapterConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(2_000));
        assert_eq!(config.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_retry_delay_above_backoff_max() {
        let config = AdapterConfig {
            retry_delay: Duration::from_secs(60),
            ..AdapterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AdapterError::Config { .. })
        ));
    }

    #[test]
    fn test_retry_policy_uses_backoff_max_as_cap() {
        let config = AdapterConfig {
            retry_backoff_multiplier: 10.0,
            ..AdapterConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(30_000));
    }

    #[test]
    fn test_connect_options_builder() {
        let options = ConnectOptions::new()
            .priority(Priority::High)
            .auto_reconnect(true)
            .max_retries(7)
            .on_status_change(|_, _| {});
        assert_eq!(options.priority, Priority::High);
        assert!(options.auto_reconnect);
        assert_eq!(options.max_retries, Some(7));
        assert!(format!("{options:?}").contains("on_status_change: true"));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Disconnected).unwrap(),
            "\"disconnected\""
        );
        assert_eq!(ConnectionStatus::Error.to_string(), "error");
    }
}
