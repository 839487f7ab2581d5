use std::error::Error;

use chrono::{DateTime, Utc};
use serde::Serialize;

use explainer_protocol::JobStatus;

/// Base trait for all polling-core errors
pub trait ExplainerError: Error + Send + Sync + 'static {
    /// Error code for programmatic handling
    fn error_code(&self) -> &'static str;

    /// Whether this error should be logged as an error or warning
    fn is_user_error(&self) -> bool {
        false
    }
}

impl ExplainerError for explainer_config::ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            explainer_config::ConfigError::ConfigParseError { .. } => "CONFIG_PARSE_ERROR",
            explainer_config::ConfigError::InvalidEnvValue { .. } => "CONFIG_INVALID_ENV_VALUE",
            explainer_config::ConfigError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION",
            explainer_config::ConfigError::HomeNotFound => "HOME_NOT_FOUND",
            explainer_config::ConfigError::IoError { .. } => "CONFIG_IO_ERROR",
        }
    }

    fn is_user_error(&self) -> bool {
        !matches!(self, explainer_config::ConfigError::IoError { .. })
    }
}

/// Where a reported failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Adapter,
    Subscription,
}

/// Structured context attached to an [`ErrorReport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    pub source: ErrorSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_status: Option<JobStatus>,
}

impl ErrorContext {
    pub fn adapter() -> Self {
        Self {
            source: ErrorSource::Adapter,
            progress_id: None,
            retry_count: None,
            job_status: None,
        }
    }

    pub fn subscription(progress_id: impl Into<String>) -> Self {
        Self {
            source: ErrorSource::Subscription,
            progress_id: Some(progress_id.into()),
            retry_count: None,
            job_status: None,
        }
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    pub fn with_job_status(mut self, status: JobStatus) -> Self {
        self.job_status = Some(status);
        self
    }
}

/// The single failure object fanned out to every registered error handler.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub message: String,
    /// Display form of the underlying error, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub error_code: &'static str,
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(message: impl Into<String>, error_code: &'static str, context: ErrorContext) -> Self {
        Self {
            message: message.into(),
            error: None,
            error_code,
            context,
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(
        message: impl Into<String>,
        error: &dyn ExplainerError,
        context: ErrorContext,
    ) -> Self {
        Self {
            message: message.into(),
            error: Some(error.to_string()),
            error_code: error.error_code(),
            context,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_codes() {
        let err = explainer_config::ConfigError::InvalidConfiguration {
            message: "bad".to_string(),
        };
        assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
        assert!(err.is_user_error());

        let io = explainer_config::ConfigError::IoError {
            source: std::io::Error::other("disk"),
        };
        assert_eq!(io.error_code(), "CONFIG_IO_ERROR");
        assert!(!io.is_user_error());
    }

    #[test]
    fn test_report_serializes_context() {
        let report = ErrorReport::new(
            "Polling failed",
            "RETRIES_EXHAUSTED",
            ErrorContext::subscription("jq_1").with_retry_count(4),
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["context"]["progress_id"], "jq_1");
        assert_eq!(json["context"]["retry_count"], 4);
        assert_eq!(json["context"]["source"], "subscription");
        assert!(json.get("error").is_none());
        assert!(json["timestamp"].is_string());
    }
}
