use crate::errors::ExplainerError;

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("subscription id must not be empty")]
    InvalidId,

    #[error("invalid adapter configuration: {message}")]
    Config { message: String },

    #[error("no tokio runtime available to run poll tasks")]
    NoRuntime,
}

impl ExplainerError for AdapterError {
    fn error_code(&self) -> &'static str {
        match self {
            AdapterError::InvalidId => "INVALID_SUBSCRIPTION_ID",
            AdapterError::Config { .. } => "ADAPTER_CONFIG_ERROR",
            AdapterError::NoRuntime => "NO_RUNTIME",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, AdapterError::InvalidId | AdapterError::Config { .. })
    }
}
