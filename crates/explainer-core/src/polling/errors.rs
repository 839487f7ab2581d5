use crate::errors::ExplainerError;

#[derive(Debug, thiserror::Error)]
pub enum PollingError {
    #[error("panel id must not be empty")]
    InvalidPanelId,

    #[error("invalid options for panel '{panel_id}': {message}")]
    InvalidOptions { panel_id: String, message: String },

    #[error("no tokio runtime available to run panel tasks")]
    NoRuntime,
}

impl ExplainerError for PollingError {
    fn error_code(&self) -> &'static str {
        match self {
            PollingError::InvalidPanelId => "INVALID_PANEL_ID",
            PollingError::InvalidOptions { .. } => "INVALID_PANEL_OPTIONS",
            PollingError::NoRuntime => "NO_RUNTIME",
        }
    }

    fn is_user_error(&self) -> bool {
        !matches!(self, PollingError::NoRuntime)
    }
}
