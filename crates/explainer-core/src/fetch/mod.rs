//! Status fetching seam.
//!
//! The adapter only sees [`StatusFetcher`]. Production code uses
//! [`AjaxStatusFetcher`]; tests script their own implementations.

mod ajax;

use futures::future::BoxFuture;

use explainer_protocol::{JobUpdate, ProtocolError};

use crate::errors::ExplainerError;

pub use ajax::{AjaxStatusFetcher, MAX_RESPONSE_BYTES};

/// Performs one status request for one progress id.
pub trait StatusFetcher: Send + Sync {
    fn fetch_status<'a>(&'a self, job_id: &'a str) -> BoxFuture<'a, Result<JobUpdate, FetchError>>;
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("request timed out")]
    Timeout,

    #[error("server returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return FetchError::Timeout;
        }
        if let Some(status) = e.status() {
            return FetchError::HttpStatus {
                status: status.as_u16(),
            };
        }
        FetchError::Transport {
            message: e.to_string(),
        }
    }
}

impl ExplainerError for FetchError {
    fn error_code(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "FETCH_TRANSPORT",
            FetchError::Timeout => "FETCH_TIMEOUT",
            FetchError::HttpStatus { .. } => "FETCH_HTTP_STATUS",
            FetchError::ResponseTooLarge { .. } => "FETCH_RESPONSE_TOO_LARGE",
            FetchError::Protocol(ProtocolError::Rejected { .. }) => "REQUEST_REJECTED",
            FetchError::Protocol(_) => "INVALID_RESPONSE",
        }
    }

    fn is_user_error(&self) -> bool {
        matches!(self, FetchError::Protocol(ProtocolError::Rejected { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_codes() {
        assert_eq!(FetchError::Timeout.error_code(), "FETCH_TIMEOUT");
        assert_eq!(
            FetchError::HttpStatus { status: 502 }.error_code(),
            "FETCH_HTTP_STATUS"
        );

        let rejected = FetchError::from(ProtocolError::Rejected {
            message: "Invalid nonce".to_string(),
        });
        assert_eq!(rejected.error_code(), "REQUEST_REJECTED");
        assert!(rejected.is_user_error());
        assert_eq!(
            rejected.to_string(),
            "request rejected by server: Invalid nonce"
        );
    }

    #[test]
    fn test_malformed_json_is_invalid_response() {
        let err = explainer_protocol::decode_status_response("not json").unwrap_err();
        let err = FetchError::from(err);
        assert_eq!(err.error_code(), "INVALID_RESPONSE");
        assert!(!err.is_user_error());
    }
}
