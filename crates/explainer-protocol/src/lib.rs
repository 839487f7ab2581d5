//! Wire types for the Explainer `get_job_status` AJAX contract.
//!
//! The WordPress backend is opaque; this crate only knows the request form
//! and the `{success, data}` response envelope.

mod messages;
mod types;

pub use messages::{
    AjaxEnvelope, GET_JOB_STATUS_ACTION, JobStatusData, StatusRequest, decode_status_response,
};
pub use types::{JobState, JobStatus, JobUpdate, PostInfo};

/// Errors produced while decoding a status response.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed JSON response: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("request rejected by server: {message}")]
    Rejected { message: String },

    #[error("invalid status payload: {message}")]
    InvalidPayload { message: String },

    #[error("unknown job status '{status}'")]
    UnknownStatus { status: String },
}
