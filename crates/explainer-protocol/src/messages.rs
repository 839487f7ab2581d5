use serde::{Deserialize, Deserializer, Serialize};

use crate::ProtocolError;
use crate::types::{JobState, JobStatus, JobUpdate, PostInfo};

/// AJAX action name handled by the WordPress backend.
pub const GET_JOB_STATUS_ACTION: &str = "get_job_status";

const DEFAULT_FAILURE_MESSAGE: &str = "Job failed";
const DEFAULT_REJECTION_MESSAGE: &str = "request rejected";

/// Form-encoded body of a `get_job_status` request.
#[derive(Debug, Clone, Serialize)]
pub struct StatusRequest<'a> {
    pub action: &'static str,
    pub job_id: &'a str,
    pub nonce: &'a str,
}

impl<'a> StatusRequest<'a> {
    pub fn new(job_id: &'a str, nonce: &'a str) -> Self {
        Self {
            action: GET_JOB_STATUS_ACTION,
            job_id,
            nonce,
        }
    }
}

/// The `{success, data}` envelope produced by `wp_send_json_*`.
#[derive(Debug, Deserialize)]
pub struct AjaxEnvelope {
    pub success: bool,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Wire shape of the `data` object on a successful status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusData {
    pub status: String,
    #[serde(
        default,
        deserialize_with = "number_or_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub progress_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_info: Option<PostInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl TryFrom<JobStatusData> for JobUpdate {
    type Error = ProtocolError;

    fn try_from(data: JobStatusData) -> Result<Self, Self::Error> {
        let status: JobStatus = data.status.parse()?;
        let state = match status {
            JobStatus::Pending => JobState::Pending,
            JobStatus::Processing => JobState::Processing,
            JobStatus::Completed => JobState::Completed {
                post_info: data.post_info,
            },
            JobStatus::Failed => JobState::Failed {
                error_message: data
                    .error_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            },
            JobStatus::Deleted => JobState::Deleted,
        };

        if let Some(percent) = data.progress_percent
            && !(0.0..=100.0).contains(&percent)
        {
            return Err(ProtocolError::InvalidPayload {
                message: format!("progress_percent out of range: {percent}"),
            });
        }

        Ok(JobUpdate {
            job_id: data.job_id,
            state,
            progress_percent: data.progress_percent,
            progress_text: data.progress_text,
        })
    }
}

impl From<JobUpdate> for JobStatusData {
    fn from(update: JobUpdate) -> Self {
        let status = update.status().as_str().to_string();
        let (error_message, post_info) = match update.state {
            JobState::Failed { error_message } => (Some(error_message), None),
            JobState::Completed { post_info } => (None, post_info),
            _ => (None, None),
        };
        JobStatusData {
            status,
            progress_percent: update.progress_percent,
            progress_text: update.progress_text,
            error_message,
            post_info,
            job_id: update.job_id,
        }
    }
}

/// Decode a raw `get_job_status` response body.
///
/// Malformed JSON, `success: false`, a missing/unknown status and out-of-range
/// progress are all errors; callers treat every one of them as a failed poll.
pub fn decode_status_response(body: &str) -> Result<JobUpdate, ProtocolError> {
    let envelope: AjaxEnvelope = serde_json::from_str(body)?;

    if !envelope.success {
        return Err(ProtocolError::Rejected {
            message: rejection_message(&envelope.data),
        });
    }

    let data: JobStatusData =
        serde_json::from_value(envelope.data).map_err(|e| ProtocolError::InvalidPayload {
            message: e.to_string(),
        })?;

    JobUpdate::try_from(data)
}

fn rejection_message(data: &serde_json::Value) -> String {
    match data {
        serde_json::Value::String(s) if !s.is_empty() => s.clone(),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_REJECTION_MESSAGE)
            .to_string(),
        _ => DEFAULT_REJECTION_MESSAGE.to_string(),
    }
}

/// PHP backends are loose about numeric types; accept `42`, `42.5` and `"42"`.
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(f64),
        Text(String),
    }

    match Option::<Loose>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Loose::Number(n)) => Ok(Some(n)),
        Some(Loose::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Loose::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
