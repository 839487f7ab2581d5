use serde::{Deserialize, Serialize};

use crate::messages::JobStatusData;

/// Job status as reported by the `get_job_status` endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Deleted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Deleted => "deleted",
        }
    }

    /// Terminal statuses stop a subscription permanently.
    ///
    /// `Deleted` is not terminal: the server may still re-queue the job.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the job still counts as in-progress work.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = crate::ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::ProtocolError::UnknownStatus {
                status: s.to_string(),
            })
    }
}

/// Opaque post metadata attached to completed blog-post jobs.
pub type PostInfo = serde_json::Map<String, serde_json::Value>;

/// State-specific payload of a job status update.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Processing,
    Completed { post_info: Option<PostInfo> },
    Failed { error_message: String },
    Deleted,
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Processing => JobStatus::Processing,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
            JobState::Deleted => JobStatus::Deleted,
        }
    }
}

/// A validated status update for one job.
///
/// Built from the wire payload at the fetch boundary; everything past that
/// point works with the typed [`JobState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "JobStatusData", into = "JobStatusData")]
pub struct JobUpdate {
    pub job_id: Option<String>,
    pub state: JobState,
    pub progress_percent: Option<f64>,
    pub progress_text: Option<String>,
}

impl JobUpdate {
    pub fn new(state: JobState) -> Self {
        Self {
            job_id: None,
            state,
            progress_percent: None,
            progress_text: None,
        }
    }

    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn with_progress(mut self, percent: f64, text: impl Into<String>) -> Self {
        self.progress_percent = Some(percent);
        self.progress_text = Some(text.into());
        self
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error_message } => Some(error_message),
            _ => None,
        }
    }
}
