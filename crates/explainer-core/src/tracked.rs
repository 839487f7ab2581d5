use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use explainer_protocol::{JobStatus, JobUpdate};

/// Shared view of the last known status of every tracked job.
///
/// Fed from adapter update callbacks and read by job-queue panels as their
/// qualifying-work probe.
#[derive(Debug, Clone, Default)]
pub struct TrackedJobs {
    jobs: Arc<Mutex<BTreeMap<String, JobStatus>>>,
}

/// Job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub deleted: usize,
}

impl JobSummary {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed + self.deleted
    }
}

impl TrackedJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking `job_id` as pending unless it is already known.
    pub fn track(&self, job_id: impl Into<String>) {
        self.lock()
            .entry(job_id.into())
            .or_insert(JobStatus::Pending);
    }

    pub fn record_update(&self, job_id: &str, update: &JobUpdate) {
        self.lock().insert(job_id.to_string(), update.status());
    }

    pub fn remove(&self, job_id: &str) -> Option<JobStatus> {
        self.lock().remove(job_id)
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.lock().get(job_id).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True while any tracked job is still pending or processing.
    pub fn has_pending_work(&self) -> bool {
        self.lock().values().any(JobStatus::is_active)
    }

    pub fn summary(&self) -> JobSummary {
        let mut summary = JobSummary::default();
        for status in self.lock().values() {
            match status {
                JobStatus::Pending => summary.pending += 1,
                JobStatus::Processing => summary.processing += 1,
                JobStatus::Completed => summary.completed += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Deleted => summary.deleted += 1,
            }
        }
        summary
    }

    /// Forget every job that reached a terminal status. Returns how many were dropped.
    pub fn clear_finished(&self) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, status| !status.is_terminal());
        before - jobs.len()
    }

    /// Work probe for [`crate::PanelOptions::has_work`].
    pub fn as_probe(&self) -> impl Fn() -> bool + Send + Sync + 'static {
        let jobs = self.clone();
        move || jobs.has_pending_work()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, JobStatus>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}
