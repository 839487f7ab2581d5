//! # explainer-core
//!
//! Adaptive status polling for Explainer background jobs.
//!
//! Two independent layers share page visibility through [`PageLifecycle`]:
//!
//! - [`JobConnectionAdapter`] keeps one polled "connection" per job id and
//!   hides retry, backoff and termination from callers.
//! - [`PollingManager`] runs named panel loops that skip their callback when
//!   the panel is off-screen or has nothing in progress, and stretch their
//!   interval while idle.
//!
//! Status requests go through the [`StatusFetcher`] seam;
//! [`AjaxStatusFetcher`] is the `admin-ajax.php` implementation.

pub mod adapter;
pub mod errors;
pub mod fetch;
pub mod lifecycle;
pub mod logging;
pub mod polling;
pub mod retry;
pub mod tracked;

pub use adapter::{
    AdapterConfig, AdapterError, AdapterStatus, ConnectOptions, ConnectionSnapshot,
    ConnectionStatus, JobConnectionAdapter, Priority, SubscriptionHandle, UpdateContext,
};
pub use errors::{ErrorContext, ErrorReport, ErrorSource, ExplainerError};
pub use fetch::{AjaxStatusFetcher, FetchError, StatusFetcher};
pub use lifecycle::{PageLifecycle, PageState, Visibility};
pub use logging::{LogHandle, init_logging, init_logging_with};
pub use polling::{
    ManagerConfig, PanelOptions, PanelStats, PollingError, PollingManager, PollingStats,
};
pub use retry::{IdleBackoff, RetryPolicy};
pub use tracked::{JobSummary, TrackedJobs};

pub use explainer_protocol::{JobState, JobStatus, JobUpdate};
