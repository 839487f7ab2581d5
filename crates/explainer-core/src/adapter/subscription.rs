//! Per-subscription state and the poll loop that drives it.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use explainer_protocol::{JobStatus, JobUpdate};

use super::ErrorHandlers;
use super::types::{
    AdapterConfig, ConnectOptions, ConnectionSnapshot, ConnectionStatus, UpdateCallback,
    UpdateContext,
};
use crate::errors::{ErrorContext, ErrorReport};
use crate::fetch::StatusFetcher;

#[derive(Debug, Default)]
pub(super) struct SubscriptionState {
    pub status: ConnectionStatus,
    pub retry_count: u32,
    pub last_job_status: Option<JobStatus>,
    pub polling: bool,
}

/// State shared between the registry, the poll task and subscription handles.
pub(super) struct SubscriptionShared {
    pub context: UpdateContext,
    pub options: Mutex<ConnectOptions>,
    pub on_update: Mutex<UpdateCallback>,
    pub state: Mutex<SubscriptionState>,
    pub status_tx: watch::Sender<ConnectionStatus>,
    pub paused_tx: watch::Sender<bool>,
    pub active_tx: watch::Sender<bool>,
}

impl SubscriptionShared {
    pub fn new(id: String, on_update: UpdateCallback, options: ConnectOptions, paused: bool) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (paused_tx, _) = watch::channel(paused);
        let (active_tx, _) = watch::channel(false);
        Self {
            context: UpdateContext { id },
            options: Mutex::new(options),
            on_update: Mutex::new(on_update),
            state: Mutex::new(SubscriptionState::default()),
            status_tx,
            paused_tx,
            active_tx,
        }
    }

    pub fn id(&self) -> &str {
        &self.context.id
    }

    pub fn state(&self) -> MutexGuard<'_, SubscriptionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn options(&self) -> ConnectOptions {
        self.options.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn replace_options(&self, options: ConnectOptions) {
        *self.options.lock().unwrap_or_else(|e| e.into_inner()) = options;
    }

    pub fn replace_callback(&self, on_update: UpdateCallback) {
        *self.on_update.lock().unwrap_or_else(|e| e.into_inner()) = on_update;
    }

    fn callback(&self) -> UpdateCallback {
        self.on_update
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_polling(&self) -> bool {
        self.state().polling
    }

    pub fn set_paused(&self, paused: bool) -> bool {
        self.paused_tx.send_if_modified(|current| {
            if *current == paused {
                return false;
            }
            *current = paused;
            true
        })
    }

    /// Mark the poll task as running and reset per-run counters.
    pub fn begin_run(&self) {
        let mut state = self.state();
        state.retry_count = 0;
        state.polling = true;
        drop(state);
        self.active_tx.send_replace(true);
    }

    /// Record a status transition and notify `on_status_change`.
    pub fn set_status(&self, status: ConnectionStatus, cancel: Option<&CancellationToken>) {
        if self.record_status(status, cancel) {
            self.notify_status_change(status);
        }
    }

    /// Store and broadcast `status`. Returns whether it changed.
    ///
    /// Writes from a cancelled poll task are dropped.
    pub fn record_status(&self, status: ConnectionStatus, cancel: Option<&CancellationToken>) -> bool {
        {
            let mut state = self.state();
            if cancel.is_some_and(CancellationToken::is_cancelled) || state.status == status {
                return false;
            }
            state.status = status;
        }
        self.status_tx.send_replace(status);

        debug!(
            event = "core.adapter.status_changed",
            id = self.id(),
            status = %status,
        );
        true
    }

    pub fn notify_status_change(&self, status: ConnectionStatus) {
        if let Some(callback) = self.options().on_status_change {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
                callback(status, &self.context);
            }));
            if outcome.is_err() {
                error!(
                    event = "core.adapter.status_callback_panicked",
                    id = self.id()
                );
            }
        }
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        let priority = self.options().priority;
        let paused = *self.paused_tx.borrow();
        let state = self.state();
        ConnectionSnapshot {
            status: state.status,
            retry_count: state.retry_count,
            paused,
            priority,
            polling: state.polling,
            last_job_status: state.last_job_status,
        }
    }

    pub fn handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.context.id.clone(),
            status_rx: self.status_tx.subscribe(),
            active_rx: self.active_tx.subscribe(),
        }
    }
}

/// Clears the running flag however the poll task ends.
struct RunGuard(Arc<SubscriptionShared>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.state().polling = false;
        self.0.active_tx.send_replace(false);
    }
}

/// Awaitable view of one subscription, returned by `connect`.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: String,
    status_rx: watch::Receiver<ConnectionStatus>,
    active_rx: watch::Receiver<bool>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status_rx.borrow()
    }

    pub fn is_polling(&self) -> bool {
        *self.active_rx.borrow()
    }

    /// Wait until the connection status satisfies `predicate`.
    ///
    /// Returns the last known status if the subscription is dropped first.
    pub async fn wait_for<F>(&mut self, mut predicate: F) -> ConnectionStatus
    where
        F: FnMut(&ConnectionStatus) -> bool,
    {
        let found = self
            .status_rx
            .wait_for(|status| predicate(status))
            .await
            .map(|status| *status)
            .ok();
        found.unwrap_or_else(|| *self.status_rx.borrow())
    }

    /// Wait until the poll task has stopped for any reason.
    pub async fn finished(&mut self) -> ConnectionStatus {
        let _ = self.active_rx.wait_for(|active| !*active).await;
        *self.status_rx.borrow()
    }
}

/// Everything a poll task needs besides its own subscription.
#[derive(Clone)]
pub(super) struct PollContext {
    pub fetcher: Arc<dyn StatusFetcher>,
    pub config: AdapterConfig,
    pub error_handlers: Arc<ErrorHandlers>,
}

enum Next {
    Wait(Duration),
    Stop,
}

pub(super) async fn run_subscription(
    shared: Arc<SubscriptionShared>,
    poll: PollContext,
    cancel: CancellationToken,
) {
    let _guard = RunGuard(Arc::clone(&shared));
    let options = shared.options();
    let max_retries = options.max_retries.unwrap_or(poll.config.max_retries);
    let retry_policy = poll.config.retry_policy();
    let mut paused_rx = shared.paused_tx.subscribe();

    info!(
        event = "core.adapter.subscription_started",
        id = shared.id(),
        max_retries = max_retries,
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = wait_resumed(&mut paused_rx) => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = poll.fetcher.fetch_status(shared.id()) => result,
        };
        if cancel.is_cancelled() {
            return;
        }

        let next = match result {
            Ok(update) => handle_update(&shared, &poll, &cancel, update),
            Err(e) => {
                let retry_count = {
                    let mut state = shared.state();
                    state.retry_count += 1;
                    state.retry_count
                };

                if retry_count > max_retries {
                    shared.set_status(ConnectionStatus::Failed, Some(&cancel));
                    error!(
                        event = "core.adapter.subscription_failed",
                        id = shared.id(),
                        retry_count = retry_count,
                        error = %e,
                    );
                    let report = ErrorReport::from_error(
                        format!(
                            "Polling for {} failed after {retry_count} attempts",
                            shared.id()
                        ),
                        &e,
                        ErrorContext::subscription(shared.id()).with_retry_count(retry_count),
                    );
                    poll.error_handlers.report(&report);
                    Next::Stop
                } else {
                    warn!(
                        event = "core.adapter.poll_failed",
                        id = shared.id(),
                        retry_count = retry_count,
                        max_retries = max_retries,
                        error = %e,
                    );
                    shared.set_status(ConnectionStatus::Error, Some(&cancel));
                    Next::Wait(retry_policy.delay_for(retry_count))
                }
            }
        };

        let delay = match next {
            Next::Wait(delay) => delay,
            Next::Stop => return,
        };

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = &mut sleep => {}
            // A pause or resume cuts the wait short; the loop head then
            // blocks while paused and polls at once on resume.
            _ = paused_rx.changed() => {}
        }
    }
}

async fn wait_resumed(paused_rx: &mut watch::Receiver<bool>) {
    let _ = paused_rx.wait_for(|paused| !*paused).await;
}

fn handle_update(
    shared: &SubscriptionShared,
    poll: &PollContext,
    cancel: &CancellationToken,
    update: JobUpdate,
) -> Next {
    let job_status = update.status();
    {
        let mut state = shared.state();
        state.retry_count = 0;
        state.last_job_status = Some(job_status);
    }
    shared.record_status(ConnectionStatus::Connected, Some(cancel));

    if cancel.is_cancelled() {
        return Next::Stop;
    }
    let callback = shared.callback();
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        callback(&update, &shared.context);
    }));
    if outcome.is_err() {
        error!(event = "core.adapter.update_callback_panicked", id = shared.id());
    }
    // Every successful poll reports `Connected`, not only the first.
    if !cancel.is_cancelled() {
        shared.notify_status_change(ConnectionStatus::Connected);
    }

    debug!(
        event = "core.adapter.update_delivered",
        id = shared.id(),
        job_status = %job_status,
        progress_percent = update.progress_percent,
    );

    if !update.is_terminal() {
        return Next::Wait(poll.config.poll_interval);
    }

    if let Some(message) = update.error_message() {
        let report = ErrorReport {
            error: Some(message.to_string()),
            ..ErrorReport::new(
                format!("Job {} failed", shared.id()),
                "JOB_FAILED",
                ErrorContext::subscription(shared.id()).with_job_status(job_status),
            )
        };
        poll.error_handlers.report(&report);
    }

    info!(
        event = "core.adapter.subscription_completed",
        id = shared.id(),
        job_status = %job_status,
    );
    Next::Stop
}
