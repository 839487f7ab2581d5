//! Subscription layer: one polled "connection" per job id.
//!
//! Each subscription runs as its own tokio task. Every await in that task
//! is raced against the subscription's cancellation token, so once
//! `disconnect` cancels it the task never acts again.

mod errors;
mod subscription;
mod types;


use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use explainer_protocol::JobUpdate;

use crate::errors::{ErrorContext, ErrorReport};
use crate::fetch::StatusFetcher;
use crate::lifecycle::{PageLifecycle, Visibility};

use subscription::{PollContext, SubscriptionShared, run_subscription};

pub use errors::AdapterError;
pub use subscription::SubscriptionHandle;
pub use types::{
    AdapterConfig, AdapterStatus, ConnectOptions, ConnectionSnapshot, ConnectionStatus,
    ErrorHandler, Priority, StatusChangeCallback, UpdateCallback, UpdateContext,
};

/// Registered error handlers. Panicking handlers are logged and skipped.
#[derive(Default)]
pub(crate) struct ErrorHandlers {
    handlers: Mutex<Vec<ErrorHandler>>,
}

impl ErrorHandlers {
    fn push(&self, handler: ErrorHandler) {
        self.handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    pub(crate) fn report(&self, report: &ErrorReport) {
        let handlers = self
            .handlers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for handler in handlers {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(report)));
            if outcome.is_err() {
                error!(
                    event = "core.adapter.error_handler_panicked",
                    error_code = report.error_code,
                );
            }
        }
    }
}

struct Subscription {
    shared: Arc<SubscriptionShared>,
    cancel: CancellationToken,
}

struct AdapterInner {
    fetcher: Arc<dyn StatusFetcher>,
    config: AdapterConfig,
    lifecycle: Option<PageLifecycle>,
    initialised: Mutex<bool>,
    global_paused: AtomicBool,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    error_handlers: Arc<ErrorHandlers>,
    shutdown: CancellationToken,
}

impl Drop for AdapterInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let subscriptions = self.subscriptions.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, subscription) in subscriptions.drain() {
            subscription.cancel.cancel();
        }
    }
}

/// Polling-backed job status "connections".
///
/// Cheap to clone; all clones share one registry. Dropping the last clone
/// stops every subscription.
#[derive(Clone)]
pub struct JobConnectionAdapter {
    inner: Arc<AdapterInner>,
}

impl JobConnectionAdapter {
    pub fn new(fetcher: Arc<dyn StatusFetcher>, config: AdapterConfig) -> Self {
        Self::build(fetcher, config, None)
    }

    /// Like [`Self::new`], with pause/resume/teardown driven by `lifecycle`.
    pub fn with_lifecycle(
        fetcher: Arc<dyn StatusFetcher>,
        config: AdapterConfig,
        lifecycle: PageLifecycle,
    ) -> Self {
        Self::build(fetcher, config, Some(lifecycle))
    }

    fn build(
        fetcher: Arc<dyn StatusFetcher>,
        config: AdapterConfig,
        lifecycle: Option<PageLifecycle>,
    ) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                fetcher,
                config,
                lifecycle,
                initialised: Mutex::new(false),
                global_paused: AtomicBool::new(false),
                subscriptions: Mutex::new(HashMap::new()),
                error_handlers: Arc::new(ErrorHandlers::default()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    /// One-time setup. Safe to call repeatedly.
    ///
    /// Validates the runtime config and installs the page-lifecycle
    /// listener. An invalid config is reported to the error handlers and
    /// returned; the adapter stays uninitialised.
    pub fn initialise(&self) -> Result<(), AdapterError> {
        let mut initialised = self
            .inner
            .initialised
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if *initialised {
            return Ok(());
        }

        info!(event = "core.adapter.initialise_started");

        if let Err(e) = self.inner.config.validate() {
            error!(event = "core.adapter.initialise_failed", error = %e);
            let report = ErrorReport::from_error(
                "Adapter failed to initialise",
                &e,
                ErrorContext::adapter(),
            );
            drop(initialised);
            self.inner.error_handlers.report(&report);
            return Err(e);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| AdapterError::NoRuntime)?;

        if let Some(lifecycle) = &self.inner.lifecycle {
            if lifecycle.is_hidden() {
                self.inner.global_paused.store(true, Ordering::SeqCst);
            }
            runtime.spawn(listen_lifecycle(
                Arc::downgrade(&self.inner),
                lifecycle.clone(),
                self.inner.shutdown.clone(),
            ));
        }

        *initialised = true;
        let config = &self.inner.config;
        debug!(
            event = "core.adapter.initialise_completed",
            poll_interval_ms = config.poll_interval.as_millis() as u64,
            poll_backoff_max_ms = config.poll_backoff_max.as_millis() as u64,
            max_retries = config.max_retries,
            retry_delay_ms = config.retry_delay.as_millis() as u64,
            lifecycle = self.inner.lifecycle.is_some(),
        );
        Ok(())
    }

    /// Start polling `id`, or retarget an existing subscription's callback.
    ///
    /// A subscription that is still polling keeps its loop and only swaps
    /// `on_update`; the new `options` are ignored until it stops. One that
    /// already stopped (terminal or failed) is restarted with the new
    /// callback and options.
    pub fn connect<F>(
        &self,
        id: impl Into<String>,
        on_update: F,
        options: ConnectOptions,
    ) -> Result<SubscriptionHandle, AdapterError>
    where
        F: Fn(&JobUpdate, &UpdateContext) + Send + Sync + 'static,
    {
        self.initialise()?;

        let id = id.into();
        if id.trim().is_empty() {
            return Err(AdapterError::InvalidId);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| AdapterError::NoRuntime)?;
        let on_update: UpdateCallback = Arc::new(on_update);

        let mut subscriptions = self.subscriptions();
        if let Some(existing) = subscriptions.get_mut(&id) {
            if existing.shared.is_polling() {
                existing.shared.replace_callback(on_update);
                debug!(
                    event = "core.adapter.callback_replaced",
                    id = %id,
                    options_ignored = true,
                    priority = ?options.priority,
                );
                return Ok(existing.shared.handle());
            }

            info!(event = "core.adapter.connect_started", id = %id, restart = true);
            existing.shared.replace_callback(on_update);
            existing.shared.replace_options(options);
            existing.cancel = CancellationToken::new();
            let shared = Arc::clone(&existing.shared);
            let cancel = existing.cancel.clone();
            drop(subscriptions);

            self.spawn_subscription(&runtime, shared.clone(), cancel);
            return Ok(shared.handle());
        }

        info!(event = "core.adapter.connect_started", id = %id, priority = ?options.priority);
        let paused = self.inner.global_paused.load(Ordering::SeqCst);
        let shared = Arc::new(SubscriptionShared::new(id.clone(), on_update, options, paused));
        let cancel = CancellationToken::new();
        subscriptions.insert(
            id,
            Subscription {
                shared: Arc::clone(&shared),
                cancel: cancel.clone(),
            },
        );
        drop(subscriptions);

        let handle = shared.handle();
        self.spawn_subscription(&runtime, shared, cancel);
        Ok(handle)
    }

    fn spawn_subscription(
        &self,
        runtime: &tokio::runtime::Handle,
        shared: Arc<SubscriptionShared>,
        cancel: CancellationToken,
    ) {
        shared.begin_run();
        shared.set_status(ConnectionStatus::Connecting, Some(&cancel));
        let poll = PollContext {
            fetcher: Arc::clone(&self.inner.fetcher),
            config: self.inner.config,
            error_handlers: Arc::clone(&self.inner.error_handlers),
        };
        runtime.spawn(run_subscription(shared, poll, cancel));
    }

    /// Stop and forget `id`. Unknown ids are ignored.
    pub fn disconnect(&self, id: &str) {
        let removed = self.subscriptions().remove(id);
        if let Some(subscription) = removed {
            finish_subscription(subscription);
            info!(event = "core.adapter.disconnect_completed", id = id);
        }
    }

    pub fn disconnect_all(&self) {
        let drained: Vec<Subscription> = self.subscriptions().drain().map(|(_, s)| s).collect();
        let count = drained.len();
        for subscription in drained {
            finish_subscription(subscription);
        }
        info!(event = "core.adapter.disconnect_all_completed", count = count);
    }

    /// Suspend every subscription without discarding its state.
    pub fn pause_all(&self) {
        if self.inner.global_paused.swap(true, Ordering::SeqCst) {
            return;
        }
        let count = self.for_each_shared(|shared| {
            shared.set_paused(true);
        });
        info!(event = "core.adapter.pause_all_completed", count = count);
    }

    /// Resume every subscription; each polls immediately.
    ///
    /// Failed subscriptions connected with `auto_reconnect` are restarted.
    pub fn resume_all(&self) {
        if !self.inner.global_paused.swap(false, Ordering::SeqCst) {
            return;
        }
        let count = self.for_each_shared(|shared| {
            shared.set_paused(false);
        });
        info!(event = "core.adapter.resume_all_completed", count = count);
        self.reconnect_failed();
    }

    fn reconnect_failed(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(event = "core.adapter.reconnect_skipped", reason = "no runtime");
            return;
        };

        let mut restarts = Vec::new();
        {
            let mut subscriptions = self.subscriptions();
            for (id, subscription) in subscriptions.iter_mut() {
                let shared = &subscription.shared;
                let failed = shared.state().status == ConnectionStatus::Failed;
                if failed && !shared.is_polling() && shared.options().auto_reconnect {
                    subscription.cancel = CancellationToken::new();
                    restarts.push((
                        id.clone(),
                        Arc::clone(shared),
                        subscription.cancel.clone(),
                    ));
                }
            }
        }

        for (id, shared, cancel) in restarts {
            info!(event = "core.adapter.reconnect_started", id = %id);
            self.spawn_subscription(&runtime, shared, cancel);
        }
    }

    /// Register a process-wide failure handler.
    pub fn on_error<F>(&self, handler: F)
    where
        F: Fn(&ErrorReport) + Send + Sync + 'static,
    {
        self.inner.error_handlers.push(Arc::new(handler));
    }

    pub fn get_status(&self) -> AdapterStatus {
        let initialised = *self
            .inner
            .initialised
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let shared: Vec<Arc<SubscriptionShared>> = self
            .subscriptions()
            .values()
            .map(|s| Arc::clone(&s.shared))
            .collect();

        let connections: BTreeMap<String, ConnectionSnapshot> = shared
            .iter()
            .map(|s| (s.id().to_string(), s.snapshot()))
            .collect();

        AdapterStatus {
            initialised,
            total_connections: connections.len(),
            global_paused: self.inner.global_paused.load(Ordering::SeqCst),
            connections,
        }
    }

    /// Handle for an existing subscription.
    pub fn subscription(&self, id: &str) -> Option<SubscriptionHandle> {
        self.subscriptions().get(id).map(|s| s.shared.handle())
    }

    pub fn is_paused(&self) -> bool {
        self.inner.global_paused.load(Ordering::SeqCst)
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<String, Subscription>> {
        self.inner
            .subscriptions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    fn for_each_shared(&self, f: impl Fn(&SubscriptionShared)) -> usize {
        let shared: Vec<Arc<SubscriptionShared>> = self
            .subscriptions()
            .values()
            .map(|s| Arc::clone(&s.shared))
            .collect();
        for s in &shared {
            f(s);
        }
        shared.len()
    }
}

fn finish_subscription(subscription: Subscription) {
    subscription.cancel.cancel();
    subscription
        .shared
        .set_status(ConnectionStatus::Disconnected, None);
}

async fn listen_lifecycle(
    weak: Weak<AdapterInner>,
    lifecycle: PageLifecycle,
    shutdown: CancellationToken,
) {
    let mut rx = lifecycle.subscribe();
    let mut last = rx.borrow_and_update().visibility;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let visibility = rx.borrow_and_update().visibility;
        if visibility == last {
            continue;
        }
        last = visibility;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        let adapter = JobConnectionAdapter { inner };
        match visibility {
            Visibility::Hidden => adapter.pause_all(),
            Visibility::Visible => adapter.resume_all(),
            Visibility::Unloading => {
                adapter.disconnect_all();
                return;
            }
        }
    }
}
