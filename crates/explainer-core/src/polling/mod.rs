//! Panel orchestration: named polling loops that decide each tick whether
//! their callback is worth running at all.

mod errors;
mod panel;
mod types;

#[cfg(test)]
mod tests;

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::lifecycle::{PageLifecycle, Visibility};

use panel::{PanelShared, run_panel};

pub use errors::PollingError;
pub use types::{
    ManagerConfig, PanelCallback, PanelOptions, PanelStats, PollingStats, WorkProbe,
};

struct PanelEntry {
    generation: u64,
    shared: Arc<PanelShared>,
    cancel: CancellationToken,
}

pub(crate) struct ManagerInner {
    config: ManagerConfig,
    lifecycle: PageLifecycle,
    global_paused: AtomicBool,
    panels: Mutex<HashMap<String, PanelEntry>>,
    next_generation: AtomicU64,
    listener_installed: AtomicBool,
    shutdown: CancellationToken,
}

impl ManagerInner {
    fn panels(&self) -> MutexGuard<'_, HashMap<String, PanelEntry>> {
        self.panels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove `panel_id` only if it is still the registration `generation`.
    fn remove_if_current(&self, panel_id: &str, generation: u64) -> bool {
        let mut panels = self.panels();
        if panels.get(panel_id).map(|e| e.generation) != Some(generation) {
            return false;
        }
        panels.remove(panel_id).is_some()
    }

    fn live_panels(&self) -> Vec<Arc<PanelShared>> {
        self.panels()
            .values()
            .map(|entry| Arc::clone(&entry.shared))
            .collect()
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        let panels = self.panels.get_mut().unwrap_or_else(|e| e.into_inner());
        for (_, entry) in panels.drain() {
            entry.cancel.cancel();
        }
    }
}

/// Owns zero or more independent panel polling loops.
///
/// Cheap to clone; all clones share one registry.
#[derive(Clone)]
pub struct PollingManager {
    inner: Arc<ManagerInner>,
}

impl PollingManager {
    pub fn new(config: ManagerConfig, lifecycle: PageLifecycle) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                lifecycle,
                global_paused: AtomicBool::new(false),
                panels: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                listener_installed: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn lifecycle(&self) -> &PageLifecycle {
        &self.inner.lifecycle
    }

    /// Register `panel_id`, replacing any existing registration.
    ///
    /// The first tick runs after the settle delay; later ticks follow the
    /// panel's self-adjusting interval.
    pub fn start_conditional_polling(
        &self,
        panel_id: impl Into<String>,
        options: PanelOptions,
    ) -> Result<(), PollingError> {
        let panel_id = panel_id.into();
        if panel_id.trim().is_empty() {
            return Err(PollingError::InvalidPanelId);
        }
        let settings = options.resolve(&panel_id, &self.inner.config)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| PollingError::NoRuntime)?;
        self.install_listener(&runtime);

        info!(
            event = "core.polling.start_started",
            panel_id = %panel_id,
            interval_ms = settings.interval.as_millis() as u64,
            tab = %settings.tab,
        );

        let shared = Arc::new(PanelShared::new(panel_id.clone(), settings));
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();

        let previous = self.inner.panels().insert(
            panel_id.clone(),
            PanelEntry {
                generation,
                shared: Arc::clone(&shared),
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
            debug!(event = "core.polling.panel_replaced", panel_id = %panel_id);
        }

        runtime.spawn(run_panel(
            Arc::downgrade(&self.inner),
            shared,
            cancel,
            generation,
            self.inner.config.settle_delay,
        ));
        Ok(())
    }

    /// Cancel and remove `panel_id`. Returns whether it was registered.
    pub fn stop_polling(&self, panel_id: &str) -> bool {
        let removed = self.inner.panels().remove(panel_id);
        match removed {
            Some(entry) => {
                entry.cancel.cancel();
                info!(event = "core.polling.stop_completed", panel_id = panel_id);
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) -> usize {
        let drained: Vec<PanelEntry> = self.inner.panels().drain().map(|(_, e)| e).collect();
        for entry in &drained {
            entry.cancel.cancel();
        }
        info!(event = "core.polling.stop_all_completed", count = drained.len());
        drained.len()
    }

    /// Swap the panel's timer for one at `new_interval`, keeping its state.
    pub fn restart_polling(&self, panel_id: &str, new_interval: Duration) -> bool {
        if new_interval.is_zero() {
            return false;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return false;
        };

        let mut panels = self.inner.panels();
        let Some(entry) = panels.get_mut(panel_id) else {
            return false;
        };

        entry.cancel.cancel();
        entry.cancel = CancellationToken::new();
        entry.generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        entry.shared.state().current_interval = new_interval;

        let shared = Arc::clone(&entry.shared);
        let cancel = entry.cancel.clone();
        let generation = entry.generation;
        drop(panels);

        runtime.spawn(run_panel(
            Arc::downgrade(&self.inner),
            shared,
            cancel,
            generation,
            new_interval,
        ));
        info!(
            event = "core.polling.restart_completed",
            panel_id = panel_id,
            interval_ms = new_interval.as_millis() as u64,
        );
        true
    }

    pub fn pause_all_polling(&self) {
        if !self.inner.global_paused.swap(true, Ordering::SeqCst) {
            info!(event = "core.polling.pause_all_completed");
        }
    }

    /// Clear the global pause and poll every active-tab panel at once.
    pub fn resume_all_polling(&self) {
        if !self.inner.global_paused.swap(false, Ordering::SeqCst) {
            return;
        }
        let polled = self.poll_active_panels(None);
        info!(event = "core.polling.resume_all_completed", polled = polled);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.global_paused.load(Ordering::SeqCst)
    }

    pub fn get_stats(&self) -> PollingStats {
        let page = self.inner.lifecycle.state();
        let panels: BTreeMap<String, PanelStats> = self
            .inner
            .live_panels()
            .iter()
            .map(|shared| {
                let tab_active = page.is_tab_active(&shared.settings.tab);
                (shared.id.clone(), shared.stats(tab_active))
            })
            .collect();

        PollingStats {
            global_paused: self.is_paused(),
            total_panels: panels.len(),
            panels,
        }
    }

    /// Wake panels whose tab is active (optionally only those on `tab`).
    fn poll_active_panels(&self, tab: Option<&str>) -> usize {
        let page = self.inner.lifecycle.state();
        let mut polled = 0;
        for shared in self.inner.live_panels() {
            let panel_tab = shared.settings.tab.as_str();
            if tab.is_some_and(|tab| tab != panel_tab) {
                continue;
            }
            if shared.settings.requires_active_tab && !page.is_tab_active(panel_tab) {
                continue;
            }
            shared.poll_now.notify_one();
            polled += 1;
        }
        polled
    }

    fn install_listener(&self, runtime: &tokio::runtime::Handle) {
        if self.inner.listener_installed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.inner.lifecycle.is_hidden() {
            self.inner.global_paused.store(true, Ordering::SeqCst);
        }
        runtime.spawn(listen_lifecycle(
            Arc::downgrade(&self.inner),
            self.inner.lifecycle.clone(),
            self.inner.shutdown.clone(),
        ));
    }
}

async fn listen_lifecycle(
    weak: Weak<ManagerInner>,
    lifecycle: PageLifecycle,
    shutdown: CancellationToken,
) {
    let mut rx = lifecycle.subscribe();
    let mut last = rx.borrow_and_update().clone();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        let page = rx.borrow_and_update().clone();
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let manager = PollingManager { inner };

        if page.visibility != last.visibility {
            match page.visibility {
                Visibility::Hidden => manager.pause_all_polling(),
                Visibility::Visible => manager.resume_all_polling(),
                Visibility::Unloading => {
                    manager.stop_all();
                    return;
                }
            }
        }

        if page.active_tab != last.active_tab {
            let polled = match page.active_tab.as_deref() {
                Some(tab) => manager.poll_active_panels(Some(tab)),
                None => manager.poll_active_panels(None),
            };
            debug!(
                event = "core.polling.tab_activated",
                tab = ?page.active_tab,
                polled = polled,
            );
        }

        last = page;
    }
}
