//! One panel's state and its self-scheduling poll loop.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::ManagerInner;
use super::types::{PanelSettings, PanelStats};

#[derive(Debug)]
pub(super) struct PanelState {
    pub current_interval: Duration,
    pub idle_cycles: u32,
    pub start_time: Instant,
    pub last_work_at: Option<Instant>,
    pub poll_count: u64,
}

pub(super) struct PanelShared {
    pub id: String,
    pub settings: PanelSettings,
    pub state: Mutex<PanelState>,
    /// Cuts the current wait short and ticks at once.
    pub poll_now: Notify,
}

impl PanelShared {
    pub fn new(id: String, settings: PanelSettings) -> Self {
        let state = PanelState {
            current_interval: settings.interval,
            idle_cycles: 0,
            start_time: Instant::now(),
            last_work_at: None,
            poll_count: 0,
        };
        Self {
            id,
            settings,
            state: Mutex::new(state),
            poll_now: Notify::new(),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self, tab_active: bool) -> PanelStats {
        // Probe before locking: it is caller code.
        let has_work = self.settings.has_work();
        let state = self.state();
        PanelStats {
            current_interval_ms: state.current_interval.as_millis() as u64,
            idle_cycles: state.idle_cycles,
            uptime_ms: state.start_time.elapsed().as_millis() as u64,
            tab_active,
            has_work,
            poll_count: state.poll_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum TickOutcome {
    /// Paused or on an inactive tab. Nothing changed.
    Skipped,
    /// The interval was recomputed; the callback waits for the next tick.
    IntervalChanged(Duration),
    Invoke,
    /// Idle limit reached. The panel is done.
    Stop,
}

/// Decide what this tick does, updating idle tracking and the interval.
pub(super) fn evaluate_tick(
    shared: &PanelShared,
    inner: &ManagerInner,
    now: Instant,
) -> TickOutcome {
    if inner.global_paused.load(Ordering::SeqCst) {
        return TickOutcome::Skipped;
    }

    let settings = &shared.settings;
    if settings.requires_active_tab && !inner.lifecycle.is_tab_active(&settings.tab) {
        return TickOutcome::Skipped;
    }

    let has_work = settings.has_work();
    let mut state = shared.state();

    if has_work {
        state.idle_cycles = 0;
        state.last_work_at = Some(now);
    } else if settings.requires_processing_jobs {
        state.idle_cycles += 1;
        if state.idle_cycles >= settings.max_idle_cycles {
            return TickOutcome::Stop;
        }
    }

    if settings.dynamic_interval {
        let ideal = if has_work {
            settings.min_interval
        } else {
            let idle_since = state.last_work_at.unwrap_or(state.start_time);
            inner.config.backoff.interval(
                settings.interval,
                settings.min_interval,
                settings.max_interval,
                now.saturating_duration_since(idle_since),
            )
        };
        if ideal != state.current_interval {
            state.current_interval = ideal;
            return TickOutcome::IntervalChanged(ideal);
        }
    }

    TickOutcome::Invoke
}

pub(super) async fn run_panel(
    manager: Weak<ManagerInner>,
    shared: Arc<PanelShared>,
    cancel: CancellationToken,
    generation: u64,
    first_delay: Duration,
) {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(first_delay) => {}
        _ = shared.poll_now.notified() => {}
    }

    loop {
        let outcome = {
            let Some(inner) = manager.upgrade() else {
                return;
            };
            if cancel.is_cancelled() {
                return;
            }
            let outcome = evaluate_tick(&shared, &inner, Instant::now());
            if outcome == TickOutcome::Stop {
                inner.remove_if_current(&shared.id, generation);
                info!(
                    event = "core.polling.panel_idle_stopped",
                    panel_id = %shared.id,
                    idle_cycles = shared.state().idle_cycles,
                );
                return;
            }
            outcome
        };

        match outcome {
            TickOutcome::Invoke => {
                let callback = (shared.settings.callback)();
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    _ = callback => {}
                }
                shared.state().poll_count += 1;
            }
            TickOutcome::IntervalChanged(interval) => {
                debug!(
                    event = "core.polling.interval_changed",
                    panel_id = %shared.id,
                    interval_ms = interval.as_millis() as u64,
                );
            }
            TickOutcome::Skipped | TickOutcome::Stop => {}
        }

        let interval = shared.state().current_interval;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = shared.poll_now.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
