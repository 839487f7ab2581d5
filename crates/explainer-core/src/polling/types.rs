use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;

use explainer_config::PanelConfig;

use super::errors::PollingError;
use crate::retry::IdleBackoff;

pub type PanelCallback = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;
pub type WorkProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Manager-wide defaults for panel loops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManagerConfig {
    /// Wait before a newly registered panel's first poll.
    pub settle_delay: Duration,
    pub default_interval: Duration,
    pub max_idle_cycles: u32,
    pub backoff: IdleBackoff,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self::from_config(&PanelConfig::default())
    }
}

impl ManagerConfig {
    pub fn from_config(config: &PanelConfig) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            default_interval: config.interval(),
            max_idle_cycles: config.max_idle_cycles(),
            backoff: IdleBackoff {
                window: config.backoff_window(),
                step: config.backoff_step(),
                max_multiplier: config.backoff_max_multiplier(),
            },
        }
    }
}

/// Registration options for one panel.
///
/// Unset intervals resolve against [`ManagerConfig`]: `interval` defaults to
/// the manager interval, `min_interval` to `interval`, and `max_interval`
/// to `interval` times the idle backoff's maximum multiplier.
#[derive(Clone)]
pub struct PanelOptions {
    pub interval: Option<Duration>,
    pub requires_active_tab: bool,
    pub requires_processing_jobs: bool,
    pub max_idle_cycles: Option<u32>,
    pub dynamic_interval: bool,
    pub min_interval: Option<Duration>,
    pub max_interval: Option<Duration>,
    /// Tab the panel lives on. Defaults to the panel id.
    pub tab: Option<String>,
    /// Qualifying-work probe. Without one the panel never sees work.
    pub has_work: Option<WorkProbe>,
    pub callback: PanelCallback,
}

impl PanelOptions {
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            interval: None,
            requires_active_tab: true,
            requires_processing_jobs: true,
            max_idle_cycles: None,
            dynamic_interval: true,
            min_interval: None,
            max_interval: None,
            tab: None,
            has_work: None,
            callback: Arc::new(move || callback().boxed()),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn requires_active_tab(mut self, required: bool) -> Self {
        self.requires_active_tab = required;
        self
    }

    pub fn requires_processing_jobs(mut self, required: bool) -> Self {
        self.requires_processing_jobs = required;
        self
    }

    pub fn max_idle_cycles(mut self, cycles: u32) -> Self {
        self.max_idle_cycles = Some(cycles);
        self
    }

    pub fn dynamic_interval(mut self, enabled: bool) -> Self {
        self.dynamic_interval = enabled;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = Some(interval);
        self
    }

    pub fn max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = Some(interval);
        self
    }

    pub fn tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = Some(tab.into());
        self
    }

    pub fn has_work<F>(mut self, probe: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.has_work = Some(Arc::new(probe));
        self
    }

    pub(super) fn resolve(
        self,
        panel_id: &str,
        defaults: &ManagerConfig,
    ) -> Result<PanelSettings, PollingError> {
        let invalid = |message: String| PollingError::InvalidOptions {
            panel_id: panel_id.to_string(),
            message,
        };

        let interval = self.interval.unwrap_or(defaults.default_interval);
        if interval.is_zero() {
            return Err(invalid("interval must be > 0".to_string()));
        }
        let min_interval = self.min_interval.unwrap_or(interval);
        if min_interval.is_zero() {
            return Err(invalid("min_interval must be > 0".to_string()));
        }
        let max_interval = match self.max_interval {
            Some(max) => max,
            None => scale(interval, defaults.backoff.max_multiplier).max(min_interval),
        };
        if max_interval < min_interval {
            return Err(invalid(format!(
                "max_interval ({}ms) must not be below min_interval ({}ms)",
                max_interval.as_millis(),
                min_interval.as_millis()
            )));
        }
        let max_idle_cycles = self.max_idle_cycles.unwrap_or(defaults.max_idle_cycles);
        if max_idle_cycles == 0 {
            return Err(invalid("max_idle_cycles must be > 0".to_string()));
        }

        Ok(PanelSettings {
            interval,
            requires_active_tab: self.requires_active_tab,
            requires_processing_jobs: self.requires_processing_jobs,
            max_idle_cycles,
            dynamic_interval: self.dynamic_interval,
            min_interval,
            max_interval,
            tab: self.tab.unwrap_or_else(|| panel_id.to_string()),
            has_work: self.has_work,
            callback: self.callback,
        })
    }
}

impl fmt::Debug for PanelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelOptions")
            .field("interval", &self.interval)
            .field("requires_active_tab", &self.requires_active_tab)
            .field("requires_processing_jobs", &self.requires_processing_jobs)
            .field("max_idle_cycles", &self.max_idle_cycles)
            .field("dynamic_interval", &self.dynamic_interval)
            .field("min_interval", &self.min_interval)
            .field("max_interval", &self.max_interval)
            .field("tab", &self.tab)
            .field("has_work", &self.has_work.is_some())
            .finish_non_exhaustive()
    }
}

fn scale(interval: Duration, factor: f64) -> Duration {
    let secs = interval.as_secs_f64() * factor;
    if secs.is_finite() && secs >= 0.0 && secs < Duration::MAX.as_secs_f64() {
        Duration::from_secs_f64(secs)
    } else {
        interval
    }
}

/// Fully resolved panel options.
#[derive(Clone)]
pub(super) struct PanelSettings {
    pub interval: Duration,
    pub requires_active_tab: bool,
    pub requires_processing_jobs: bool,
    pub max_idle_cycles: u32,
    pub dynamic_interval: bool,
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub tab: String,
    pub has_work: Option<WorkProbe>,
    pub callback: PanelCallback,
}

impl PanelSettings {
    pub fn has_work(&self) -> bool {
        self.has_work.as_ref().is_some_and(|probe| probe())
    }
}

/// Snapshot returned by [`super::PollingManager::get_stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollingStats {
    pub global_paused: bool,
    pub total_panels: usize,
    pub panels: BTreeMap<String, PanelStats>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PanelStats {
    pub current_interval_ms: u64,
    pub idle_cycles: u32,
    pub uptime_ms: u64,
    pub tab_active: bool,
    pub has_work: bool,
    /// Callback invocations so far.
    pub poll_count: u64,
}
