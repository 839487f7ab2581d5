//! Host page visibility and active-tab state.
//!
//! The host calls the setters; the adapter and the panel manager subscribe
//! and react. Nothing here schedules work on its own.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    /// Page teardown. Terminal: later visibility changes are ignored.
    Unloading,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageState {
    pub visibility: Visibility,
    /// `None` means no tab navigation exists and every panel counts as active.
    pub active_tab: Option<String>,
}

impl PageState {
    pub fn is_tab_active(&self, tab: &str) -> bool {
        self.active_tab.as_deref().is_none_or(|active| active == tab)
    }
}

/// Cloneable handle onto the shared page state.
#[derive(Debug, Clone)]
pub struct PageLifecycle {
    tx: Arc<watch::Sender<PageState>>,
}

impl Default for PageLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl PageLifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PageState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn set_hidden(&self) {
        self.set_visibility(Visibility::Hidden);
    }

    pub fn set_visible(&self) {
        self.set_visibility(Visibility::Visible);
    }

    pub fn unload(&self) {
        self.set_visibility(Visibility::Unloading);
    }

    pub fn set_active_tab(&self, tab: impl Into<String>) {
        self.replace_active_tab(Some(tab.into()));
    }

    /// Drop tab tracking so that every panel counts as active again.
    pub fn clear_active_tab(&self) {
        self.replace_active_tab(None);
    }

    fn replace_active_tab(&self, tab: Option<String>) {
        let changed = self.tx.send_if_modified(|state| {
            if state.active_tab == tab {
                return false;
            }
            state.active_tab = tab.clone();
            true
        });
        if changed {
            debug!(event = "core.lifecycle.tab_changed", tab = ?tab);
        }
    }

    pub fn state(&self) -> PageState {
        self.tx.borrow().clone()
    }

    pub fn is_hidden(&self) -> bool {
        self.tx.borrow().visibility != Visibility::Visible
    }

    pub fn is_tab_active(&self, tab: &str) -> bool {
        self.tx.borrow().is_tab_active(tab)
    }

    pub fn subscribe(&self) -> watch::Receiver<PageState> {
        self.tx.subscribe()
    }

    fn set_visibility(&self, visibility: Visibility) {
        let changed = self.tx.send_if_modified(|state| {
            if state.visibility == visibility || state.visibility == Visibility::Unloading {
                return false;
            }
            state.visibility = visibility;
            true
        });
        if changed {
            debug!(event = "core.lifecycle.visibility_changed", visibility = ?visibility);
        }
    }
}
