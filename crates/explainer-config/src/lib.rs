//! # explainer-config
//!
//! TOML configuration types, loading, and validation for the Explainer
//! polling core. Files are layered user → project → environment; the CLI
//! applies its own flags last.

mod loading;
mod paths;
mod validation;

pub mod errors;
pub mod types;

// Public API re-exports
pub use errors::ConfigError;
pub use loading::{
    ENV_BASE_URL, ENV_DEBUG, ENV_MAX_RETRIES, ENV_NONCE, ENV_POLL_BACKOFF_MAX_MS,
    ENV_POLL_INTERVAL_MS, ENV_RETRY_DELAY_MS, apply_env_overrides, load_config_file, load_from,
    load_hierarchy, merge_configs,
};
pub use paths::ExplainerPaths;
pub use types::{AjaxConfig, ExplainerConfig, LoggingConfig, PanelConfig, PollingConfig};
pub use validation::validate_config;

impl ExplainerConfig {
    /// Load configuration from the user/project hierarchy plus environment.
    ///
    /// See [`loading::load_hierarchy`] for details.
    pub fn load_hierarchy() -> Result<Self, ConfigError> {
        loading::load_hierarchy()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }
}
