use clap::ArgMatches;
use serde::Serialize;
use tracing::{error, info};

use explainer_config::ExplainerConfig;

/// Effective settings after defaults are filled in.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct ResolvedConfig {
    ajax: ResolvedAjax,
    polling: ResolvedPolling,
    panels: ResolvedPanels,
    logging: ResolvedLogging,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ResolvedAjax {
    base_url: String,
    /// Masked; only whether one is set is shown.
    nonce: String,
    request_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ResolvedPolling {
    poll_interval_ms: u64,
    poll_backoff_max_ms: u64,
    max_retries: u32,
    retry_delay_ms: u64,
    retry_backoff_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ResolvedPanels {
    interval_ms: u64,
    max_idle_cycles: u32,
    settle_delay_ms: u64,
    backoff_window_secs: u64,
    backoff_step: f64,
    backoff_max_multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ResolvedLogging {
    debug: bool,
}

impl ResolvedConfig {
    fn from_config(config: &ExplainerConfig) -> Self {
        let nonce = if config.ajax.nonce().is_empty() {
            String::new()
        } else {
            "********".to_string()
        };
        Self {
            ajax: ResolvedAjax {
                base_url: config.ajax.base_url().to_string(),
                nonce,
                request_timeout_secs: config.ajax.request_timeout().as_secs(),
            },
            polling: ResolvedPolling {
                poll_interval_ms: config.polling.poll_interval().as_millis() as u64,
                poll_backoff_max_ms: config.polling.poll_backoff_max().as_millis() as u64,
                max_retries: config.polling.max_retries(),
                retry_delay_ms: config.polling.retry_delay().as_millis() as u64,
                retry_backoff_multiplier: config.polling.retry_backoff_multiplier(),
            },
            panels: ResolvedPanels {
                interval_ms: config.panels.interval().as_millis() as u64,
                max_idle_cycles: config.panels.max_idle_cycles(),
                settle_delay_ms: config.panels.settle_delay().as_millis() as u64,
                backoff_window_secs: config.panels.backoff_window().as_secs(),
                backoff_step: config.panels.backoff_step(),
                backoff_max_multiplier: config.panels.backoff_max_multiplier(),
            },
            logging: ResolvedLogging {
                debug: config.logging.debug(),
            },
        }
    }
}

pub(crate) fn handle_config_command(
    matches: &ArgMatches,
    config: &ExplainerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let json_output = matches.get_flag("json");
    info!(event = "cli.config_started", json_output = json_output);

    let resolved = ResolvedConfig::from_config(config);
    let rendered = if json_output {
        serde_json::to_string_pretty(&resolved)?
    } else {
        toml::to_string_pretty(&resolved)?
    };
    println!("{}", rendered.trim_end());

    if let Err(e) = config.validate() {
        eprintln!("Warning: configuration is invalid: {}", e);
        error!(event = "cli.config_failed", error = %e);
        return Err(e.into());
    }

    info!(event = "cli.config_completed");
    Ok(())
}
