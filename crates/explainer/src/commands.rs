use clap::ArgMatches;
use tracing::{error, warn};

use explainer_config::{ConfigError, ExplainerConfig};

mod config;
mod watch;

use config::handle_config_command;
use watch::handle_watch_command;

/// Fall back to defaults when config loading fails, telling the user on
/// stderr and logging `cli.config.load_failed`.
fn config_or_default(loaded: Result<ExplainerConfig, ConfigError>) -> ExplainerConfig {
    match loaded {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Could not load config: {}. Using defaults.\n\
                 Tip: Check ~/.explainer/config.toml, ./.explainer/config.toml and EXPLAINER_* variables.",
                e
            );
            warn!(
                event = "cli.config.load_failed",
                error = %e,
                "Config load failed, using defaults"
            );
            ExplainerConfig::default()
        }
    }
}

/// Surface a config load failure as an error instead of using defaults.
fn require_config(
    loaded: Result<ExplainerConfig, ConfigError>,
) -> Result<ExplainerConfig, ConfigError> {
    loaded.map_err(|e| {
        eprintln!(
            "Could not load config: {}\n\
             Tip: Check ~/.explainer/config.toml, ./.explainer/config.toml and EXPLAINER_* variables.",
            e
        );
        error!(event = "cli.config.load_failed", error = %e);
        e
    })
}

pub fn run_command(
    matches: &ArgMatches,
    loaded: Result<ExplainerConfig, ConfigError>,
) -> Result<(), Box<dyn std::error::Error>> {
    match matches.subcommand() {
        Some(("watch", sub_matches)) => handle_watch_command(sub_matches, require_config(loaded)?),
        Some(("config", sub_matches)) => {
            handle_config_command(sub_matches, &config_or_default(loaded))
        }
        _ => {
            error!(event = "cli.command_unknown");
            Err("Unknown command".into())
        }
    }
}
