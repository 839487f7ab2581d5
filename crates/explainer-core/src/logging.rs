use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Registry, fmt, reload};

/// Adjusts the installed log filter after startup.
///
/// Lets a binary start logging before its config is read and switch to
/// debug once `logging.debug` is known.
pub struct LogHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    quiet: bool,
    from_env: bool,
}

impl LogHandle {
    /// Raise or lower the default level. No effect when `RUST_LOG` is set,
    /// when logging is quiet, or when another subscriber was already installed.
    pub fn set_debug(&self, debug: bool) {
        if self.from_env || self.quiet {
            return;
        }
        let Some(handle) = &self.reload else {
            return;
        };
        let level = default_level(self.quiet, debug);
        if let Err(e) = handle.reload(EnvFilter::new(level)) {
            tracing::warn!(event = "core.logging.reload_failed", error = %e);
        }
    }

    pub fn is_installed(&self) -> bool {
        self.reload.is_some()
    }
}

/// Install the global JSON log subscriber on stderr.
///
/// `RUST_LOG` always wins. Otherwise the level is `error` when `quiet`,
/// `debug` when `debug` is set, and `info` in every other case.
/// Calling this more than once is harmless.
pub fn init_logging_with(quiet: bool, debug: bool) -> LogHandle {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(default_level(quiet, debug)), false),
    };
    let (filter, handle) = reload::Layer::new(filter);

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()
        .is_ok();

    LogHandle {
        reload: installed.then_some(handle),
        quiet,
        from_env,
    }
}

pub fn init_logging(quiet: bool) -> LogHandle {
    init_logging_with(quiet, false)
}

fn default_level(quiet: bool, debug: bool) -> &'static str {
    match (quiet, debug) {
        (true, _) => "error",
        (false, true) => "debug",
        (false, false) => "info",
    }
}
