//! Configuration loading and merging logic.
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. **Hardcoded defaults** - accessor fallbacks in [`crate::types`]
//! 2. **User config** - `~/.explainer/config.toml`
//! 3. **Project config** - `./.explainer/config.toml`
//! 4. **Environment** - `EXPLAINER_*` variables
//! 5. **CLI arguments** - applied by the caller

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::errors::ConfigError;
use crate::paths::ExplainerPaths;
use crate::types::{AjaxConfig, ExplainerConfig, LoggingConfig, PanelConfig, PollingConfig};
use crate::validation::validate_config;

pub const ENV_BASE_URL: &str = "EXPLAINER_BASE_URL";
pub const ENV_NONCE: &str = "EXPLAINER_NONCE";
pub const ENV_POLL_INTERVAL_MS: &str = "EXPLAINER_POLL_INTERVAL_MS";
pub const ENV_POLL_BACKOFF_MAX_MS: &str = "EXPLAINER_POLL_BACKOFF_MAX_MS";
pub const ENV_MAX_RETRIES: &str = "EXPLAINER_MAX_RETRIES";
pub const ENV_RETRY_DELAY_MS: &str = "EXPLAINER_RETRY_DELAY_MS";
pub const ENV_DEBUG: &str = "EXPLAINER_DEBUG";

/// Load configuration from the user/project hierarchy plus environment.
///
/// Missing config files are not errors. Parse failures and invalid values are.
pub fn load_hierarchy() -> Result<ExplainerConfig, ConfigError> {
    let paths = ExplainerPaths::resolve()?;
    let project_root = std::env::current_dir()?;
    load_from(&paths, &project_root)
}

/// Load configuration from explicit locations. Use in tests.
pub fn load_from(
    paths: &ExplainerPaths,
    project_root: &Path,
) -> Result<ExplainerConfig, ConfigError> {
    let mut config = ExplainerConfig::default();

    if let Some(user_config) = load_config_file(&paths.user_config())? {
        config = merge_configs(&config, &user_config);
    }

    let project_path = ExplainerPaths::project_config(project_root);
    if let Some(project_config) = load_config_file(&project_path)? {
        config = merge_configs(&config, &project_config);
    }

    apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    tracing::debug!(
        event = "config.load_completed",
        base_url = config.ajax.base_url(),
        poll_interval_ms = config.polling.poll_interval().as_millis() as u64,
        max_retries = config.polling.max_retries(),
    );

    Ok(config)
}

/// Read one config file. Returns `Ok(None)` when the file does not exist.
pub fn load_config_file(path: &Path) -> Result<Option<ExplainerConfig>, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!(event = "config.file_missing", path = %path.display());
            return Ok(None);
        }
        Err(e) => return Err(ConfigError::IoError { source: e }),
    };

    let config = toml::from_str::<ExplainerConfig>(&content).map_err(|e| {
        ConfigError::ConfigParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        }
    })?;
    Ok(Some(config))
}

/// Merge two configurations, with `over` taking precedence.
pub fn merge_configs(base: &ExplainerConfig, over: &ExplainerConfig) -> ExplainerConfig {
    ExplainerConfig {
        ajax: AjaxConfig::merge(&base.ajax, &over.ajax),
        polling: PollingConfig::merge(&base.polling, &over.polling),
        panels: PanelConfig::merge(&base.panels, &over.panels),
        logging: LoggingConfig::merge(&base.logging, &over.logging),
    }
}

/// Apply `EXPLAINER_*` environment overrides on top of file config.
///
/// Empty variables are ignored; unparseable values are errors.
pub fn apply_env_overrides(config: &mut ExplainerConfig) -> Result<(), ConfigError> {
    if let Some(url) = env_string(ENV_BASE_URL) {
        config.ajax.base_url = Some(url);
    }
    if let Some(nonce) = env_string(ENV_NONCE) {
        config.ajax.nonce = Some(nonce);
    }
    if let Some(v) = env_parsed::<u64>(ENV_POLL_INTERVAL_MS)? {
        config.polling.poll_interval_ms = Some(v);
    }
    if let Some(v) = env_parsed::<u64>(ENV_POLL_BACKOFF_MAX_MS)? {
        config.polling.poll_backoff_max_ms = Some(v);
    }
    if let Some(v) = env_parsed::<u32>(ENV_MAX_RETRIES)? {
        config.polling.max_retries = Some(v);
    }
    if let Some(v) = env_parsed::<u64>(ENV_RETRY_DELAY_MS)? {
        config.polling.retry_delay_ms = Some(v);
    }
    if let Some(raw) = env_string(ENV_DEBUG) {
        config.logging.debug = Some(parse_bool(ENV_DEBUG, &raw)?);
    }
    Ok(())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parsed<T>(name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = env_string(name) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidEnvValue {
            variable: name.to_string(),
            value: raw.clone(),
            message: e.to_string(),
        })
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            variable: name.to_string(),
            value: raw.to_string(),
            message: "expected a boolean (true/false/1/0)".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use temp_env::with_vars;

    const ALL_ENV: [&str; 7] = [
        ENV_BASE_URL,
        ENV_NONCE,
        ENV_POLL_INTERVAL_MS,
        ENV_POLL_BACKOFF_MAX_MS,
        ENV_MAX_RETRIES,
        ENV_RETRY_DELAY_MS,
        ENV_DEBUG,
    ];

    fn cleared_env() -> Vec<(&'static str, Option<&'static str>)> {
        ALL_ENV.iter().map(|name| (*name, None)).collect()
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_missing_files_yield_defaults() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        with_vars(cleared_env(), || {
            let paths = ExplainerPaths::from_dir(home.path().join(".explainer"));
            let config = load_from(&paths, project.path()).unwrap();
            assert_eq!(config, ExplainerConfig::default());
        });
    }

    #[test]
    fn test_project_overrides_user() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let paths = ExplainerPaths::from_dir(home.path().join(".explainer"));

        write(
            &paths.user_config(),
            r#"
[ajax]
base_url = "https://blog.example.com/wp-admin/admin-ajax.php"

[polling]
max_retries = 5
retry_delay_ms = 250
"#,
        );
        write(
            &ExplainerPaths::project_config(project.path()),
            r#"
[polling]
max_retries = 1
"#,
        );

        with_vars(cleared_env(), || {
            let config = load_from(&paths, project.path()).unwrap();
            assert_eq!(
                config.ajax.base_url(),
                "https://blog.example.com/wp-admin/admin-ajax.php"
            );
            assert_eq!(config.polling.max_retries(), 1);
            assert_eq!(config.polling.retry_delay_ms, Some(250));
        });
    }

    #[test]
    fn test_env_overrides_files() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let paths = ExplainerPaths::from_dir(home.path().join(".explainer"));
        write(&paths.user_config(), "[polling]\npoll_interval_ms = 5000\n");

        let mut vars = cleared_env();
        vars.retain(|(name, _)| *name != ENV_POLL_INTERVAL_MS && *name != ENV_DEBUG);
        vars.push((ENV_POLL_INTERVAL_MS, Some("750")));
        vars.push((ENV_DEBUG, Some("yes")));

        with_vars(vars, || {
            let config = load_from(&paths, project.path()).unwrap();
            assert_eq!(config.polling.poll_interval_ms, Some(750));
            assert!(config.logging.debug());
        });
    }

    #[test]
    fn test_invalid_env_value_is_error() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let paths = ExplainerPaths::from_dir(home.path().join(".explainer"));

        let mut vars = cleared_env();
        vars.retain(|(name, _)| *name != ENV_MAX_RETRIES);
        vars.push((ENV_MAX_RETRIES, Some("lots")));

        with_vars(vars, || {
            let err = load_from(&paths, project.path()).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidEnvValue { ref variable, .. } if variable == ENV_MAX_RETRIES));
        });
    }

    #[test]
    fn test_empty_env_value_is_ignored() {
        with_vars([(ENV_NONCE, Some("   "))], || {
            let mut config = ExplainerConfig::default();
            apply_env_overrides(&mut config).unwrap();
            assert!(config.ajax.nonce.is_none());
        });
    }

    #[test]
    fn test_parse_error_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[polling\nmax_retries = 2").unwrap();

        let err = load_config_file(&path).unwrap_err();
        match err {
            ConfigError::ConfigParseError { path: p, .. } => {
                assert!(p.ends_with("config.toml"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let home = tempfile::tempdir().unwrap();
        let project = tempfile::tempdir().unwrap();
        let paths = ExplainerPaths::from_dir(home.path().join(".explainer"));
        write(&paths.user_config(), "[polling]\npoll_interval_ms = 0\n");

        with_vars(cleared_env(), || {
            let err = load_from(&paths, project.path()).unwrap_err();
            assert!(err.to_string().contains("poll_interval_ms"));
        });
    }
}
