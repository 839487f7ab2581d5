use std::path::{Path, PathBuf};

use crate::errors::ConfigError;

/// Path construction for the `~/.explainer/` directory layout.
///
/// Use `resolve()` in production code and `from_dir()` in tests.
#[derive(Debug, Clone)]
pub struct ExplainerPaths {
    base_dir: PathBuf,
}

impl ExplainerPaths {
    /// Resolve paths from the user's home directory (`~/.explainer`).
    pub fn resolve() -> Result<Self, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(Self {
            base_dir: home.join(".explainer"),
        })
    }

    /// Create paths from an explicit base directory. Use in tests.
    pub fn from_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn user_config(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Project-level config: `<project_root>/.explainer/config.toml`.
    pub fn project_config(project_root: &Path) -> PathBuf {
        project_root.join(".explainer").join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dir_user_config() {
        let paths = ExplainerPaths::from_dir(PathBuf::from("/tmp/.explainer"));
        assert_eq!(
            paths.user_config(),
            PathBuf::from("/tmp/.explainer/config.toml")
        );
    }

    #[test]
    fn test_project_config_path() {
        let path = ExplainerPaths::project_config(Path::new("/srv/site"));
        assert_eq!(path, PathBuf::from("/srv/site/.explainer/config.toml"));
    }
}
