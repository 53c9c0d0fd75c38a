//! Configuration loading.
//!
//! `weft.toml` is read from the given path, or from the working directory
//! when no path is given. Relative paths inside it resolve against the
//! directory that holds the file.

use std::path::{Path, PathBuf};
use std::time::Duration;
use weft_core::{WeftConfig, WeftError};

/// Config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "weft.toml";

/// A loaded configuration and the project root it applies to.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config: WeftConfig,
}

impl Workspace {
    /// Load and validate the configuration.
    ///
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, WeftError> {
        let path = explicit.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

        let config = if path.is_file() {
            let text = std::fs::read_to_string(&path).map_err(|e| WeftError::Io(e.to_string()))?;
            let config = Self::parse(&text)
                .map_err(|e| WeftError::InvalidConfig(format!("{}: {e}", path.display())))?;
            tracing::debug!(path = %path.display(), "configuration loaded");
            config
        } else if explicit.is_some() {
            return Err(WeftError::InvalidConfig(format!(
                "config file '{}' not found",
                path.display()
            )));
        } else {
            tracing::debug!("no weft.toml found, using defaults");
            WeftConfig::default()
        };

        config.validate()?;
        Ok(Self { root, config })
    }

    fn parse(text: &str) -> Result<WeftConfig, String> {
        toml::from_str(text).map_err(|e| e.to_string())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    #[must_use]
    pub fn store_path(&self) -> PathBuf {
        self.resolve(&self.config.store.path)
    }

    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.resolve(&self.config.cache.dir)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.config.store.lock_timeout_ms)
    }

    #[must_use]
    pub fn service_timeout(&self) -> Duration {
        Duration::from_millis(self.config.services.timeout_ms)
    }
}
