//! Configuration file loader.

use std::path::{Path, PathBuf};

use super::RunnerConfig;

/// Where a loader looks for its config file.
#[derive(Debug)]
enum ConfigSource {
    /// A file named on the command line; it must exist.
    Explicit(PathBuf),
    /// Optional locations in priority order; the first existing one wins.
    Search(Vec<PathBuf>),
}

/// Loads `RunnerConfig` from a TOML file.
#[derive(Debug)]
pub struct ConfigLoader {
    source: ConfigSource,
}

impl ConfigLoader {
    /// Search `.proc-relay.toml`, then `<config_dir>/proc-relay/config.toml`.
    #[must_use]
    pub fn new() -> Self {
        let mut paths = vec![PathBuf::from(".proc-relay.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("proc-relay").join("config.toml"));
        }
        Self::searching(paths)
    }

    /// Load from `path` only. A missing file is an error.
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            source: ConfigSource::Explicit(path),
        }
    }

    fn searching(paths: Vec<PathBuf>) -> Self {
        Self {
            source: ConfigSource::Search(paths),
        }
    }

    /// Load the configuration, falling back to defaults when no searched
    /// file exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// explicit path does not exist.
    pub fn load(&self) -> Result<RunnerConfig, ConfigError> {
        match &self.source {
            ConfigSource::Explicit(path) => Self::load_from_path(path),
            ConfigSource::Search(paths) => match paths.iter().find(|path| path.is_file()) {
                Some(path) => Self::load_from_path(path),
                None => {
                    tracing::debug!("No config file found, using defaults");
                    Ok(RunnerConfig::default())
                }
            },
        }
    }

    fn load_from_path(path: &Path) -> Result<RunnerConfig, ConfigError> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}
