use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::chord::Chord;
use crate::transpose::CANONICAL_KEY;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("canonical_key {0:?} is not a key name")]
    InvalidKey(String),
    #[error("limit must be at least 1")]
    ZeroLimit,
}

/// Settings from `config.toml`. Every field is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Threads for `validate`. 0 = rayon's default.
    pub workers: usize,
    /// Key every song is transposed into before comparison.
    pub canonical_key: String,
    /// Default number of rows shown by ranking commands.
    pub limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            workers: 0,
            canonical_key: CANONICAL_KEY.to_string(),
            limit: 20,
        }
    }
}

impl AppConfig {
    /// Load `<config dir>/chordwise/config.toml`, falling back to defaults
    /// when it is missing or invalid.
    pub fn load() -> Self {
        let Some(path) = config_path().filter(|p| p.exists()) else {
            log::debug!("No config file found, using defaults");
            return Self::default();
        };

        match Self::from_file(&path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("{}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if Chord::parse(&self.canonical_key).is_err() {
            return Err(ConfigError::InvalidKey(self.canonical_key.clone()));
        }
        if self.limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        Ok(())
    }

    /// Worker count for the validation pool.
    pub fn resolve_workers(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            rayon::current_num_threads()
        }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", crate::APP_NAME)
}

fn config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
}

/// `<data dir>/chordwise/chordwise.db`, or `./chordwise.db` without a home directory.
pub fn default_db_path() -> PathBuf {
    let Some(dirs) = project_dirs() else {
        return PathBuf::from("chordwise.db");
    };
    let data_dir = dirs.data_dir();
    if let Err(e) = std::fs::create_dir_all(data_dir) {
        log::warn!("Cannot create {}: {}", data_dir.display(), e);
    }
    data_dir.join("chordwise.db")
}
