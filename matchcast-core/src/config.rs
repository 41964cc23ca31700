//! Daemon configuration at `<home>/.matchcast/config.yaml`.
//!
//! Every field is optional; a missing file yields [`Config::default`].
//!
//! ```yaml
//! flush_interval_ms: 500
//! score_path: matchData.score
//! max_line_bytes: 1048576
//! ```
//!
//! As elsewhere in the workspace, `load_at(home)` takes an explicit home and
//! `load()` resolves it through `dirs::home_dir()`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 500;
pub const DEFAULT_SCORE_PATH: &str = "matchData.score";
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coalescer tick, in milliseconds.
    pub flush_interval_ms: u64,
    /// Dot path whose changes are broadcast as `score-update`.
    pub score_path: String,
    /// Longest request line the socket server accepts.
    pub max_line_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
            score_path: DEFAULT_SCORE_PATH.to_string(),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl Config {
    /// Flush interval, never shorter than one millisecond.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }
}

/// `<home>/.matchcast/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".matchcast").join("config.yaml")
}

/// Load the config under `home`, falling back to defaults if the file is absent.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    let contents = match std::fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Config::default()),
        Err(source) => return Err(ConfigError::Io { path, source }),
    };
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    load_at(&home)
}
