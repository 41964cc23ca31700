//! Error types for matchcast-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading daemon configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the path that was being read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.matchcast/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
