pub mod daemon;
pub mod publish;
pub mod snapshot;
pub mod status;
pub mod watch;

use std::path::PathBuf;

use anyhow::{Context, Result};

pub(crate) fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}
