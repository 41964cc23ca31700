//! `matchcast snapshot`: current document without subscribing.

use anyhow::{Context, Result};
use clap::Args;

use matchcast_daemon::request_snapshot;

use super::home_dir;

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Tenant key (blank or omitted means `default`).
    pub tenant: Option<String>,
}

impl SnapshotArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let document = request_snapshot(&home, self.tenant).context("snapshot failed")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&document).context("failed to render snapshot JSON")?
        );
        Ok(())
    }
}
