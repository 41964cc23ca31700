//! `matchcast publish` and `matchcast wagons`.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use serde_json::Value;

use matchcast_core::{TenantKey, UpdateKind};
use matchcast_daemon::{request_publish, request_sequence};

use super::home_dir;

/// Arguments for `matchcast publish`.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Tenant key (blank or omitted means `default`).
    pub tenant: Option<String>,

    /// JSON object replacing the tenant's matchData.
    #[arg(long, value_name = "JSON")]
    pub match_data: Option<String>,

    /// JSON object shallow-merged into the tenant's overlays.
    #[arg(long, value_name = "JSON")]
    pub overlays: Option<String>,
}

impl PublishArgs {
    pub fn run(self) -> Result<()> {
        let match_data = parse_object("--match-data", self.match_data.as_deref())?;
        let overlays = parse_object("--overlays", self.overlays.as_deref())?;
        if match_data.is_none() && overlays.is_none() {
            bail!("nothing to publish: pass --match-data and/or --overlays");
        }

        let home = home_dir()?;
        let data = request_publish(&home, self.tenant, match_data, overlays)
            .context("publish_update failed")?;
        print_outcome(data)
    }
}

/// Arguments for `matchcast wagons`.
#[derive(Args, Debug)]
#[command(allow_missing_positional = true)]
pub struct WagonsArgs {
    /// Tenant key (blank means `default`).
    pub tenant: Option<String>,

    /// Full wagon sequence as a JSON array.
    #[arg(value_name = "JSON_ARRAY")]
    pub wagons: String,
}

impl WagonsArgs {
    pub fn run(self) -> Result<()> {
        let wagons: Value = serde_json::from_str(&self.wagons)
            .with_context(|| format!("invalid wagon JSON: {}", self.wagons))?;
        if !wagons.is_array() {
            bail!("wagon data must be a JSON array");
        }

        let home = home_dir()?;
        let data = request_sequence(&home, self.tenant, wagons)
            .context("publish_sequence failed")?;
        print_outcome(data)
    }
}

#[derive(Debug, Deserialize)]
struct Outcome {
    tenant: TenantKey,
    enqueued: Vec<UpdateKind>,
}

fn parse_object(flag: &str, raw: Option<&str>) -> Result<Option<Value>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value: Value =
        serde_json::from_str(raw).with_context(|| format!("invalid {flag} JSON: {raw}"))?;
    if !value.is_object() {
        bail!("{flag} must be a JSON object");
    }
    Ok(Some(value))
}

fn print_outcome(data: Value) -> Result<()> {
    let outcome: Outcome =
        serde_json::from_value(data).context("unexpected publish response from daemon")?;
    if outcome.enqueued.is_empty() {
        println!("{}: no changes", outcome.tenant);
        return Ok(());
    }
    let kinds: Vec<String> = outcome.enqueued.iter().map(ToString::to_string).collect();
    println!("{}: queued {}", outcome.tenant, kinds.join(", "));
    Ok(())
}
