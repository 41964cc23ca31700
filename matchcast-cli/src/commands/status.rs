//! `matchcast status`: tenants, subscribers and pending updates.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use tabled::{settings::Style, Table, Tabled};

use matchcast_daemon::{request_status, DaemonError};

use super::home_dir;

/// Arguments for `matchcast status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit the daemon's status payload as JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;

        let payload = match request_status(&home) {
            Ok(payload) => payload,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                if self.json {
                    println!("{}", serde_json::json!({ "running": false }));
                } else {
                    println!("daemon is not running. Start it with `matchcast daemon start`.");
                }
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
            );
            return Ok(());
        }

        let report: StatusReport =
            serde_json::from_value(payload).context("unexpected status payload from daemon")?;
        print_table(report, Utc::now());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct StatusReport {
    tenant_count: usize,
    connection_count: usize,
    pending: usize,
    flush_interval_ms: u64,
    #[serde(default)]
    tenants: Vec<TenantLine>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantLine {
    tenant: String,
    subscribers: usize,
    pending: usize,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "")]
    indicator: String,
    #[tabled(rename = "tenant")]
    tenant: String,
    #[tabled(rename = "subscribers")]
    subscribers: usize,
    #[tabled(rename = "pending")]
    pending: usize,
    #[tabled(rename = "last update")]
    last_update: String,
}

fn print_table(report: StatusReport, now: DateTime<Utc>) {
    println!(
        "matchcast v{} | {} tenants | {} connections | {} pending | flush every {}ms",
        env!("CARGO_PKG_VERSION"),
        report.tenant_count,
        report.connection_count,
        report.pending,
        report.flush_interval_ms,
    );

    if report.tenants.is_empty() {
        println!("No tenants yet.");
        return;
    }

    let rows: Vec<StatusTableRow> = report
        .tenants
        .into_iter()
        .map(|line| StatusTableRow {
            indicator: indicator(&line),
            last_update: line
                .updated_at
                .map(|at| format_age(at, now))
                .unwrap_or_else(|| "never".to_string()),
            tenant: line.tenant,
            subscribers: line.subscribers,
            pending: line.pending,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn indicator(line: &TenantLine) -> String {
    if line.pending > 0 {
        "■".yellow().bold().to_string()
    } else if line.subscribers > 0 {
        "■".green().bold().to_string()
    } else {
        "■".bright_black().bold().to_string()
    }
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - at).num_seconds().max(0);
    match seconds {
        0..=59 => format!("{seconds}s ago"),
        60..=3_599 => format!("{}m ago", seconds / 60),
        3_600..=86_399 => format!("{}h ago", seconds / 3_600),
        _ => format!("{}d ago", seconds / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;

    #[test]
    fn ages_are_coarse() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "0s ago");
        assert_eq!(format_age(now - Duration::seconds(90), now), "1m ago");
        assert_eq!(format_age(now - Duration::hours(5), now), "5h ago");
        assert_eq!(format_age(now - Duration::days(3), now), "3d ago");
        assert_eq!(format_age(now + Duration::seconds(5), now), "0s ago");
    }

    #[test]
    fn daemon_payload_decodes() {
        let report: StatusReport = serde_json::from_value(json!({
            "running": true,
            "tenant_count": 1,
            "connection_count": 2,
            "pending": 0,
            "flush_interval_ms": 500,
            "tenants": [
                {"tenant": "arena", "subscribers": 2, "pending": 0, "updatedAt": null}
            ]
        }))
        .expect("decode");
        assert_eq!(report.tenants[0].tenant, "arena");
        assert!(report.tenants[0].updated_at.is_none());
    }
}
