//! `matchcast watch`: join a tenant and follow its updates.
//!
//! By default the command keeps a local copy of the tenant's document,
//! folds every event into it and prints the result. `--raw` prints the
//! event lines as received instead.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};

use matchcast_core::{config, Document, PatchOp, ServerEvent, Update};
use matchcast_daemon::watch;
use matchcast_sync::{diff, score, ScorePath};

use super::home_dir;

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Tenant key (blank or omitted means `default`).
    pub tenant: Option<String>,

    /// Print events as JSON lines instead of the mirrored document.
    #[arg(long)]
    pub raw: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let config = config::load().context("failed to load config")?;
        let mut mirror = Mirror::new(ScorePath::new(&config.score_path));
        let raw = self.raw;
        let mut failure = None;

        let tenant = watch(&home, self.tenant, |event| {
            let rendered = if raw {
                serde_json::to_string(&event)
            } else {
                mirror.apply(event);
                serde_json::to_string_pretty(mirror.document())
            };
            match rendered {
                Ok(text) => {
                    println!("{text}");
                    true
                }
                Err(err) => {
                    failure = Some(err);
                    false
                }
            }
        })
        .context("watch failed")?;

        if let Some(err) = failure {
            return Err(err).context("failed to render event");
        }
        eprintln!("{tenant}: connection closed by daemon");
        Ok(())
    }
}

/// Client-side document rebuilt from `init` plus every `bulk-update`.
#[derive(Debug)]
struct Mirror {
    score: ScorePath,
    document: Document,
}

impl Mirror {
    fn new(score: ScorePath) -> Self {
        Self {
            score,
            document: Document::default(),
        }
    }

    fn document(&self) -> &Document {
        &self.document
    }

    fn apply(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Init(document) => self.document = document,
            ServerEvent::BulkUpdate(updates) => {
                for update in updates {
                    self.apply_update(update);
                }
            }
        }
    }

    fn apply_update(&mut self, update: Update) {
        match update {
            Update::StatePatch(ops) => self.patch(&ops),
            Update::ScoreUpdate(update) => self.patch(&score::expand(&self.score, &update)),
            Update::WagonAppend(append) => {
                self.document.wagon_data.truncate(append.start_index);
                self.document.wagon_data.extend(append.items);
            }
            Update::WagonUpdate(wagons) => self.document.wagon_data = wagons,
        }
    }

    fn patch(&mut self, ops: &[PatchOp]) {
        let mut root = Map::new();
        root.insert(
            "matchData".into(),
            std::mem::take(&mut self.document.match_data).into(),
        );
        root.insert(
            "overlays".into(),
            std::mem::take(&mut self.document.overlays).into(),
        );
        diff::apply(&mut root, ops);
        self.document.match_data = take_object(&mut root, "matchData");
        self.document.overlays = take_object(&mut root, "overlays");
    }
}

fn take_object(root: &mut Map<String, Value>, key: &str) -> Map<String, Value> {
    match root.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}
