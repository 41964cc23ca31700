//! Extraction of live score changes from a document patch.
//!
//! Operations at or below the score path (by default `matchData.score`) are
//! pulled out of the general patch and re-expressed as a [`ScoreUpdate`]
//! whose keys are relative to the score mapping. A patch therefore never
//! carries the same change twice.

use serde_json::{Map, Value};

use matchcast_core::{Change, Document, PatchOp, ScoreUpdate};

use crate::diff;

/// A dot path into a [`Document`], e.g. `matchData.score`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScorePath {
    dotted: String,
}

impl ScorePath {
    pub fn new(dotted: &str) -> Self {
        Self {
            dotted: dotted.trim().trim_matches('.').to_string(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.dotted
    }

    /// True if `path` is the score path itself or lies beneath it.
    pub fn covers(&self, path: &str) -> bool {
        match path.strip_prefix(self.dotted.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('.'),
            None => false,
        }
    }

    /// Value at this path in `doc`, if present.
    fn lookup<'a>(&self, doc: &'a Document) -> Option<&'a Value> {
        let mut segments = self.dotted.split('.');
        let mut map = match segments.next()? {
            "matchData" => &doc.match_data,
            "overlays" => &doc.overlays,
            _ => return None,
        };
        let mut last = segments.next()?;
        for segment in segments {
            map = map.get(last)?.as_object()?;
            last = segment;
        }
        map.get(last)
    }
}

/// Split `ops` into the general patch and an optional score update.
///
/// Extraction only applies while the score value is a mapping (or absent);
/// if it turns into anything else the operations stay in the general patch.
/// An operation on the score path itself becomes a `reset` (the mapping was
/// created or replaced) or a `cleared` (the key was removed) update.
pub fn split(
    ops: Vec<PatchOp>,
    score: &ScorePath,
    old: &Document,
    new: &Document,
) -> (Vec<PatchOp>, Option<ScoreUpdate>) {
    if !score.dotted.contains('.') || !ops.iter().any(|op| score.covers(&op.path)) {
        return (ops, None);
    }

    let whole = ops
        .iter()
        .find(|op| op.path == score.dotted)
        .map(|op| &op.change);
    let update = match (whole, score.lookup(new)) {
        (Some(Change::Set { value: Value::Object(map) }), _) => ScoreUpdate {
            fields: map.clone(),
            reset: true,
            ..ScoreUpdate::default()
        },
        (Some(Change::Set { .. }), _) => return (ops, None),
        (Some(Change::Remove), _) => ScoreUpdate {
            cleared: true,
            ..ScoreUpdate::default()
        },
        (None, Some(Value::Object(after))) => {
            let empty = Map::new();
            let before = match score.lookup(old) {
                Some(Value::Object(map)) => map,
                _ => &empty,
            };
            incremental(before, after)
        }
        (None, _) => return (ops, None),
    };

    let rest = ops.into_iter().filter(|op| !score.covers(&op.path)).collect();
    let update = (!update.is_empty()).then_some(update);
    (rest, update)
}

fn incremental(before: &Map<String, Value>, after: &Map<String, Value>) -> ScoreUpdate {
    let mut update = ScoreUpdate::default();
    for op in diff::diff("", before, after) {
        match op.change {
            Change::Set { value } => {
                update.fields.insert(op.path, value);
            }
            Change::Remove => update.removed.push(op.path),
        }
    }
    update
}

/// Patch operations that replay `update` on a document, the inverse of
/// [`split`]'s extraction.
pub fn expand(score: &ScorePath, update: &ScoreUpdate) -> Vec<PatchOp> {
    if update.cleared {
        return vec![PatchOp::remove(score.as_str())];
    }
    if update.reset {
        return vec![PatchOp::set(
            score.as_str(),
            Value::Object(update.fields.clone()),
        )];
    }
    let base = score.as_str();
    update
        .fields
        .iter()
        .map(|(rel, value)| PatchOp::set(diff::join_path(base, rel), value.clone()))
        .chain(
            update
                .removed
                .iter()
                .map(|rel| PatchOp::remove(diff::join_path(base, rel))),
        )
        .collect()
}
