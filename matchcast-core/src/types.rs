//! Domain and wire types shared by the store, the sync engine and the daemon.
//!
//! Everything that crosses the socket is serialized with serde_json. Document
//! fields use camelCase (`matchData`, `wagonData`, `updatedAt`) and event and
//! update kinds use kebab-case (`state-patch`, `bulk-update`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Tenant key used when the caller supplies nothing, or only whitespace.
pub const DEFAULT_TENANT: &str = "default";

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A normalized tenant identifier: the sole partition key for state and
/// subscriptions.
///
/// Construction always trims surrounding whitespace; an empty result becomes
/// [`DEFAULT_TENANT`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TenantKey(String);

impl TenantKey {
    /// Normalize a caller-supplied identifier, which may be absent.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(trimmed) if !trimmed.is_empty() => Self(trimmed.to_owned()),
            _ => Self(DEFAULT_TENANT.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantKey {
    fn default() -> Self {
        Self(DEFAULT_TENANT.to_owned())
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for TenantKey {
    fn from(s: &str) -> Self {
        Self::normalize(Some(s))
    }
}

impl From<String> for TenantKey {
    fn from(s: String) -> Self {
        Self::normalize(Some(&s))
    }
}

impl From<Option<&str>> for TenantKey {
    fn from(s: Option<&str>) -> Self {
        Self::normalize(s)
    }
}

impl<'de> Deserialize<'de> for TenantKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::normalize(raw.as_deref()))
    }
}

/// Identifier the transport assigns to one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Per-tenant live state.
///
/// `Document::default()` is the implicit empty document every tenant starts
/// from: empty `matchData` and `overlays`, no wagons, `updatedAt = null`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub match_data: Map<String, Value>,
    #[serde(default)]
    pub overlays: Map<String, Value>,
    #[serde(default)]
    pub wagon_data: Vec<Value>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    /// Apply a publish to this document and return the previous version.
    ///
    /// `match_data` replaces the whole field; `overlays` is merged shallowly
    /// (supplied keys overwrite, other keys are kept). `updated_at` moves to
    /// `now` whenever at least one field was supplied.
    pub fn merge(
        &mut self,
        match_data: Option<Map<String, Value>>,
        overlays: Option<Map<String, Value>>,
        now: DateTime<Utc>,
    ) -> Document {
        let old = self.clone();
        let touched = match_data.is_some() || overlays.is_some();
        if let Some(match_data) = match_data {
            self.match_data = match_data;
        }
        if let Some(overlays) = overlays {
            for (key, value) in overlays {
                self.overlays.insert(key, value);
            }
        }
        if touched {
            self.updated_at = Some(now);
        }
        old
    }

    /// Replace the wagon sequence and return the previous one.
    pub fn replace_sequence(&mut self, wagons: Vec<Value>, now: DateTime<Utc>) -> Vec<Value> {
        self.updated_at = Some(now);
        std::mem::replace(&mut self.wagon_data, wagons)
    }
}

// ---------------------------------------------------------------------------
// Patch operations
// ---------------------------------------------------------------------------

/// What happened at one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Change {
    /// The path now holds `value` (which may be JSON `null`).
    Set { value: Value },
    /// Tombstone: the key no longer exists.
    Remove,
}

/// One `(path, value | tombstone)` instruction; `path` is dot-delimited,
/// e.g. `matchData.score.home`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOp {
    pub path: String,
    #[serde(flatten)]
    pub change: Change,
}

impl PatchOp {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            change: Change::Set { value },
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            change: Change::Remove,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self.change, Change::Remove)
    }
}

// ---------------------------------------------------------------------------
// Update payloads
// ---------------------------------------------------------------------------

/// Changed fields of the live score summary, keyed by path relative to the
/// score sub-path.
///
/// `reset` means the score mapping was created or replaced as a whole and
/// `fields` is its complete content. `cleared` means the score key no longer
/// exists; `fields` and `removed` are then empty.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScoreUpdate {
    pub fields: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removed: Vec<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub reset: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cleared: bool,
}

impl ScoreUpdate {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.removed.is_empty() && !self.reset && !self.cleared
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Tail of an append-only wagon change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WagonAppend {
    pub items: Vec<Value>,
    pub start_index: usize,
}

/// The update families the coalescer queues per tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateKind {
    StatePatch,
    ScoreUpdate,
    WagonAppend,
    WagonUpdate,
}

impl UpdateKind {
    /// Lower sorts first inside a bulk message.
    pub fn priority(self) -> u8 {
        match self {
            UpdateKind::ScoreUpdate => 0,
            UpdateKind::StatePatch | UpdateKind::WagonAppend | UpdateKind::WagonUpdate => 1,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateKind::StatePatch => write!(f, "state-patch"),
            UpdateKind::ScoreUpdate => write!(f, "score-update"),
            UpdateKind::WagonAppend => write!(f, "wagon-append"),
            UpdateKind::WagonUpdate => write!(f, "wagon-update"),
        }
    }
}

/// A pending batch entry: one logical change, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Update {
    StatePatch(Vec<PatchOp>),
    ScoreUpdate(ScoreUpdate),
    WagonAppend(WagonAppend),
    WagonUpdate(Vec<Value>),
}

impl Update {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Update::StatePatch(_) => UpdateKind::StatePatch,
            Update::ScoreUpdate(_) => UpdateKind::ScoreUpdate,
            Update::WagonAppend(_) => UpdateKind::WagonAppend,
            Update::WagonUpdate(_) => UpdateKind::WagonUpdate,
        }
    }
}

/// Messages pushed to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Full document, sent once to a connection right after it joins.
    Init(Document),
    /// Everything queued for a tenant during one flush interval.
    BulkUpdate(Vec<Update>),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
