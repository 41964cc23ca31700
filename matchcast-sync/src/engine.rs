//! Synchronization engine: request handling on top of the store, differ,
//! coalescer and router.
//!
//! ## Publish flow
//!
//! 1. Normalize the tenant key.
//! 2. Lock the tenant's document.
//! 3. Merge the supplied fields and diff each one against its old value.
//! 4. Split out score changes, queue the updates.
//! 5. Unlock.
//!
//! Steps 2 to 5 are one indivisible unit per tenant. Nothing is sent here;
//! subscribers only hear about publishes through [`SyncEngine::flush`].
//!
//! None of the entry points fail. Fields with the wrong JSON type are
//! treated as absent, unknown tenants are created on demand, and delivery
//! errors stay inside the router.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use matchcast_core::{
    Config, ConnectionId, Document, DocumentStore, ServerEvent, TenantKey, Update, UpdateKind,
};

use crate::coalescer::Coalescer;
use crate::router::{Router, Subscriber};
use crate::score::{self, ScorePath};
use crate::{diff, sequence};

/// What a publish queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub tenant: TenantKey,
    pub enqueued: Vec<UpdateKind>,
}

impl PublishOutcome {
    pub fn is_noop(&self) -> bool {
        self.enqueued.is_empty()
    }
}

/// Result of one flush tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushSummary {
    pub tenants: usize,
    pub updates: usize,
    pub delivered: usize,
}

/// Per-tenant line of the daemon status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    pub tenant: TenantKey,
    pub subscribers: usize,
    pub pending: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

pub struct SyncEngine {
    store: Arc<DocumentStore>,
    coalescer: Coalescer,
    router: Router,
    score_path: ScorePath,
}

impl SyncEngine {
    pub fn new(store: Arc<DocumentStore>, score_path: &str) -> Self {
        Self {
            store,
            coalescer: Coalescer::new(),
            router: Router::new(),
            score_path: ScorePath::new(score_path),
        }
    }

    pub fn from_config(store: Arc<DocumentStore>, config: &Config) -> Self {
        Self::new(store, &config.score_path)
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn coalescer(&self) -> &Coalescer {
        &self.coalescer
    }

    /// Subscribe `conn` to a tenant and send it the full current document.
    ///
    /// The snapshot is taken and delivered under the tenant lock, so no
    /// publish can land between the snapshot and the subscription.
    pub fn join(
        &self,
        conn: ConnectionId,
        raw_tenant: Option<&str>,
        subscriber: Arc<dyn Subscriber>,
    ) -> TenantKey {
        let tenant = TenantKey::normalize(raw_tenant);
        self.store.update(&tenant, |doc| {
            if let Some(previous) = self.router.join(conn, &tenant, subscriber) {
                tracing::debug!("{conn} moved from {previous} to {tenant}");
            }
            self.router.send_to(conn, &ServerEvent::Init(doc.clone()));
        });
        tracing::debug!("{conn} joined {tenant}");
        tenant
    }

    /// Merge a partial document update and queue whatever changed.
    pub fn publish_update(
        &self,
        raw_tenant: Option<&str>,
        match_data: Option<Value>,
        overlays: Option<Value>,
    ) -> PublishOutcome {
        let tenant = TenantKey::normalize(raw_tenant);
        let match_data = into_object(match_data, "matchData");
        let overlays = into_object(overlays, "overlays");
        let diff_match = match_data.is_some();
        let diff_overlays = overlays.is_some();
        let now = self.store.now();

        let enqueued = self.store.update(&tenant, |doc| {
            let old = doc.merge(match_data, overlays, now);

            let mut ops = Vec::new();
            if diff_match {
                ops.extend(diff::diff("matchData", &old.match_data, &doc.match_data));
            }
            if diff_overlays {
                ops.extend(diff::diff("overlays", &old.overlays, &doc.overlays));
            }

            let (ops, score) = score::split(ops, &self.score_path, &old, doc);
            let mut enqueued = Vec::new();
            if let Some(score) = score {
                enqueued.push(self.enqueue(&tenant, Update::ScoreUpdate(score)));
            }
            if !ops.is_empty() {
                enqueued.push(self.enqueue(&tenant, Update::StatePatch(ops)));
            }
            enqueued
        });

        tracing::debug!("publish_update {tenant}: queued {enqueued:?}");
        PublishOutcome { tenant, enqueued }
    }

    /// Replace the wagon sequence and queue an append or a full update.
    pub fn publish_sequence(&self, raw_tenant: Option<&str>, wagons: Option<Value>) -> PublishOutcome {
        let tenant = TenantKey::normalize(raw_tenant);
        let Some(wagons) = into_array(wagons) else {
            self.store.get(&tenant);
            return PublishOutcome {
                tenant,
                enqueued: Vec::new(),
            };
        };
        let now = self.store.now();

        let enqueued = self.store.update(&tenant, |doc| {
            let old = doc.replace_sequence(wagons, now);
            sequence::detect(&old, &doc.wagon_data)
                .into_update()
                .map(|update| self.enqueue(&tenant, update))
                .into_iter()
                .collect::<Vec<_>>()
        });

        tracing::debug!("publish_sequence {tenant}: queued {enqueued:?}");
        PublishOutcome { tenant, enqueued }
    }

    /// Forget `conn`'s subscription.
    pub fn disconnect(&self, conn: ConnectionId) {
        if let Some(tenant) = self.router.leave(conn) {
            tracing::debug!("{conn} left {tenant}");
        }
    }

    /// Send one `bulk-update` per tenant with pending updates.
    pub fn flush(&self) -> FlushSummary {
        let mut summary = FlushSummary::default();
        for batch in self.coalescer.drain() {
            summary.tenants += 1;
            summary.updates += batch.updates.len();
            summary.delivered += self
                .router
                .emit(&batch.tenant, &ServerEvent::BulkUpdate(batch.updates));
        }
        if summary.tenants > 0 {
            tracing::info!(
                "flushed {} update(s) for {} tenant(s) to {} subscriber(s)",
                summary.updates,
                summary.tenants,
                summary.delivered
            );
        }
        summary
    }

    /// Current document without subscribing.
    pub fn snapshot(&self, raw_tenant: Option<&str>) -> Document {
        self.store.get(&TenantKey::normalize(raw_tenant))
    }

    /// One line per known tenant, sorted by key.
    pub fn status(&self) -> Vec<TenantStatus> {
        self.store
            .tenants()
            .into_iter()
            .map(|tenant| TenantStatus {
                subscribers: self.router.subscriber_count(&tenant),
                pending: self.coalescer.pending_for(&tenant),
                updated_at: self.store.get(&tenant).updated_at,
                tenant,
            })
            .collect()
    }

    fn enqueue(&self, tenant: &TenantKey, update: Update) -> UpdateKind {
        let kind = update.kind();
        self.coalescer.enqueue(tenant, update);
        kind
    }
}

fn into_object(value: Option<Value>, field: &str) -> Option<Map<String, Value>> {
    match value? {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            tracing::debug!("ignoring {field}: expected an object, got {other}");
            None
        }
    }
}

fn into_array(value: Option<Value>) -> Option<Vec<Value>> {
    match value? {
        Value::Array(items) => Some(items),
        Value::Null => None,
        other => {
            tracing::debug!("ignoring wagonData: expected an array, got {other}");
            None
        }
    }
}
