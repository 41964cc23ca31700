//! Per-tenant update buffer drained once per flush tick.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use matchcast_core::{TenantKey, Update};

/// Everything queued for one tenant since the previous drain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub tenant: TenantKey,
    pub updates: Vec<Update>,
}

#[derive(Debug, Default)]
pub struct Coalescer {
    pending: Mutex<HashMap<TenantKey, Vec<Update>>>,
}

impl Coalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `update` to `tenant`'s queue.
    pub fn enqueue(&self, tenant: &TenantKey, update: Update) {
        self.lock().entry(tenant.clone()).or_default().push(update);
    }

    /// Take every non-empty queue, leaving the buffer empty.
    ///
    /// Batches are ordered by tenant key. Inside a batch, higher-priority
    /// kinds come first and enqueue order is kept within a priority.
    pub fn drain(&self) -> Vec<Batch> {
        let pending = std::mem::take(&mut *self.lock());
        let mut batches: Vec<Batch> = pending
            .into_iter()
            .filter(|(_, updates)| !updates.is_empty())
            .map(|(tenant, mut updates)| {
                updates.sort_by_key(|update| update.kind().priority());
                Batch { tenant, updates }
            })
            .collect();
        batches.sort_by(|a, b| a.tenant.cmp(&b.tenant));
        batches
    }

    /// Updates waiting for `tenant`.
    pub fn pending_for(&self, tenant: &TenantKey) -> usize {
        self.lock().get(tenant).map_or(0, Vec::len)
    }

    /// Updates waiting across all tenants.
    pub fn pending_total(&self) -> usize {
        self.lock().values().map(Vec::len).sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TenantKey, Vec<Update>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use matchcast_core::{PatchOp, ScoreUpdate};
    use serde_json::json;

    use super::*;

    fn patch(n: i64) -> Update {
        Update::StatePatch(vec![PatchOp::set("matchData.n", json!(n))])
    }

    fn score(home: i64) -> Update {
        let mut update = ScoreUpdate::default();
        update.fields.insert("home".into(), json!(home));
        Update::ScoreUpdate(update)
    }

    #[test]
    fn drain_groups_by_tenant_and_clears() {
        let coalescer = Coalescer::new();
        let a = TenantKey::from("a");
        let b = TenantKey::from("b");
        coalescer.enqueue(&b, patch(1));
        coalescer.enqueue(&a, patch(2));
        coalescer.enqueue(&a, patch(3));
        assert_eq!(coalescer.pending_for(&a), 2);
        assert_eq!(coalescer.pending_total(), 3);

        let batches = coalescer.drain();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].tenant, a);
        assert_eq!(batches[0].updates, vec![patch(2), patch(3)]);
        assert_eq!(batches[1].tenant, b);

        assert_eq!(coalescer.pending_total(), 0);
        assert!(coalescer.drain().is_empty(), "second drain has nothing to send");
    }

    #[test]
    fn score_updates_move_ahead_keeping_relative_order() {
        let coalescer = Coalescer::new();
        let tenant = TenantKey::default();
        coalescer.enqueue(&tenant, patch(1));
        coalescer.enqueue(&tenant, score(1));
        coalescer.enqueue(&tenant, patch(2));
        coalescer.enqueue(&tenant, score(2));

        let batches = coalescer.drain();
        assert_eq!(
            batches[0].updates,
            vec![score(1), score(2), patch(1), patch(2)]
        );
    }
}
