//! In-memory per-tenant document store.
//!
//! # Locking
//!
//! ```text
//! DocumentStore
//!   tenants: RwLock<HashMap<TenantKey, Arc<Mutex<Document>>>>
//! ```
//!
//! The outer `RwLock` is held only long enough to find or create a tenant's
//! slot. Every read or mutation of a document then happens under that
//! tenant's own `Mutex`, so writers to different tenants never contend and
//! writers to the same tenant are serialized.
//!
//! Documents are created lazily on first access and never evicted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::clock::{Clock, SystemClock};
use crate::types::{Document, TenantKey};

type Slot = Arc<Mutex<Document>>;

pub struct DocumentStore {
    tenants: RwLock<HashMap<TenantKey, Slot>>,
    clock: Arc<dyn Clock>,
}

impl Default for DocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Current document for `key`, creating the empty document on first use.
    pub fn get(&self, key: &TenantKey) -> Document {
        let slot = self.slot(key);
        let doc = slot.lock().unwrap_or_else(PoisonError::into_inner);
        doc.clone()
    }

    /// Run `f` with exclusive access to one tenant's document.
    ///
    /// Everything `f` does is indivisible with respect to other calls for the
    /// same tenant.
    pub fn update<R>(&self, key: &TenantKey, f: impl FnOnce(&mut Document) -> R) -> R {
        let slot = self.slot(key);
        let mut doc = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut doc)
    }

    /// Replace `matchData` and shallow-merge `overlays`; returns `(old, new)`.
    pub fn merge(
        &self,
        key: &TenantKey,
        match_data: Option<Map<String, Value>>,
        overlays: Option<Map<String, Value>>,
    ) -> (Document, Document) {
        let now = self.now();
        self.update(key, |doc| {
            let old = doc.merge(match_data, overlays, now);
            (old, doc.clone())
        })
    }

    /// Replace `wagonData`; returns `(old, new)`.
    pub fn replace_sequence(&self, key: &TenantKey, wagons: Vec<Value>) -> (Vec<Value>, Vec<Value>) {
        let now = self.now();
        self.update(key, |doc| {
            let old = doc.replace_sequence(wagons, now);
            (old, doc.wagon_data.clone())
        })
    }

    /// Number of tenants referenced so far.
    pub fn len(&self) -> usize {
        self.read_tenants().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All known tenant keys, sorted.
    pub fn tenants(&self) -> Vec<TenantKey> {
        let mut keys: Vec<TenantKey> = self.read_tenants().keys().cloned().collect();
        keys.sort();
        keys
    }

    fn slot(&self, key: &TenantKey) -> Slot {
        if let Some(slot) = self.read_tenants().get(key) {
            return slot.clone();
        }
        let mut tenants = self.tenants.write().unwrap_or_else(PoisonError::into_inner);
        tenants.entry(key.clone()).or_default().clone()
    }

    fn read_tenants(&self) -> std::sync::RwLockReadGuard<'_, HashMap<TenantKey, Slot>> {
        self.tenants.read().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn key(s: &str) -> TenantKey {
        TenantKey::from(s)
    }

    #[test]
    fn get_creates_empty_document_once() {
        let store = DocumentStore::new();
        assert!(store.is_empty());

        let doc = store.get(&key("arena"));
        assert_eq!(doc, Document::default());
        assert_eq!(store.len(), 1);

        store.get(&key("arena"));
        assert_eq!(store.len(), 1, "repeat reads must not add tenants");
    }

    #[test]
    fn merge_returns_old_and_new() {
        let start = Utc.with_ymd_and_hms(2026, 3, 14, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = DocumentStore::with_clock(clock.clone());

        let (old, new) = store.merge(
            &key("arena"),
            json!({"period": 1}).as_object().cloned(),
            None,
        );
        assert_eq!(old, Document::default());
        assert_eq!(new.match_data["period"], json!(1));
        assert_eq!(new.updated_at, Some(start));

        clock.advance(Duration::seconds(5));
        let (old, new) = store.merge(&key("arena"), None, json!({"x": 1}).as_object().cloned());
        assert_eq!(old.match_data["period"], json!(1));
        assert_eq!(new.match_data["period"], json!(1), "absent matchData is untouched");
        assert_eq!(new.updated_at, Some(start + Duration::seconds(5)));
        assert_eq!(store.get(&key("arena")), new);
    }

    #[test]
    fn replace_sequence_returns_both_versions() {
        let store = DocumentStore::new();
        store.replace_sequence(&key("arena"), vec![json!("a")]);
        let (old, new) = store.replace_sequence(&key("arena"), vec![json!("a"), json!("b")]);
        assert_eq!(old, vec![json!("a")]);
        assert_eq!(new, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn tenants_are_isolated_and_listed_sorted() {
        let store = DocumentStore::new();
        store.merge(&key("b"), json!({"v": "b"}).as_object().cloned(), None);
        store.merge(&key("a"), json!({"v": "a"}).as_object().cloned(), None);

        assert_eq!(store.get(&key("a")).match_data["v"], json!("a"));
        assert_eq!(store.get(&key("b")).match_data["v"], json!("b"));
        assert_eq!(store.tenants(), vec![key("a"), key("b")]);
    }

    #[test]
    fn each_distinct_key_grows_the_store() {
        let store = DocumentStore::new();
        for n in 0..50 {
            store.get(&key(&format!("tenant-{n}")));
        }
        assert_eq!(store.len(), 50, "documents are never evicted");
    }

    #[test]
    fn concurrent_writers_to_one_tenant_are_serialized() {
        let store = Arc::new(DocumentStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.update(&key("arena"), |doc| {
                            let current = doc.match_data.get("n").and_then(Value::as_u64).unwrap_or(0);
                            doc.match_data.insert("n".into(), json!(current + 1));
                        });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }
        assert_eq!(store.get(&key("arena")).match_data["n"], json!(800));
    }
}
