//! Tenant-scoped fan-out.
//!
//! A connection sits in at most one tenant group; joining another tenant
//! moves it. Delivery is at-most-once: a [`Subscriber`] that fails is dropped
//! from its group and never retried.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use matchcast_core::{ConnectionId, ServerEvent, TenantKey};

use crate::error::SyncError;

/// Outbound side of one connection, supplied by the transport.
pub trait Subscriber: Send + Sync {
    fn deliver(&self, event: &ServerEvent) -> Result<(), SyncError>;
}

#[derive(Default)]
struct RouterState {
    groups: HashMap<TenantKey, HashMap<ConnectionId, Arc<dyn Subscriber>>>,
    membership: HashMap<ConnectionId, TenantKey>,
}

impl RouterState {
    fn remove(&mut self, conn: ConnectionId) -> Option<TenantKey> {
        let tenant = self.membership.remove(&conn)?;
        if let Some(group) = self.groups.get_mut(&tenant) {
            group.remove(&conn);
            if group.is_empty() {
                self.groups.remove(&tenant);
            }
        }
        Some(tenant)
    }
}

#[derive(Default)]
pub struct Router {
    state: RwLock<RouterState>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `conn` to `tenant`, leaving any previous group.
    ///
    /// Returns the tenant the connection was moved away from, if any.
    pub fn join(
        &self,
        conn: ConnectionId,
        tenant: &TenantKey,
        subscriber: Arc<dyn Subscriber>,
    ) -> Option<TenantKey> {
        let mut state = self.write();
        let previous = state.remove(conn).filter(|prev| prev != tenant);
        state
            .groups
            .entry(tenant.clone())
            .or_default()
            .insert(conn, subscriber);
        state.membership.insert(conn, tenant.clone());
        previous
    }

    /// Drop `conn` from whatever group it belongs to.
    pub fn leave(&self, conn: ConnectionId) -> Option<TenantKey> {
        self.write().remove(conn)
    }

    /// Deliver `event` to one connection. Returns whether it was delivered.
    pub fn send_to(&self, conn: ConnectionId, event: &ServerEvent) -> bool {
        let subscriber = {
            let state = self.read();
            state
                .membership
                .get(&conn)
                .and_then(|tenant| state.groups.get(tenant))
                .and_then(|group| group.get(&conn))
                .cloned()
        };
        let Some(subscriber) = subscriber else {
            return false;
        };
        match subscriber.deliver(event) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!("dropping {conn}: {err}");
                self.leave(conn);
                false
            }
        }
    }

    /// Deliver `event` to every subscriber of `tenant`; returns how many
    /// received it.
    pub fn emit(&self, tenant: &TenantKey, event: &ServerEvent) -> usize {
        let targets: Vec<(ConnectionId, Arc<dyn Subscriber>)> = match self.read().groups.get(tenant) {
            Some(group) => group.iter().map(|(conn, sub)| (*conn, sub.clone())).collect(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (conn, subscriber) in targets {
            match subscriber.deliver(event) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    tracing::debug!("dropping {conn} from {tenant}: {err}");
                    failed.push(conn);
                }
            }
        }

        if !failed.is_empty() {
            let mut state = self.write();
            for conn in failed {
                if state.membership.get(&conn) == Some(tenant) {
                    state.remove(conn);
                }
            }
        }
        delivered
    }

    /// Tenant `conn` currently belongs to.
    pub fn tenant_of(&self, conn: ConnectionId) -> Option<TenantKey> {
        self.read().membership.get(&conn).cloned()
    }

    pub fn subscriber_count(&self, tenant: &TenantKey) -> usize {
        self.read().groups.get(tenant).map_or(0, HashMap::len)
    }

    pub fn connection_count(&self) -> usize {
        self.read().membership.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, RouterState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RouterState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
