//! Error types for matchcast-sync.

use thiserror::Error;

use matchcast_core::ConnectionId;

/// Delivery failures reported by a [`Subscriber`](crate::Subscriber).
///
/// These never escape the engine: the router logs them and drops the
/// subscriber.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The connection's outbound side is gone.
    #[error("subscriber {0} disconnected")]
    Disconnected(ConnectionId),

    /// The event could not be encoded for the wire.
    #[error("event JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
