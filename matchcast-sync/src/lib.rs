//! # matchcast-sync
//!
//! State-synchronization engine: structural diffing, append detection,
//! per-tenant update coalescing and subscriber fan-out.
//!
//! [`SyncEngine`] wires the pieces together. Publishes go through
//! [`SyncEngine::publish_update`] and [`SyncEngine::publish_sequence`]; the
//! caller drives [`SyncEngine::flush`] from a timer.

pub mod coalescer;
pub mod diff;
pub mod engine;
pub mod error;
pub mod router;
pub mod score;
pub mod sequence;

pub use coalescer::{Batch, Coalescer};
pub use engine::{FlushSummary, PublishOutcome, SyncEngine, TenantStatus};
pub use error::SyncError;
pub use router::{Router, Subscriber};
pub use score::ScorePath;
pub use sequence::SequenceDelta;
