//! Matchcast core library: tenant keys, documents, wire types, the
//! per-tenant document store, and daemon configuration.
//!
//! - [`types`]: newtypes, [`Document`], patch and event payloads
//! - [`store`]: [`DocumentStore`]
//! - [`clock`]: injectable time source for `updatedAt`
//! - [`config`]: `~/.matchcast/config.yaml`
//! - [`error`]: [`ConfigError`]

pub mod clock;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::ConfigError;
pub use store::DocumentStore;
pub use types::{
    Change, ConnectionId, Document, PatchOp, ScoreUpdate, ServerEvent, TenantKey, Update,
    UpdateKind, WagonAppend, DEFAULT_TENANT,
};
