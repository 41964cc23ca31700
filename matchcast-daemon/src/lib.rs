//! Matchcast daemon: Unix-socket transport, flush ticker and client helpers.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
mod transport;

pub use error::DaemonError;
pub use protocol::{
    request_publish, request_sequence, request_snapshot, request_status, request_stop,
    send_request, watch, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, start_blocking};
pub use transport::ChannelSubscriber;
