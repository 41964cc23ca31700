//! Channel-backed [`Subscriber`] for socket connections.
//!
//! Each connection owns an unbounded queue of encoded lines drained by its
//! writer task. Events and request responses share the queue, so a client
//! sees them in the order the daemon produced them.

use tokio::sync::mpsc;

use matchcast_core::{ConnectionId, ServerEvent};
use matchcast_sync::{Subscriber, SyncError};

pub struct ChannelSubscriber {
    conn: ConnectionId,
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSubscriber {
    pub fn new(conn: ConnectionId, tx: mpsc::UnboundedSender<String>) -> Self {
        Self { conn, tx }
    }
}

impl Subscriber for ChannelSubscriber {
    fn deliver(&self, event: &ServerEvent) -> Result<(), SyncError> {
        let line = serde_json::to_string(event)?;
        self.tx
            .send(line)
            .map_err(|_| SyncError::Disconnected(self.conn))
    }
}

#[cfg(test)]
mod tests {
    use matchcast_core::Document;

    use super::*;

    #[test]
    fn delivers_one_json_line_per_event() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = ChannelSubscriber::new(ConnectionId(3), tx);
        subscriber
            .deliver(&ServerEvent::Init(Document::default()))
            .expect("deliver");

        let line = rx.try_recv().expect("line");
        let value: serde_json::Value = serde_json::from_str(&line).expect("json");
        assert_eq!(value["event"], "init");
        assert_eq!(value["payload"]["wagonData"], serde_json::json!([]));
    }

    #[test]
    fn closed_queue_reports_disconnect() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let subscriber = ChannelSubscriber::new(ConnectionId(9), tx);
        let err = subscriber
            .deliver(&ServerEvent::BulkUpdate(vec![]))
            .unwrap_err();
        assert!(matches!(err, SyncError::Disconnected(ConnectionId(9))));
    }
}
