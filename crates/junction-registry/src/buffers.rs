//! Drainable buffers for out-of-band backend traffic.
//!
//! Backends push notifications and log messages outside any request cycle;
//! the registry parks them here until the gateway surface asks. Reads are
//! destructive: `drain_*` returns the snapshot and clears the buffer.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An out-of-band notification received from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendNotification {
    /// Server the notification came from.
    pub server: String,
    /// Notification method, e.g. `notifications/resources/updated`.
    pub method: String,
    /// Notification params, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// A log message received from a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendLogEntry {
    /// Server the message came from.
    pub server: String,
    /// MCP logging level, e.g. "info", "warning", "error".
    pub level: String,
    /// Message payload.
    pub message: String,
}

/// Notification and log buffers for one registry.
#[derive(Default)]
pub struct EventBuffers {
    notifications: Mutex<Vec<BackendNotification>>,
    logs: Mutex<Vec<BackendLogEntry>>,
}

impl EventBuffers {
    /// Park a notification.
    pub fn record_notification(&self, n: BackendNotification) {
        self.notifications.lock().expect("buffer lock poisoned").push(n);
    }

    /// Park a log message.
    pub fn record_log(&self, entry: BackendLogEntry) {
        self.logs.lock().expect("buffer lock poisoned").push(entry);
    }

    /// Return all parked notifications and clear the buffer.
    pub fn drain_notifications(&self) -> Vec<BackendNotification> {
        std::mem::take(&mut *self.notifications.lock().expect("buffer lock poisoned"))
    }

    /// Return all parked log messages and clear the buffer.
    pub fn drain_logs(&self) -> Vec<BackendLogEntry> {
        std::mem::take(&mut *self.logs.lock().expect("buffer lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_returns_snapshot_and_clears() {
        let buffers = EventBuffers::default();
        buffers.record_notification(BackendNotification {
            server: "a".into(),
            method: "notifications/tools/list_changed".into(),
            params: None,
        });
        buffers.record_notification(BackendNotification {
            server: "b".into(),
            method: "notifications/resources/updated".into(),
            params: Some(serde_json::json!({"uri": "file:///x"})),
        });

        let first = buffers.drain_notifications();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].server, "a");
        assert_eq!(first[1].server, "b");

        assert!(buffers.drain_notifications().is_empty(), "drain clears");
    }

    #[test]
    fn logs_preserve_insertion_order() {
        let buffers = EventBuffers::default();
        for i in 0..3 {
            buffers.record_log(BackendLogEntry {
                server: "s".into(),
                level: "info".into(),
                message: format!("line {i}"),
            });
        }
        let drained = buffers.drain_logs();
        let messages: Vec<&str> = drained.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["line 0", "line 1", "line 2"]);
    }
}
