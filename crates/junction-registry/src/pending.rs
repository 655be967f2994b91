//! Pending host-side requests initiated by backends.
//!
//! Backends may ask the gateway for *sampling* (an LLM completion) or
//! *elicitation* (a question for the human operator). Those requests park
//! here until an operator-side surface responds, rejects, or the
//! per-request timeout fires. Removing a server rejects its pending
//! requests; shutting the registry down rejects everything.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use junction_error::RegistryError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

/// Default per-request timeout: five minutes.
pub const DEFAULT_PENDING_TIMEOUT: Duration = Duration::from_secs(300);

/// What a backend is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingKind {
    /// An LLM completion on the backend's behalf.
    Sampling,
    /// An answer from the human operator.
    Elicitation,
}

/// Listing view of one parked request.
#[derive(Debug, Clone, Serialize)]
pub struct PendingRequest {
    /// Request id, unique within the registry.
    pub id: String,
    /// Server that initiated the request.
    pub server: String,
    /// Request kind.
    pub kind: PendingKind,
    /// Request parameters as received from the backend.
    pub params: Value,
}

/// Outcome delivered to the awaiting backend: the responder's value, or a
/// rejection reason.
pub type PendingOutcome = Result<Value, String>;

struct PendingEntry {
    server: String,
    kind: PendingKind,
    params: Value,
    responder: oneshot::Sender<PendingOutcome>,
}

/// The set of parked requests for one registry.
pub struct PendingRequests {
    entries: Mutex<HashMap<String, PendingEntry>>,
    counter: AtomicU64,
    timeout: Duration,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::with_timeout(DEFAULT_PENDING_TIMEOUT)
    }
}

impl PendingRequests {
    /// Build with a non-default per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            counter: AtomicU64::new(0),
            timeout,
        }
    }

    /// Park a new request. Returns its id and the receiver the initiating
    /// backend awaits. The request is rejected automatically when the
    /// per-request timeout elapses first.
    pub fn create(
        self: &Arc<Self>,
        server: impl Into<String>,
        kind: PendingKind,
        params: Value,
    ) -> (String, oneshot::Receiver<PendingOutcome>) {
        let server = server.into();
        let id = format!("req-{}", self.counter.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = oneshot::channel();
        self.entries.lock().expect("pending lock poisoned").insert(
            id.clone(),
            PendingEntry {
                server,
                kind,
                params,
                responder: tx,
            },
        );

        let this = Arc::clone(self);
        let timeout_id = id.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if this.finish(&timeout_id, Err("Request timed out".to_string())) {
                tracing::warn!(id = %timeout_id, "pending request timed out");
            }
        });

        (id, rx)
    }

    /// Snapshot of all parked requests.
    pub fn list(&self) -> Vec<PendingRequest> {
        self.entries
            .lock()
            .expect("pending lock poisoned")
            .iter()
            .map(|(id, e)| PendingRequest {
                id: id.clone(),
                server: e.server.clone(),
                kind: e.kind,
                params: e.params.clone(),
            })
            .collect()
    }

    /// Deliver a response to the initiating backend.
    pub fn respond(&self, id: &str, value: Value) -> Result<(), RegistryError> {
        if self.finish(id, Ok(value)) {
            Ok(())
        } else {
            Err(RegistryError::PendingNotFound(id.to_string()))
        }
    }

    /// Reject a request with a reason.
    pub fn reject(&self, id: &str, reason: impl Into<String>) -> Result<(), RegistryError> {
        if self.finish(id, Err(reason.into())) {
            Ok(())
        } else {
            Err(RegistryError::PendingNotFound(id.to_string()))
        }
    }

    /// Reject every request initiated by one server.
    pub fn reject_server(&self, server: &str, reason: &str) {
        let ids: Vec<String> = {
            let entries = self.entries.lock().expect("pending lock poisoned");
            entries
                .iter()
                .filter(|(_, e)| e.server == server)
                .map(|(id, _)| id.clone())
                .collect()
        };
        for id in ids {
            self.finish(&id, Err(reason.to_string()));
        }
    }

    /// Reject every parked request.
    pub fn reject_all(&self, reason: &str) {
        let ids: Vec<String> = {
            let entries = self.entries.lock().expect("pending lock poisoned");
            entries.keys().cloned().collect()
        };
        for id in ids {
            self.finish(&id, Err(reason.to_string()));
        }
    }

    /// Remove an entry and deliver its outcome. Returns false when the id
    /// is no longer parked (already settled).
    fn finish(&self, id: &str, outcome: PendingOutcome) -> bool {
        let entry = self.entries.lock().expect("pending lock poisoned").remove(id);
        match entry {
            Some(e) => {
                // The backend side may have dropped its receiver; that is
                // its way of abandoning the request.
                let _ = e.responder.send(outcome);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> Arc<PendingRequests> {
        Arc::new(PendingRequests::default())
    }

    #[tokio::test]
    async fn respond_delivers_to_the_initiator() {
        let p = pending();
        let (id, rx) = p.create("github", PendingKind::Sampling, serde_json::json!({"q": 1}));

        assert_eq!(p.list().len(), 1);
        p.respond(&id, serde_json::json!("answer")).unwrap();

        assert_eq!(rx.await.unwrap(), Ok(serde_json::json!("answer")));
        assert!(p.list().is_empty(), "settled requests leave the listing");
    }

    #[tokio::test]
    async fn reject_delivers_the_reason() {
        let p = pending();
        let (id, rx) = p.create("github", PendingKind::Elicitation, Value::Null);

        p.reject(&id, "operator declined").unwrap();
        assert_eq!(rx.await.unwrap(), Err("operator declined".to_string()));
    }

    #[tokio::test]
    async fn respond_to_unknown_id_errors() {
        let p = pending();
        let err = p.respond("req-404", Value::Null).unwrap_err();
        assert_eq!(err.code(), "PENDING_NOT_FOUND");
    }

    #[tokio::test]
    async fn server_removal_rejects_only_that_server() {
        let p = pending();
        let (_, rx_a) = p.create("alpha", PendingKind::Sampling, Value::Null);
        let (_, rx_b) = p.create("beta", PendingKind::Sampling, Value::Null);

        p.reject_server("alpha", "Server 'alpha' disconnected");

        assert_eq!(
            rx_a.await.unwrap(),
            Err("Server 'alpha' disconnected".to_string())
        );
        assert_eq!(p.list().len(), 1);
        drop(rx_b);
    }

    #[tokio::test]
    async fn reject_all_empties_the_set() {
        let p = pending();
        let (_, rx1) = p.create("alpha", PendingKind::Sampling, Value::Null);
        let (_, rx2) = p.create("beta", PendingKind::Elicitation, Value::Null);

        p.reject_all("Registry shutting down");

        assert_eq!(rx1.await.unwrap(), Err("Registry shutting down".to_string()));
        assert_eq!(rx2.await.unwrap(), Err("Registry shutting down".to_string()));
        assert!(p.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_rejects_unanswered_requests() {
        let p = Arc::new(PendingRequests::with_timeout(Duration::from_secs(1)));
        let (_, rx) = p.create("github", PendingKind::Sampling, Value::Null);

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(rx.await.unwrap(), Err("Request timed out".to_string()));
        assert!(p.list().is_empty());
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let p = pending();
        let (a, _rx_a) = p.create("s", PendingKind::Sampling, Value::Null);
        let (b, _rx_b) = p.create("s", PendingKind::Sampling, Value::Null);
        assert_ne!(a, b);
    }
}
