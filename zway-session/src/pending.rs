//! The pending outbound request table (`spec.md` §4.5): when a session
//! posts a request to its client, it registers `(requestId → kind,
//! completer)`; the reply arrives asynchronously on the same connection
//! and resolves it exactly once. Modeled with a channel per the design
//! note in `spec.md` §9 ("model each outbound request as a future or a
//! channel receiver").

use hashbrown::HashMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use zway_proto::{RequestId, Result};
use zway_store::RequestKind;

/// What the response packet carries back to whoever is awaiting it.
#[derive(Debug, Clone)]
pub struct PendingResponse {
    pub status: u32,
    pub fields: Value,
}

struct Entry {
    kind: RequestKind,
    completer: oneshot::Sender<PendingResponse>,
}

#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<RequestId, Entry>>,
}

impl PendingTable {
    pub fn new() -> PendingTable {
        PendingTable::default()
    }

    /// Register a new outbound request, returning the receiver its
    /// eventual response resolves on.
    pub fn register(&self, id: RequestId, kind: RequestKind) -> oneshot::Receiver<PendingResponse> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(id, Entry { kind, completer: tx });
        rx
    }

    /// Whether a request of this kind is already pending to the given
    /// destination — used by `processUserRequests` to avoid re-sending a
    /// delivery that's already in flight (`spec.md` §4.5).
    pub fn has_pending_kind(&self, kind: RequestKind) -> bool {
        self.entries.lock().values().any(|entry| entry.kind == kind)
    }

    /// Resolve a pending entry by id, firing its completer exactly once.
    /// Returns `true` if an entry was found (the caller treats an unknown
    /// id as an unsolicited response packet and ignores it).
    pub fn resolve(&self, id: RequestId, response: PendingResponse) -> bool {
        match self.entries.lock().remove(&id) {
            Some(entry) => {
                let _ = entry.completer.send(response);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Await a pending response, mapping a dropped sender (session closed
/// before reply) into a clean `Disconnected`.
pub async fn await_response(rx: oneshot::Receiver<PendingResponse>) -> Result<PendingResponse> {
    rx.await.map_err(|_| zway_proto::Error::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_to_registered_receiver() {
        let table = PendingTable::new();
        let rx = table.register(RequestId(1), RequestKind::Push);

        assert!(table.resolve(
            RequestId(1),
            PendingResponse {
                status: 1,
                fields: Value::Null,
            }
        ));

        let response = await_response(rx).await.unwrap();
        assert_eq!(response.status, 1);
    }

    #[test]
    fn resolve_unknown_id_returns_false() {
        let table = PendingTable::new();
        assert!(!table.resolve(RequestId(99), PendingResponse { status: 1, fields: Value::Null }));
    }

    #[test]
    fn has_pending_kind_reflects_registered_entries() {
        let table = PendingTable::new();
        assert!(!table.has_pending_kind(RequestKind::Dispatch));
        let _rx = table.register(RequestId(5), RequestKind::Dispatch);
        assert!(table.has_pending_kind(RequestKind::Dispatch));
    }
}
