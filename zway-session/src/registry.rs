//! The server's session registry: `accountId → list<Session>` (`spec.md`
//! §3/§4.7). All registry operations are serialized behind one mutex, first
//! in the lock-acquisition hierarchy of `spec.md` §5.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::Mutex;
use zway_proto::AccountId;

use crate::session::Session;

static NEXT_SLOT: AtomicU64 = AtomicU64::new(1);

/// Identifies one `Session` instance independent of its (mutable)
/// `accountId`, so it can be located and removed under its old key after
/// login re-files it under a new one.
pub fn next_slot_id() -> u64 {
    NEXT_SLOT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Default)]
pub struct SessionRegistry {
    by_account: Mutex<HashMap<AccountId, Vec<Arc<Session>>>>,
}

impl SessionRegistry {
    pub fn new() -> SessionRegistry {
        SessionRegistry::default()
    }

    pub fn append(&self, account_id: AccountId, session: Arc<Session>) {
        self.by_account.lock().entry(account_id).or_default().push(session);
    }

    /// Remove this exact session instance from under `account_id`. Drops
    /// the now-empty bucket so `get_sessions` reports `[]` rather than a
    /// dangling empty `Vec`.
    pub fn remove(&self, account_id: AccountId, slot_id: u64) {
        let mut by_account = self.by_account.lock();
        if let Some(sessions) = by_account.get_mut(&account_id) {
            sessions.retain(|s| s.slot_id() != slot_id);
            if sessions.is_empty() {
                by_account.remove(&account_id);
            }
        }
    }

    pub fn get_sessions(&self, account_id: AccountId) -> Vec<Arc<Session>> {
        self.by_account.lock().get(&account_id).cloned().unwrap_or_default()
    }

    pub fn has_sessions(&self, account_id: AccountId) -> bool {
        self.by_account.lock().get(&account_id).map_or(false, |s| !s.is_empty())
    }

    pub fn session_count(&self) -> usize {
        self.by_account.lock().values().map(Vec::len).sum()
    }

    /// Every live session, for the ticker's heartbeat sweep (`spec.md`
    /// §4.6/§4.7).
    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.by_account.lock().values().flatten().cloned().collect()
    }

    /// Close and drop every session (`removeSessions`, `spec.md` §4.7):
    /// used by the `r` stdin command and server shutdown.
    pub fn remove_all(&self) -> Vec<Arc<Session>> {
        let mut by_account = self.by_account.lock();
        let all: Vec<Arc<Session>> = by_account.values().flatten().cloned().collect();
        by_account.clear();
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionContext;

    fn test_session(ctx: Arc<SessionContext>) -> Arc<Session> {
        Session::new_placeholder(ctx, "127.0.0.1".to_string()).0
    }

    #[test]
    fn append_then_get_returns_inserted_session() {
        let ctx = SessionContext::for_tests();
        let registry = SessionRegistry::new();
        let session = test_session(ctx);

        registry.append(AccountId(1), session.clone());
        assert_eq!(registry.get_sessions(AccountId(1)).len(), 1);
    }

    #[test]
    fn remove_drops_empty_bucket() {
        let ctx = SessionContext::for_tests();
        let registry = SessionRegistry::new();
        let session = test_session(ctx);
        let slot = session.slot_id();

        registry.append(AccountId(2), session);
        registry.remove(AccountId(2), slot);

        assert!(registry.get_sessions(AccountId(2)).is_empty());
        assert!(!registry.has_sessions(AccountId(2)));
    }
}
