//! In-memory reference implementation of [`Store`], used by the test suite
//! and as the pool's default backend. Mirrors `spec.md` §9's design note:
//! "a `Store` handle ... trivially testable with an in-memory fake."

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use zway_proto::{AccountId, Result};

use crate::store::{compare_phone, Store};
use crate::types::{Account, AccountQuery, InboxEntry, RequestKind, RequestQuery, RequestRecord};

#[derive(Default)]
struct Inner {
    accounts: HashMap<AccountId, Account>,
    requests: Vec<RequestRecord>,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn account_matches(account: &Account, query: &AccountQuery) -> bool {
    if let Some(id) = query.id {
        if account.id != id {
            return false;
        }
    }
    if let Some(name) = &query.name {
        if !account.name.eq_ignore_ascii_case(name) {
            return false;
        }
    }
    if let Some(substring) = &query.name_substring {
        if !account
            .name
            .to_lowercase()
            .contains(&substring.to_lowercase())
        {
            return false;
        }
    }
    if let Some(phone) = &query.phone {
        match &account.phone {
            Some(account_phone) => {
                if !compare_phone(account_phone, phone) {
                    return false;
                }
            }
            None => return false,
        }
    }
    if let Some(exclude) = query.exclude_id {
        if account.id == exclude {
            return false;
        }
    }
    if query.require_find_by_name && !account.find_by_name {
        return false;
    }
    if query.require_find_by_phone && !account.find_by_phone {
        return false;
    }
    true
}

fn request_matches(request: &RequestRecord, query: &RequestQuery) -> bool {
    if let Some(id) = query.id {
        if request.id != id {
            return false;
        }
    }
    if let Some(kind) = query.kind {
        if request.kind != kind {
            return false;
        }
    }
    if let Some(src) = query.src {
        if request.src != src {
            return false;
        }
    }
    if let Some(dst) = query.dst {
        if request.dst != dst {
            return false;
        }
    }
    true
}

#[async_trait]
impl Store for MemoryStore {
    async fn new_account_id(&self) -> Result<AccountId> {
        let inner = self.inner.lock();
        let max = inner.accounts.keys().map(|id| id.0).max().unwrap_or(0);
        Ok(AccountId(max + 1))
    }

    async fn get_account(&self, query: &AccountQuery) -> Result<Option<Account>> {
        let inner = self.inner.lock();
        Ok(inner
            .accounts
            .values()
            .find(|account| account_matches(account, query))
            .cloned())
    }

    async fn insert_account(&self, account: Account) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.accounts.insert(account.id, account);
        Ok(())
    }

    async fn set_fcm_token(&self, account_id: AccountId, token: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(account) = inner.accounts.get_mut(&account_id) {
            account.fcm_token = if token.is_empty() {
                None
            } else {
                Some(token.to_string())
            };
        }
        Ok(())
    }

    async fn add_request(&self, request: RequestRecord) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.requests.push(request);
        Ok(())
    }

    async fn delete_request(&self, query: &RequestQuery) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.requests.retain(|request| !request_matches(request, query));
        Ok(())
    }

    async fn get_request(&self, query: &RequestQuery) -> Result<Option<RequestRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .requests
            .iter()
            .find(|request| request_matches(request, query))
            .cloned())
    }

    async fn get_requests(&self, query: &RequestQuery) -> Result<Vec<RequestRecord>> {
        let inner = self.inner.lock();
        Ok(inner
            .requests
            .iter()
            .filter(|request| request_matches(request, query))
            .take(50)
            .cloned()
            .collect())
    }

    async fn request_pending(&self, query: &RequestQuery) -> Result<bool> {
        let inner = self.inner.lock();
        Ok(inner
            .requests
            .iter()
            .filter(|request| request_matches(request, query))
            .count()
            == 1)
    }

    async fn get_contacts(&self, query: &AccountQuery) -> Result<Vec<Account>> {
        let inner = self.inner.lock();
        Ok(inner
            .accounts
            .values()
            .filter(|account| account_matches(account, query))
            .take(50)
            .cloned()
            .collect())
    }

    async fn get_inbox(&self, account_id: AccountId) -> Result<Vec<InboxEntry>> {
        let inner = self.inner.lock();
        let mut by_src: HashMap<AccountId, Vec<_>> = HashMap::new();
        for request in &inner.requests {
            if request.kind == RequestKind::Push && request.dst == account_id {
                by_src.entry(request.src).or_default().push(request.id);
            }
        }
        Ok(by_src
            .into_iter()
            .map(|(contact_id, request_ids)| InboxEntry {
                contact_id,
                request_ids,
            })
            .collect())
    }

    async fn num_contact_requests(&self, account_id: AccountId) -> Result<u32> {
        let inner = self.inner.lock();
        Ok(inner
            .requests
            .iter()
            .filter(|request| request.dst == account_id && request.kind == RequestKind::AddContact)
            .count() as u32)
    }

    async fn num_push_requests(&self, account_id: AccountId) -> Result<u32> {
        let inner = self.inner.lock();
        Ok(inner
            .requests
            .iter()
            .filter(|request| request.dst == account_id && request.kind == RequestKind::Push)
            .count() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestPayload;

    fn account(id: u32, name: &str) -> Account {
        Account {
            id: AccountId(id),
            name: name.to_string(),
            phone: None,
            find_by_name: true,
            find_by_phone: false,
            verifier: [0u8; 32],
            salt: [0u8; 32],
            fcm_token: None,
        }
    }

    #[tokio::test]
    async fn new_account_id_starts_at_one() {
        let store = MemoryStore::new();
        assert_eq!(store.new_account_id().await.unwrap(), AccountId(1));
        store.insert_account(account(1, "alice")).await.unwrap();
        assert_eq!(store.new_account_id().await.unwrap(), AccountId(2));
    }

    #[tokio::test]
    async fn get_account_matches_case_insensitive_name() {
        let store = MemoryStore::new();
        store.insert_account(account(1, "Alice")).await.unwrap();

        let found = store
            .get_account(&AccountQuery {
                name: Some("alice".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(found.is_some());
    }

    #[tokio::test]
    async fn inbox_groups_push_requests_by_sender() {
        let store = MemoryStore::new();
        store
            .add_request(RequestRecord {
                id: 1.into(),
                kind: RequestKind::Push,
                src: AccountId(1),
                dst: AccountId(3),
                time: 0,
                ttl: 0,
                payload: RequestPayload::default(),
            })
            .await
            .unwrap();

        let inbox = store.get_inbox(AccountId(3)).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].contact_id, AccountId(1));
        assert_eq!(inbox[0].request_ids, vec![1.into()]);
    }

    #[tokio::test]
    async fn dispatch_deletes_matching_request() {
        let store = MemoryStore::new();
        store
            .add_request(RequestRecord {
                id: 7.into(),
                kind: RequestKind::Push,
                src: AccountId(1),
                dst: AccountId(2),
                time: 0,
                ttl: 0,
                payload: RequestPayload::default(),
            })
            .await
            .unwrap();

        store
            .delete_request(&RequestQuery {
                id: Some(7.into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(store
            .get_request(&RequestQuery {
                id: Some(7.into()),
                ..Default::default()
            })
            .await
            .unwrap()
            .is_none());
    }
}
