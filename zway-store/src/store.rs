//! The `Store` trait: the document-database abstraction `spec.md` §1
//! treats as an external collaborator ("the underlying document database,
//! treated as an opaque `Store` with the collections described in §6").
//! Every persistence operation in the relay goes through an
//! implementation of this trait — never directly against a driver type —
//! so tests can swap in [`crate::memory::MemoryStore`].

use async_trait::async_trait;
use zway_proto::{AccountId, Result};

use crate::types::{Account, AccountQuery, InboxEntry, RequestQuery, RequestRecord};

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// `max(existing id) + 1`, starting at 1 when the collection is empty.
    /// Not atomic across racing creations — callers serialize through the
    /// gateway's pool permit, which bounds (but does not eliminate) the
    /// race; `spec.md` §9 allows retry-on-conflict as an alternative.
    async fn new_account_id(&self) -> Result<AccountId>;

    async fn get_account(&self, query: &AccountQuery) -> Result<Option<Account>>;

    async fn insert_account(&self, account: Account) -> Result<()>;

    /// Empty string clears the token.
    async fn set_fcm_token(&self, account_id: AccountId, token: &str) -> Result<()>;

    async fn add_request(&self, request: RequestRecord) -> Result<()>;

    async fn delete_request(&self, query: &RequestQuery) -> Result<()>;

    async fn get_request(&self, query: &RequestQuery) -> Result<Option<RequestRecord>>;

    /// Capped at 50 rows, matching `getContacts`.
    async fn get_requests(&self, query: &RequestQuery) -> Result<Vec<RequestRecord>>;

    /// True iff exactly one request matches `query`.
    async fn request_pending(&self, query: &RequestQuery) -> Result<bool>;

    /// Capped at 50 rows.
    async fn get_contacts(&self, query: &AccountQuery) -> Result<Vec<Account>>;

    /// Every `Push`-type request addressed to `account_id`, grouped by `src`.
    async fn get_inbox(&self, account_id: AccountId) -> Result<Vec<InboxEntry>>;

    async fn num_contact_requests(&self, account_id: AccountId) -> Result<u32>;

    async fn num_push_requests(&self, account_id: AccountId) -> Result<u32>;
}

/// Either phone number is a non-empty substring of the other. A pure helper
/// rather than a `Store` method — it never touches persisted state — kept
/// alongside the trait because `spec.md` §4.2 lists it as a Store gateway
/// operation.
#[inline]
pub fn compare_phone(a: &str, b: &str) -> bool {
    !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a))
}
