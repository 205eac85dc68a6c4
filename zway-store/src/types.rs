//! Persisted document shapes (`spec.md` §3). These are plain Rust structs
//! with `serde` derives rather than a BSON/UBJ conversion layer — unlike the
//! original C++ relay, there is exactly one data shape here, not a wire
//! shape and a separate database shape, so no conversion glue is needed
//! (see `SPEC_FULL.md` Part C.6).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zway_proto::{AccountId, RequestId};

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub phone: Option<String>,
    pub find_by_name: bool,
    pub find_by_phone: bool,
    /// SHA-256(password ∥ salt).
    pub verifier: [u8; 32],
    pub salt: [u8; 32],
    /// Latest FCM push endpoint registered by the user, if any.
    pub fcm_token: Option<String>,
}

/// The kind of a persisted or in-flight request. Numeric values are part of
/// the wire contract (`spec.md` §4.5 / §6) and double as the persisted
/// `type` field of a stored `requests` document.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RequestKind {
    CreateAccount = 1000,
    Login = 1100,
    Logout = 1200,
    Config = 2000,
    FindContact = 3000,
    AddContact = 3100,
    CreateAddCode = 3200,
    AcceptContact = 3300,
    RejectContact = 3400,
    ContactStatus = 3500,
    Push = 4100,
    Dispatch = 5000,
}

impl RequestKind {
    pub fn from_code(code: u32) -> Option<RequestKind> {
        Some(match code {
            1000 => RequestKind::CreateAccount,
            1100 => RequestKind::Login,
            1200 => RequestKind::Logout,
            2000 => RequestKind::Config,
            3000 => RequestKind::FindContact,
            3100 => RequestKind::AddContact,
            3200 => RequestKind::CreateAddCode,
            3300 => RequestKind::AcceptContact,
            3400 => RequestKind::RejectContact,
            3500 => RequestKind::ContactStatus,
            4100 => RequestKind::Push,
            5000 => RequestKind::Dispatch,
            _ => return None,
        })
    }

    pub fn code(self) -> u32 {
        self as u32
    }

    /// Whether this kind is ever persisted as an asynchronous delivery
    /// (`spec.md` §3 "Request"). `Dispatch` is the acknowledgement that
    /// deletes a persisted request, not one itself; the pre-auth/session
    /// kinds are never persisted.
    pub fn is_deliverable(self) -> bool {
        matches!(
            self,
            RequestKind::AddContact
                | RequestKind::AcceptContact
                | RequestKind::RejectContact
                | RequestKind::Push
        )
    }
}

/// A persisted, asynchronously-delivered request (`spec.md` §3). Type
/// specific payload fields are modeled as a single flexible bag rather than
/// one struct per kind, mirroring how the original stores a single BSON
/// document shape regardless of `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: RequestId,
    pub kind: RequestKind,
    pub src: AccountId,
    pub dst: AccountId,
    pub time: u64,
    /// Reserved for future expiry; not yet enforced (`spec.md` §3).
    pub ttl: u64,
    pub payload: RequestPayload,
}

/// Type-specific payload carried by a persisted request. Fields line up
/// with `spec.md` §3's list: `addCode`, `name`, `phone`, `publicKey`,
/// `contactRequestId`, `dispatchType`, `data`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub add_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_request_id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispatch_type: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A query filter used by `getAccount`/`getRequest`/`getRequests`/`getContacts`.
/// Real document-database queries are arbitrarily expressive; the relay
/// only ever needs these few shapes, so the filter is a closed struct rather
/// than an opaque query document.
#[derive(Debug, Clone, Default)]
pub struct AccountQuery {
    pub id: Option<AccountId>,
    pub name: Option<String>,
    pub name_substring: Option<String>,
    pub phone: Option<String>,
    pub exclude_id: Option<AccountId>,
    pub require_find_by_name: bool,
    pub require_find_by_phone: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RequestQuery {
    pub id: Option<RequestId>,
    pub kind: Option<RequestKind>,
    pub src: Option<AccountId>,
    pub dst: Option<AccountId>,
}

/// Summary row returned by `getInbox`: the pending `Push` request ids
/// addressed to an account, grouped by sender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxEntry {
    pub contact_id: AccountId,
    pub request_ids: Vec<RequestId>,
}
