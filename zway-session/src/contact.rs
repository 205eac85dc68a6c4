//! Per-session state that isn't the request/response machinery: the
//! contacts map and the client-pushed config (`spec.md` §3 "Session").

use serde::{Deserialize, Serialize};
use zway_proto::AccountId;

/// A contact's per-session settings, keyed by contact account id in
/// [`crate::session::Session::contacts`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactConfig {
    #[serde(rename = "contactId")]
    pub contact_id: AccountId,
    /// Whether this session broadcasts its own status changes to this
    /// contact (`spec.md` §4.8).
    #[serde(rename = "notifyStatus", default)]
    pub notify_status: bool,
}

/// Client-pushed preferences, replaced wholesale by the `Config` request
/// (`spec.md` §4.5).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(rename = "fcmToken", default, skip_serializing_if = "Option::is_none")]
    pub fcm_token: Option<String>,
}
