#![allow(clippy::len_without_is_empty)]

//! Shared types and ambient infrastructure used by every other `zway-*`
//! crate: account/request identifiers, the crate-wide error hierarchy,
//! password hashing, time helpers, and logging bootstrap.

pub mod body;
pub mod error;
pub mod hash;
pub mod ids;
pub mod logging;
pub mod time;

#[macro_export]
macro_rules! choose {
    ($cond: expr => $true_val: expr, $false_val: expr) => {{
        if $cond {
            $true_val
        } else {
            $false_val
        }
    }};
}

pub use body::{decode_request, encode_response, optional_field, required_field, RequestHead, ResponseHead};
pub use error::{Error, Result};
pub use ids::{AccountId, RequestId, StreamId};
