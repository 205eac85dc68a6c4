//! Identifier newtypes used across the relay. Kept as thin `u32` wrappers
//! rather than bare integers so account, request and stream ids can't be
//! swapped for one another by accident at a call site.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl From<u32> for $name {
            #[inline]
            fn from(value: u32) -> Self {
                $name(value)
            }
        }

        impl From<$name> for u32 {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(AccountId);
id_type!(RequestId);
id_type!(StreamId);

impl AccountId {
    /// `0` is used by the wire protocol to mean "broadcast" or "unset" on a
    /// request's `src`/`dst` field.
    pub const BROADCAST: AccountId = AccountId(0);

    #[inline]
    pub fn is_broadcast(self) -> bool {
        self.0 == 0
    }
}
