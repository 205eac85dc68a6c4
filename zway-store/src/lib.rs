//! The persistence layer: the `Store` trait abstracting the document
//! database, an in-memory reference implementation, and the bounded
//! connection-pool gateway every other crate persists through (`spec.md`
//! §4.2, component C2).

pub mod memory;
pub mod pool;
pub mod store;
pub mod types;

pub use memory::MemoryStore;
pub use pool::{StoreGateway, DEFAULT_POOL_SIZE};
pub use store::{compare_phone, Store};
pub use types::{Account, AccountQuery, InboxEntry, RequestKind, RequestPayload, RequestQuery, RequestRecord};
