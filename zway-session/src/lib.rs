//! Session state machine, request engine and delivery logic (`spec.md` §4,
//! components C5/C6/C8's wiring). Built on `zway-net` for the wire protocol
//! and stream transfer, and `zway-store` for persistence.

pub mod contact;
pub mod context;
pub mod engine;
pub mod pending;
pub mod registry;
pub mod senders;
pub mod session;
pub mod status;

pub use context::SessionContext;
pub use pending::{PendingResponse, PendingTable};
pub use registry::SessionRegistry;
pub use session::{Session, SessionState};
