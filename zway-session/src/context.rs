//! Shared, injected dependencies every session needs: the store gateway
//! (C2), the stream buffer pool (C3), the session registry, and the push
//! notifier (C8). Replaces the teacher's/original's global singletons with
//! an explicit handle threaded through constructors (`spec.md` §9).

use std::sync::Arc;

use zway_net::StreamPool;
use zway_proto::logging::Logger;
use zway_push::PushNotifier;
use zway_store::StoreGateway;

use crate::registry::SessionRegistry;
use crate::senders::StreamSenderList;

pub struct SessionContext {
    pub store: StoreGateway,
    pub stream_pool: Arc<StreamPool>,
    pub stream_senders: StreamSenderList,
    pub registry: Arc<SessionRegistry>,
    pub push: Arc<dyn PushNotifier>,
    pub heartbeat_timeout_secs: u64,
    pub heartbeat_disconnect: bool,
    pub stream_idle_timeout_secs: u64,
    pub log: Logger,
}

#[cfg(any(test, feature = "test-support"))]
impl SessionContext {
    /// An in-memory-backed context for unit/integration tests.
    pub fn for_tests() -> Arc<SessionContext> {
        use zway_proto::logging;
        use zway_store::MemoryStore;

        Arc::new(SessionContext {
            store: StoreGateway::new(MemoryStore::new(), zway_store::DEFAULT_POOL_SIZE, &logging::discard()),
            stream_pool: Arc::new(StreamPool::new("/tmp/zway-test-streams", &logging::discard())),
            stream_senders: StreamSenderList::new(),
            registry: Arc::new(SessionRegistry::new()),
            push: Arc::new(zway_push::RecordingNotifier::new()),
            heartbeat_timeout_secs: 40,
            heartbeat_disconnect: false,
            stream_idle_timeout_secs: 60,
            log: logging::discard(),
        })
    }
}
