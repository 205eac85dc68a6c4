//! The server's active stream-sender list (`spec.md` §4.7): resource
//! streams currently being relayed to a destination session, progressed
//! one packet per ticker pass.

use std::sync::Arc;

use parking_lot::Mutex;
use zway_net::StreamSender;
use zway_proto::logging::{self, Logger};

use crate::session::Session;

struct Entry {
    session: Arc<Session>,
    sender: StreamSender,
}

#[derive(Default)]
pub struct StreamSenderList {
    entries: Mutex<Vec<Entry>>,
}

impl StreamSenderList {
    pub fn new() -> StreamSenderList {
        StreamSenderList::default()
    }

    pub fn register(&self, session: Arc<Session>, sender: StreamSender) {
        self.entries.lock().push(Entry { session, sender });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Ticker step 1 (`spec.md` §4.7): ask every active sender's session to
    /// emit its next packet; drop senders that finish or whose session has
    /// gone away. Entries are taken out of the list before any `.await`, so
    /// no lock is ever held across a suspension point.
    pub async fn tick(&self, log: &Logger) {
        let entries = std::mem::take(&mut *self.entries.lock());
        let mut remaining = Vec::with_capacity(entries.len());

        for mut entry in entries {
            match entry.session.pump_stream_sender(&mut entry.sender).await {
                Ok(true) => {}
                Ok(false) => remaining.push(entry),
                Err(err) => {
                    logging::debug!(log, "stream sender progress failed"; "error" => err.to_string());
                }
            }
        }

        *self.entries.lock() = remaining;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use zway_proto::StreamId;

    #[tokio::test]
    async fn completed_sender_is_dropped_after_one_tick() {
        let ctx = crate::context::SessionContext::for_tests();
        let (session, _rx) = Session::new_placeholder(ctx.clone(), "127.0.0.1".to_string());

        let list = StreamSenderList::new();
        let sender = StreamSender::for_request(StreamId(1), Bytes::from_static(b"hi"), 1);
        list.register(session, sender);

        list.tick(&logging::discard()).await;
        assert_eq!(list.len(), 0);
    }
}
