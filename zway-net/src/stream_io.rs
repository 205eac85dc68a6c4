//! The receiving and sending halves of a multi-part stream (`spec.md`
//! §4.4, component C4). A `Request` stream reassembles into one contiguous
//! byte buffer handed to the session's request engine; a `Resource` stream
//! writes straight into a pool-backed [`StreamBuffer`] so a sender can
//! begin draining it before the receiver has finished (the transfer is
//! still in flight both ways at once).

use std::sync::Arc;

use bytes::Bytes;
use zway_proto::{Error, Result, StreamId};

use crate::packet::{Packet, PacketHead, PacketKind, StreamType, MAX_PACKET_BODY};
use crate::stream_pool::StreamBuffer;

/// What a [`StreamReceiver`] reassembles into.
pub enum ReceiverSink {
    /// Held in memory; handed back whole once the last part lands.
    Request(Vec<u8>),
    /// Backed by the shared pool buffer; readable by a sender as it fills.
    Resource(Arc<StreamBuffer>),
}

/// Outcome of feeding one part into a [`StreamReceiver`].
pub enum ReceiverProgress {
    /// More parts expected.
    Pending,
    /// All parts received. Carries the reassembled body for a `Request`
    /// stream; `None` for a `Resource` stream, whose bytes already live in
    /// the pool buffer.
    Completed(Option<Vec<u8>>),
}

/// Reassembles an incoming multi-part stream, tracking which part index is
/// expected next.
pub struct StreamReceiver {
    id: StreamId,
    parts_total: u32,
    next_part: u32,
    sink: ReceiverSink,
}

impl StreamReceiver {
    pub fn for_request(id: StreamId, parts_total: u32) -> StreamReceiver {
        StreamReceiver {
            id,
            parts_total,
            next_part: 0,
            sink: ReceiverSink::Request(Vec::new()),
        }
    }

    pub fn for_resource(id: StreamId, parts_total: u32, buffer: Arc<StreamBuffer>) -> StreamReceiver {
        StreamReceiver {
            id,
            parts_total,
            next_part: 0,
            sink: ReceiverSink::Resource(buffer),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Feed one stream-part packet's body in. Parts must arrive in order;
    /// an out-of-order part is a protocol violation rather than silently
    /// discarded, since the sender never reorders.
    pub async fn accept_part(&mut self, part: u32, body: Bytes) -> Result<ReceiverProgress> {
        if part != self.next_part || part >= self.parts_total {
            return Err(Error::MalformedRequestBody(format!(
                "stream {} expected part {}, got {}",
                self.id, self.next_part, part
            )));
        }

        let offset = part as u64 * MAX_PACKET_BODY as u64;
        let is_last = part + 1 == self.parts_total;

        match &mut self.sink {
            ReceiverSink::Request(buf) => {
                buf.extend_from_slice(&body);
            }
            ReceiverSink::Resource(buffer) => {
                buffer.write_at(offset, &body).await?;
                if is_last {
                    buffer.seal(offset + body.len() as u64);
                }
            }
        }

        self.next_part += 1;

        if is_last {
            let completed = match &mut self.sink {
                ReceiverSink::Request(buf) => Some(std::mem::take(buf)),
                ReceiverSink::Resource(_) => None,
            };
            Ok(ReceiverProgress::Completed(completed))
        } else {
            Ok(ReceiverProgress::Pending)
        }
    }
}

enum SenderSource {
    Memory(Bytes),
    Buffer(Arc<StreamBuffer>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum SenderState {
    Sending,
    Completed,
    Cancelled,
}

/// Drains a completed in-memory body or a still-filling pool buffer out as
/// a sequence of stream-part packets.
pub struct StreamSender {
    id: StreamId,
    stream_type: StreamType,
    parts_total: u32,
    next_part: u32,
    source: SenderSource,
    state: SenderState,
}

impl StreamSender {
    pub fn for_request(id: StreamId, body: Bytes, parts_total: u32) -> StreamSender {
        StreamSender {
            id,
            stream_type: StreamType::Request,
            parts_total,
            next_part: 0,
            source: SenderSource::Memory(body),
            state: SenderState::Sending,
        }
    }

    pub fn for_resource(id: StreamId, buffer: Arc<StreamBuffer>, parts_total: u32) -> StreamSender {
        StreamSender {
            id,
            stream_type: StreamType::Resource,
            parts_total,
            next_part: 0,
            source: SenderSource::Buffer(buffer),
            state: SenderState::Sending,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, SenderState::Completed | SenderState::Cancelled)
    }

    pub fn cancel(&mut self) {
        self.state = SenderState::Cancelled;
    }

    /// Produce the next stream-part packet. Returns `Ok(None)` when a
    /// resource stream's buffer hasn't filled far enough yet to emit the
    /// next chunk — the session's send loop simply tries again next tick,
    /// never treating this as an error.
    pub async fn next_packet(&mut self, packet_id: u32) -> Result<Option<Packet>> {
        if self.is_done() {
            return Ok(None);
        }

        let part = self.next_part;
        let offset = part as u64 * MAX_PACKET_BODY as u64;

        let chunk = match &self.source {
            SenderSource::Memory(body) => {
                let start = offset as usize;
                let end = (start + MAX_PACKET_BODY).min(body.len());
                body.slice(start..end)
            }
            SenderSource::Buffer(buffer) => {
                let want = if part + 1 == self.parts_total {
                    match buffer.total_size() {
                        Some(total) => (total - offset).max(0) as usize,
                        None => MAX_PACKET_BODY,
                    }
                } else {
                    MAX_PACKET_BODY
                };

                match buffer.read_range(offset, want).await? {
                    Some(bytes) => Bytes::from(bytes),
                    None => return Ok(None),
                }
            }
        };

        let is_last = part + 1 == self.parts_total;
        let head = PacketHead {
            packet_id,
            kind: PacketKind::StreamPart,
            stream_id: self.id,
            stream_type: self.stream_type,
            parts: self.parts_total,
            part,
            body_size: chunk.len() as u32,
            flags: 0,
        };

        self.next_part += 1;
        if is_last {
            self.state = SenderState::Completed;
        }

        Ok(Some(Packet::new(head, chunk)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_pool::{parts_for_size, StreamPool};
    use zway_proto::logging;

    #[tokio::test]
    async fn request_receiver_reassembles_in_order_parts() {
        let mut receiver = StreamReceiver::for_request(StreamId(1), 2);

        let progress = receiver.accept_part(0, Bytes::from_static(b"hel")).await.unwrap();
        assert!(matches!(progress, ReceiverProgress::Pending));

        let progress = receiver.accept_part(1, Bytes::from_static(b"lo")).await.unwrap();
        match progress {
            ReceiverProgress::Completed(Some(body)) => assert_eq!(body, b"hello"),
            _ => panic!("expected completion"),
        }
    }

    #[tokio::test]
    async fn out_of_order_part_is_rejected() {
        let mut receiver = StreamReceiver::for_request(StreamId(1), 2);
        let result = receiver.accept_part(1, Bytes::from_static(b"oops")).await;
        assert!(matches!(result, Err(Error::MalformedRequestBody(_))));
    }

    #[tokio::test]
    async fn request_sender_emits_one_part_and_completes() {
        let body = Bytes::from_static(b"payload");
        let mut sender = StreamSender::for_request(StreamId(2), body.clone(), 1);

        let packet = sender.next_packet(1).await.unwrap().unwrap();
        assert_eq!(packet.body, body);
        assert!(sender.is_done());
        assert!(sender.next_packet(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resource_sender_stalls_until_buffer_catches_up() {
        let pool = StreamPool::new("/tmp/zway-test-stream-io", &logging::discard());
        let buffer = pool.create_memory(StreamId(3)).await.unwrap();

        let parts = parts_for_size(MAX_PACKET_BODY as u64 + 10);
        let mut sender = StreamSender::for_resource(StreamId(3), buffer.clone(), parts);

        let first = sender.next_packet(1).await.unwrap();
        assert!(first.is_some());

        // Second part not yet written: sender must stall, not error.
        let stalled = sender.next_packet(2).await.unwrap();
        assert!(stalled.is_none());

        buffer.write_at(MAX_PACKET_BODY as u64, &[7u8; 10]).await.unwrap();
        buffer.seal(MAX_PACKET_BODY as u64 + 10);

        let second = sender.next_packet(2).await.unwrap().unwrap();
        assert_eq!(second.body.len(), 10);
        assert!(sender.is_done());
    }
}
