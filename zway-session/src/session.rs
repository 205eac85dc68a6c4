//! The per-connection session state machine (`spec.md` §4.6, component
//! C6): one per TLS connection, owning its socket halves, heartbeat timer,
//! outbound queue, contacts map and pending table.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::Mutex;
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use zway_net::packet::{read_packet, write_packet, Packet, PacketHead, PacketKind, StreamType};
use zway_net::stream_io::{ReceiverProgress, StreamReceiver, StreamSender};
use zway_proto::logging::{self, Logger};
use zway_proto::{AccountId, Error, RequestId, Result};

use crate::context::SessionContext;
use crate::contact::{ContactConfig, SessionConfig};
use crate::engine;
use crate::pending::{await_response, PendingResponse, PendingTable};
use crate::registry::next_slot_id;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connected,
    LoggedIn,
}

/// Every request handler and the send loop reaches for this. Cloneable
/// cheaply; the expensive parts are all behind `Arc`/mutex already.
pub struct Session {
    slot_id: u64,
    account_id: Mutex<AccountId>,
    state: Mutex<SessionState>,
    remote_host: String,
    pub(crate) contacts: Mutex<HashMap<AccountId, ContactConfig>>,
    pub(crate) config: Mutex<SessionConfig>,
    pub(crate) pending: PendingTable,
    stream_receivers: Mutex<HashMap<zway_proto::StreamId, StreamReceiver>>,
    outbound: mpsc::UnboundedSender<Packet>,
    next_packet_id: AtomicU32,
    packets_sent: AtomicU64,
    packets_recv: AtomicU64,
    heartbeat: Mutex<tokio::time::Instant>,
    pub(crate) ctx: Arc<SessionContext>,
    pub(crate) log: Logger,
}

impl Session {
    /// A session not yet attached to a socket, registered in the registry
    /// under a random placeholder id (`spec.md` §4.6: "inserted ... under a
    /// random 32-bit placeholder id").
    pub fn new_placeholder(ctx: Arc<SessionContext>, remote_host: String) -> (Arc<Session>, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let placeholder = AccountId(rand::thread_rng().next_u32().max(1));
        let slot_id = next_slot_id();

        let log = ctx.log.new(logging::o!("session" => slot_id, "remote" => remote_host.clone()));

        let session = Arc::new(Session {
            slot_id,
            account_id: Mutex::new(placeholder),
            state: Mutex::new(SessionState::Connected),
            remote_host,
            contacts: Mutex::new(HashMap::new()),
            config: Mutex::new(SessionConfig::default()),
            pending: PendingTable::new(),
            stream_receivers: Mutex::new(HashMap::new()),
            outbound: tx,
            next_packet_id: AtomicU32::new(1),
            packets_sent: AtomicU64::new(0),
            packets_recv: AtomicU64::new(0),
            heartbeat: Mutex::new(tokio::time::Instant::now()),
            ctx,
            log,
        });

        (session, rx)
    }

    pub fn slot_id(&self) -> u64 {
        self.slot_id
    }

    pub fn account_id(&self) -> AccountId {
        *self.account_id.lock()
    }

    pub fn remote_host(&self) -> &str {
        &self.remote_host
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent.load(Ordering::Relaxed)
    }

    pub fn packets_recv(&self) -> u64 {
        self.packets_recv.load(Ordering::Relaxed)
    }

    /// Re-file this session from its placeholder id to its authenticated
    /// account id (`Login`, `spec.md` §4.5/§4.6).
    pub fn promote(self: &Arc<Self>, account_id: AccountId) {
        let old = *self.account_id.lock();
        self.ctx.registry.remove(old, self.slot_id);
        *self.account_id.lock() = account_id;
        *self.state.lock() = SessionState::LoggedIn;
        self.ctx.registry.append(account_id, self.clone());
    }

    /// `Logout` (`spec.md` §4.5): demote to `Connected`, stay filed under
    /// the same account id — the client may still issue pre-auth-free
    /// requests on the same connection.
    pub fn demote(&self) {
        *self.state.lock() = SessionState::Connected;
    }

    pub fn effective_notify_status(&self) -> u32 {
        match self.state() {
            SessionState::LoggedIn => 1,
            _ => 0,
        }
    }

    fn next_packet_id(&self) -> u32 {
        self.next_packet_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn touch_heartbeat(&self) {
        *self.heartbeat.lock() = tokio::time::Instant::now();
    }

    pub fn heartbeat_age(&self) -> Duration {
        self.heartbeat.lock().elapsed()
    }

    /// Enqueue a packet for the send loop. Serialization is provided by the
    /// channel itself — only the writer task ever drains it, so there is
    /// never more than one write in flight, matching the `sending` flag
    /// `spec.md` §4.6 describes without needing a separate flag.
    fn enqueue(&self, packet: Packet) -> Result<()> {
        self.outbound.send(packet).map_err(|_| Error::Disconnected)
    }

    fn response_packet(&self, body: Vec<u8>) -> Packet {
        Packet::new(
            PacketHead {
                packet_id: self.next_packet_id(),
                kind: PacketKind::Response,
                stream_id: zway_proto::StreamId(0),
                stream_type: StreamType::Undefined,
                parts: 0,
                part: 0,
                body_size: body.len() as u32,
                flags: 0,
            },
            Bytes::from(body),
        )
    }

    pub fn send_response(&self, response: &zway_proto::ResponseHead) -> Result<()> {
        let body = zway_proto::encode_response(response)?;
        self.enqueue(self.response_packet(body))
    }

    fn request_packet(&self, body: Vec<u8>) -> Packet {
        Packet::new(
            PacketHead {
                packet_id: self.next_packet_id(),
                kind: PacketKind::Request,
                stream_id: zway_proto::StreamId(0),
                stream_type: StreamType::Undefined,
                parts: 0,
                part: 0,
                body_size: body.len() as u32,
                flags: 0,
            },
            Bytes::from(body),
        )
    }

    fn encode_outbound_request(request_id: RequestId, kind: zway_store::RequestKind, fields: serde_json::Value) -> Result<Vec<u8>> {
        let mut body = match fields {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        body.insert("requestId".to_string(), serde_json::json!(request_id));
        body.insert("requestType".to_string(), serde_json::json!(kind.code()));
        serde_json::to_vec(&serde_json::Value::Object(body)).map_err(|e| Error::MalformedRequestBody(e.to_string()))
    }

    /// Post a new outbound request to this session's client, registering
    /// it in the pending table (`spec.md` §4.5 "outgoing request
    /// correlation"). Returns a receiver the caller awaits for the reply.
    pub fn post_request(
        &self,
        kind: zway_store::RequestKind,
        fields: serde_json::Value,
    ) -> Result<tokio::sync::oneshot::Receiver<PendingResponse>> {
        let request_id = RequestId(rand::thread_rng().next_u32().max(1));
        let rx = self.pending.register(request_id, kind);
        let bytes = Self::encode_outbound_request(request_id, kind, fields)?;
        self.enqueue(self.request_packet(bytes))?;
        Ok(rx)
    }

    /// Fire-and-forget variant used by status broadcast (`spec.md` §4.8):
    /// no pending-table entry, no response expected.
    pub fn post_notification(&self, kind: zway_store::RequestKind, fields: serde_json::Value) -> Result<()> {
        let request_id = RequestId(rand::thread_rng().next_u32().max(1));
        let bytes = Self::encode_outbound_request(request_id, kind, fields)?;
        self.enqueue(self.request_packet(bytes))
    }

    /// Close the session: mark disconnected, drop from the registry
    /// (idempotent — `spec.md` §4.6).
    pub fn close(&self) {
        let mut state = self.state.lock();
        if *state == SessionState::Disconnected {
            return;
        }
        *state = SessionState::Disconnected;
        drop(state);

        self.ctx.registry.remove(self.account_id(), self.slot_id);
        logging::debug!(self.log, "session closed");
    }

    /// Run the receive loop until the peer disconnects or a transport
    /// error occurs (`spec.md` §4.6). Owns the reader half exclusively.
    pub async fn receive_loop<R: AsyncRead + Unpin>(self: &Arc<Self>, mut reader: R) {
        loop {
            let packet = match read_packet(&mut reader).await {
                Ok(packet) => packet,
                Err(err) => {
                    if err.is_silent() {
                        logging::debug!(self.log, "receive loop ending"; "reason" => err.to_string());
                    } else {
                        logging::warn!(self.log, "receive loop error"; "error" => err.to_string());
                    }
                    break;
                }
            };

            self.touch_heartbeat();
            self.packets_recv.fetch_add(1, Ordering::Relaxed);

            if let Err(err) = self.handle_packet(packet).await {
                logging::warn!(self.log, "packet handling error"; "error" => err.to_string());
                if err.closes_session() {
                    break;
                }
            }
        }

        self.close();
    }

    async fn handle_packet(self: &Arc<Self>, packet: Packet) -> Result<()> {
        match packet.head.kind {
            PacketKind::StreamPart => self.handle_stream_part(packet).await,
            PacketKind::Request => engine::dispatch(self, packet.body).await,
            PacketKind::Response => {
                let head: serde_json::Value = serde_json::from_slice(&packet.body).map_err(|e| Error::MalformedRequestBody(e.to_string()))?;
                let request_id = head
                    .get("requestId")
                    .and_then(|v| v.as_u64())
                    .map(|v| RequestId(v as u32))
                    .ok_or(Error::MalformedRequestBody("missing requestId".to_string()))?;
                let status = head.get("status").and_then(|v| v.as_u64()).unwrap_or(0) as u32;

                self.pending.resolve(request_id, PendingResponse { status, fields: head });
                Ok(())
            }
        }
    }

    async fn handle_stream_part(self: &Arc<Self>, packet: Packet) -> Result<()> {
        let stream_id = packet.head.stream_id;

        // accept_part is async, so the receiver is taken out of the map for
        // the duration of the call rather than held under the sync lock.
        let mut receiver = match self.stream_receivers.lock().remove(&stream_id) {
            Some(receiver) => receiver,
            None => self.create_stream_receiver(&packet.head).await?,
        };

        let progress = receiver.accept_part(packet.head.part, packet.body).await?;

        match progress {
            ReceiverProgress::Pending => {
                self.stream_receivers.lock().insert(stream_id, receiver);
            }
            ReceiverProgress::Completed(body) => {
                self.on_stream_completed(stream_id, packet.head.stream_type, body).await?;
            }
        }

        Ok(())
    }

    async fn create_stream_receiver(&self, head: &PacketHead) -> Result<StreamReceiver> {
        match head.stream_type {
            StreamType::Resource => {
                let buffer = self.ctx.stream_pool.create_file(head.stream_id).await?;
                Ok(StreamReceiver::for_resource(head.stream_id, head.parts, buffer))
            }
            StreamType::Request | StreamType::Undefined => Ok(StreamReceiver::for_request(head.stream_id, head.parts)),
        }
    }

    /// The receiver already seals the backing buffer when the last part
    /// lands (`zway_net::stream_io`); what's left here is making the
    /// resource reclaimable after this session disconnects, by leaving a
    /// marker behind in the store (`spec.md` §4.4: "inserts a Dispatch-type
    /// request into the store so the stream can be reclaimed by a future
    /// session"). Self-addressed: the uploader is the only party who knows
    /// which delivery this attachment belongs to, and acknowledges it with
    /// its own `Dispatch` once consumers have fetched it.
    async fn on_stream_completed(self: &Arc<Self>, stream_id: zway_proto::StreamId, stream_type: StreamType, body: Option<Vec<u8>>) -> Result<()> {
        match stream_type {
            StreamType::Resource => {
                let self_id = self.account_id();
                self.ctx
                    .store
                    .add_request(zway_store::RequestRecord {
                        id: RequestId(stream_id.0),
                        kind: zway_store::RequestKind::Dispatch,
                        src: self_id,
                        dst: self_id,
                        time: zway_proto::time::timestamp_secs(),
                        ttl: 0,
                        payload: zway_store::RequestPayload {
                            dispatch_type: Some(zway_store::RequestKind::Push.code()),
                            ..Default::default()
                        },
                    })
                    .await?;
                logging::debug!(self.log, "resource stream completed"; "stream_id" => stream_id.0);
                Ok(())
            }
            StreamType::Request | StreamType::Undefined => {
                let body = body.unwrap_or_default();
                engine::dispatch(self, Bytes::from(body)).await
            }
        }
    }

    /// Drive the single-writer send loop (`spec.md` §4.6). Owns the writer
    /// half exclusively; terminates when the outbound channel closes
    /// (every `Arc<Session>` dropped) or a write fails.
    pub async fn send_loop<W: AsyncWrite + Unpin>(self: &Arc<Self>, mut writer: W, mut outbound: mpsc::UnboundedReceiver<Packet>) {
        loop {
            let packet = outbound.recv().await;
            let packet = match packet {
                Some(p) => p,
                None => break,
            };

            if let Err(err) = write_packet(&mut writer, &packet).await {
                if !err.is_silent() {
                    logging::warn!(self.log, "send loop write failed"; "error" => err.to_string());
                }
                break;
            }

            self.packets_sent.fetch_add(1, Ordering::Relaxed);
            self.touch_heartbeat();
        }
    }

    /// Progress this session's active stream senders by one tick (called
    /// from the server's 2s ticker, `spec.md` §4.7).
    pub async fn pump_stream_sender(self: &Arc<Self>, sender: &mut StreamSender) -> Result<bool> {
        let packet_id = self.next_packet_id();
        match sender.next_packet(packet_id).await? {
            Some(packet) => {
                self.enqueue(packet)?;
                Ok(sender.is_done())
            }
            None => Ok(false),
        }
    }

    /// Await a pending outbound request's reply (used by
    /// `processUserRequests`).
    pub async fn await_pending(rx: tokio::sync::oneshot::Receiver<PendingResponse>) -> Result<PendingResponse> {
        await_response(rx).await
    }
}
