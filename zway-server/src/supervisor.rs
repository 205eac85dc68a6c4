//! The server supervisor (`spec.md` §4.7, component C7): owns the TLS
//! acceptor and the listening socket, drives the accept loop, and runs the
//! 2-second ticker that progresses stream senders and reaps idle stream
//! buffers. The session registry, stream pool and active stream-sender list
//! it otherwise coordinates all live on the shared [`SessionContext`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_rustls::TlsAcceptor;
use zway_proto::logging::{self, Logger};
use zway_proto::time;
use zway_session::{Session, SessionContext};

const TICK_PERIOD: Duration = Duration::from_secs(2);
const PAUSED_POLL_PERIOD: Duration = Duration::from_millis(100);

pub struct Supervisor {
    ctx: Arc<SessionContext>,
    acceptor: TlsAcceptor,
    addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    paused: AtomicBool,
    log: Logger,
}

impl Supervisor {
    pub async fn bind(ctx: Arc<SessionContext>, acceptor: TlsAcceptor, addr: SocketAddr, log: Logger) -> std::io::Result<Supervisor> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Supervisor {
            ctx,
            acceptor,
            addr,
            listener: Mutex::new(Some(listener)),
            paused: AtomicBool::new(false),
            log,
        })
    }

    /// Accept loop (`spec.md` §4.7: `acceptOne → onAccepted → acceptOne`).
    /// While paused the socket is closed outright rather than merely
    /// ignored, so the OS stops queuing connections at all.
    pub async fn run_accept_loop(self: Arc<Self>) {
        loop {
            let accepted = {
                let listener = self.listener.lock().await;
                match listener.as_ref() {
                    Some(listener) => listener.accept().await,
                    None => {
                        drop(listener);
                        tokio::time::sleep(PAUSED_POLL_PERIOD).await;
                        continue;
                    }
                }
            };

            let (socket, remote) = match accepted {
                Ok(pair) => pair,
                Err(err) => {
                    logging::warn!(self.log, "accept failed"; "error" => err.to_string());
                    continue;
                }
            };

            let supervisor = self.clone();
            tokio::spawn(async move { supervisor.start_session(socket, remote).await });
        }
    }

    async fn start_session(self: Arc<Self>, socket: TcpStream, remote: SocketAddr) {
        let tls_stream = match self.acceptor.accept(socket).await {
            Ok(stream) => stream,
            Err(err) => {
                logging::warn!(self.log, "tls handshake failed"; "remote" => remote.to_string(), "error" => err.to_string());
                return;
            }
        };

        let (session, outbound_rx) = Session::new_placeholder(self.ctx.clone(), remote.to_string());
        self.ctx.registry.append(session.account_id(), session.clone());

        let (reader, writer) = tokio::io::split(tls_stream);
        let recv_session = session.clone();
        let send_session = session.clone();

        let recv_task = tokio::spawn(async move { recv_session.receive_loop(reader).await });
        let send_task = tokio::spawn(async move { send_session.send_loop(writer, outbound_rx).await });

        // receive_loop already closes (and deregisters) the session once the
        // peer disconnects, but the writer half has no way to learn that on
        // its own short of a failed write — abort it directly rather than
        // leaving a half-closed connection's send loop parked forever.
        let _ = recv_task.await;
        send_task.abort();
        let _ = send_task.await;
    }

    /// Idempotent: pausing an already-paused server is a no-op (`spec.md`
    /// §4.7, the `p` stdin command toggles between these two).
    pub async fn pause(&self) -> bool {
        if self.paused.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.listener.lock().await = None;
        logging::info!(self.log, "accept loop paused");
        true
    }

    pub async fn resume(&self) -> bool {
        if !self.paused.swap(false, Ordering::SeqCst) {
            return false;
        }

        match TcpListener::bind(self.addr).await {
            Ok(listener) => {
                *self.listener.lock().await = Some(listener);
                logging::info!(self.log, "accept loop resumed");
                true
            }
            Err(err) => {
                logging::warn!(self.log, "failed to rebind on resume"; "error" => err.to_string());
                self.paused.store(true, Ordering::SeqCst);
                false
            }
        }
    }

    /// Ticker (`spec.md` §4.7, every 2s): progress active stream senders,
    /// then reap stream buffers idle past the configured timeout.
    pub async fn run_ticker(self: Arc<Self>) {
        let mut interval = tokio::time::interval(TICK_PERIOD);
        loop {
            interval.tick().await;
            self.ctx.stream_senders.tick(&self.log).await;

            let now = time::timestamp_secs();
            let reaped = self.ctx.stream_pool.reap_idle(now, self.ctx.stream_idle_timeout_secs);
            if !reaped.is_empty() {
                logging::debug!(self.log, "reaped idle stream buffers"; "count" => reaped.len());
            }

            self.check_heartbeats();
        }
    }

    /// `spec.md` §4.6: expiry is always logged; forced disconnect is
    /// configurable (`heartbeat_disconnect`, §9) since the reference server
    /// comments it out.
    fn check_heartbeats(&self) {
        let timeout = Duration::from_secs(self.ctx.heartbeat_timeout_secs);
        for session in self.ctx.registry.all_sessions() {
            if session.heartbeat_age() < timeout {
                continue;
            }

            logging::warn!(
                self.log, "session heartbeat expired";
                "session" => session.slot_id(),
                "remote" => session.remote_host(),
                "age_secs" => session.heartbeat_age().as_secs(),
            );

            if self.ctx.heartbeat_disconnect {
                session.close();
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.ctx.registry.session_count()
    }

    /// `r` stdin command (`spec.md` §6): drop every live session.
    pub fn remove_all_sessions(&self) {
        for session in self.ctx.registry.remove_all() {
            session.close();
        }
    }
}
