//! The per-connection state machine: `Open (unencrypted) → Encrypted`,
//! HTTP/1.1 framing, request dispatch, and event delivery.
//!
//! Each accepted TCP connection gets one [`Connection`] task, spawned by
//! the driver with a handle to the shared accessory graph, identity
//! store, and event bus. Per-connection state (the secure channel, the
//! pairing handshakes in flight, the prepared-write table, the
//! subscription set) is touched only by this task; nothing here is
//! shared across connections.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{Decoder, Encoder as _};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::channel::SecureChannel;
use crate::driver::Shared;
use crate::error::ConnectionError;
use crate::events::{PendingEvents, Topic, Update};
use crate::http::{event_frame, HttpDecoder, Request, Response};

/// An idle connection (no bytes either way) is closed after this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(90 * 60 * 60);

enum Phase {
    Open,
    Encrypted { channel: SecureChannel, client: Uuid },
}

/// Drives one accepted TCP connection end to end.
pub struct Connection {
    peer: SocketAddr,
    shared: Shared,
    phase: Phase,
    http_decoder: HttpDecoder,
    setup_session: crate::pairing::setup::SetupSession,
    verify_session: crate::pairing::verify::VerifySession,
    prepared: crate::handler::prepare::PreparedWrites,
    subscriptions: HashSet<Topic>,
    pending: PendingEvents,
    events_rx: mpsc::UnboundedReceiver<Update>,
    plain_buf: BytesMut,
}

impl Connection {
    #[must_use]
    pub fn new(peer: SocketAddr, shared: Shared) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        shared.events().register(peer, tx);
        Self {
            peer,
            shared,
            phase: Phase::Open,
            http_decoder: HttpDecoder::default(),
            setup_session: crate::pairing::setup::SetupSession::new(),
            verify_session: crate::pairing::verify::VerifySession::new(),
            prepared: crate::handler::prepare::PreparedWrites::new(),
            subscriptions: HashSet::new(),
            pending: PendingEvents::new(),
            events_rx: rx,
            plain_buf: BytesMut::new(),
        }
    }

    fn is_encrypted(&self) -> bool {
        matches!(self.phase, Phase::Encrypted { .. })
    }

    fn client(&self) -> Option<Uuid> {
        match self.phase {
            Phase::Encrypted { client, .. } => Some(client),
            Phase::Open => None,
        }
    }

    /// Drives this connection's socket until it closes, either on request,
    /// on a protocol error, or on idle timeout. Never returns an error: a
    /// decryption failure, protocol error, or failed HTTP parse simply
    /// ends the loop and closes the connection immediately and silently.
    pub async fn run<S>(mut self, mut stream: S, cancel: CancellationToken)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut read_buf = BytesMut::with_capacity(4096);

        loop {
            let flush_delay = if self.pending.is_empty() {
                None
            } else if self.pending.should_flush_immediately() {
                Some(Duration::ZERO)
            } else {
                Some(crate::events::COALESCE_DELAY)
            };

            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    debug!(peer = %self.peer, "connection cancelled");
                    break;
                }

                result = tokio::time::timeout(IDLE_TIMEOUT, stream.read_buf(&mut read_buf)) => {
                    match result {
                        Err(_) => {
                            debug!(peer = %self.peer, "idle timeout");
                            break;
                        }
                        Ok(Ok(0)) => break,
                        Ok(Ok(_)) => {
                            if self.handle_incoming(&mut read_buf, &mut stream).await.is_err() {
                                break;
                            }
                        }
                        Ok(Err(e)) => {
                            warn!(peer = %self.peer, error = %e, "socket read failed");
                            break;
                        }
                    }
                }

                Some(update) = self.events_rx.recv() => {
                    let immediate = false;
                    self.pending.push((update.aid, update.iid), update.value, immediate);
                }

                () = sleep_for(flush_delay) => {
                    if self.flush_events(&mut stream).await.is_err() {
                        break;
                    }
                }
            }
        }

        self.shared.events().unregister(self.peer);
    }

    async fn handle_incoming<S>(&mut self, read_buf: &mut BytesMut, stream: &mut S) -> Result<(), ConnectionError>
    where
        S: AsyncWrite + Unpin,
    {
        loop {
            match self.next_plaintext(read_buf)? {
                None => return Ok(()),
                Some(plain) => self.plain_buf.extend_from_slice(&plain),
            }
            if matches!(self.phase, Phase::Open) {
                break;
            }
        }

        while let Some(request) = self.http_decoder.decode(&mut self.plain_buf)? {
            let wants_close = request.wants_close();
            let response = self.dispatch(request).await;
            match response {
                Some(response) => {
                    self.write_frame(stream, &response.to_bytes()).await?;
                    if wants_close {
                        return Err(ConnectionError::Closed);
                    }
                }
                None => return Err(ConnectionError::Closed),
            }
        }
        Ok(())
    }

    /// Pulls one decrypted (or, in `Open`, raw) plaintext chunk out of
    /// `read_buf`. Returns `Ok(None)` when more bytes are needed.
    fn next_plaintext(&mut self, read_buf: &mut BytesMut) -> Result<Option<Bytes>, ConnectionError> {
        match &mut self.phase {
            Phase::Open => {
                if read_buf.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(read_buf.split().freeze()))
                }
            }
            Phase::Encrypted { channel, .. } => channel.decode(read_buf),
        }
    }

    async fn write_frame<S>(&mut self, stream: &mut S, bytes: &[u8]) -> Result<(), ConnectionError>
    where
        S: AsyncWrite + Unpin,
    {
        let framed = match &mut self.phase {
            Phase::Open => Bytes::copy_from_slice(bytes),
            Phase::Encrypted { channel, .. } => {
                let mut out = BytesMut::new();
                channel.encode(Bytes::copy_from_slice(bytes), &mut out)?;
                out.freeze()
            }
        };
        stream
            .write_all(&framed)
            .await
            .map_err(|_| ConnectionError::Closed)
    }

    async fn flush_events<S>(&mut self, stream: &mut S) -> Result<(), ConnectionError>
    where
        S: AsyncWrite + Unpin,
    {
        let updates = self.pending.drain();
        if updates.is_empty() {
            return Ok(());
        }
        let body = json!({
            "characteristics": updates.into_iter().map(|u| json!({"aid": u.aid, "iid": u.iid, "value": u.value})).collect::<Vec<_>>()
        });
        let frame = event_frame(&serde_json::to_vec(&body).unwrap_or_default());
        self.write_frame(stream, &frame).await
    }

    async fn dispatch(&mut self, request: Request) -> Option<Response> {
        let path = request.path.clone();
        let (route, query) = path.split_once('?').unwrap_or((path.as_str(), ""));

        match (request.method.as_str(), route) {
            ("POST", "/pair-setup") => self.handle_pair_setup(&request).await,
            ("POST", "/pair-verify") => self.handle_pair_verify(&request).await,
            ("POST", "/identify") => Some(self.handle_identify().await),
            _ if !self.is_encrypted() => Some(Response::empty_status(401, "Unauthorized")),
            ("GET", "/accessories") => {
                let accessories = self.shared.accessories().lock().await;
                Some(crate::handler::accessories::get(&accessories))
            }
            ("GET", "/characteristics") => {
                let accessories = self.shared.accessories().lock().await;
                Some(crate::handler::characteristics::get(&accessories, query, &self.subscriptions))
            }
            ("PUT", "/characteristics") => {
                let mut accessories = self.shared.accessories().lock().await;
                let response = crate::handler::characteristics::put(
                    &mut accessories,
                    &request.body,
                    &mut self.prepared,
                    self.shared.events(),
                    self.peer,
                    &mut self.subscriptions,
                    &self.shared.capabilities().identify,
                );
                Some(response)
            }
            ("PUT", "/prepare") => Some(crate::handler::prepare::handle(&mut self.prepared, &request.body)),
            ("POST", "/resource") => {
                let accessories = self.shared.accessories().lock().await;
                let snapshot = &self.shared.capabilities().snapshot;
                Some(crate::handler::resource::handle(&accessories, snapshot, &request.body).await)
            }
            ("POST", "/pairings") => self.handle_pairings(&request).await,
            _ => Some(Response::empty_status(404, "Not Found")),
        }
    }

    async fn handle_pair_setup(&mut self, request: &Request) -> Option<Response> {
        let mut state = self.shared.state().lock().await;
        let outcome = self.setup_session.handle(&mut state, &request.body);
        drop(state);
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                let body = crate::pairing::error_response(
                    crate::pairing::Sequence::M2,
                    crate::error::TlvErrorCode::Authentication,
                );
                return Some(Response {
                    status: 200,
                    reason: "OK",
                    content_type: "application/pairing+tlv8",
                    body: Bytes::from(body),
                });
            }
        };
        if outcome.republish_mdns {
            self.shared.request_persist();
            self.shared.request_republish();
        }
        Some(Response {
            status: 200,
            reason: "OK",
            content_type: "application/pairing+tlv8",
            body: Bytes::from(outcome.response),
        })
    }

    async fn handle_pair_verify(&mut self, request: &Request) -> Option<Response> {
        let mut state = self.shared.state().lock().await;
        let outcome = self.verify_session.handle(&mut state, &request.body);
        drop(state);
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                let body = crate::pairing::error_response(
                    crate::pairing::Sequence::M2,
                    crate::error::TlvErrorCode::Authentication,
                );
                return Some(Response {
                    status: 200,
                    reason: "OK",
                    content_type: "application/pairing+tlv8",
                    body: Bytes::from(body),
                });
            }
        };
        if outcome.needs_persist {
            self.shared.request_persist();
        }
        if let (Some(shared_secret), Some(client)) = (outcome.shared_secret, outcome.client) {
            self.phase = Phase::Encrypted {
                channel: SecureChannel::new(&shared_secret),
                client,
            };
        }
        Some(Response {
            status: 200,
            reason: "OK",
            content_type: "application/pairing+tlv8",
            body: Bytes::from(outcome.response),
        })
    }

    /// Handles `POST /identify`, reachable unencrypted and unpaired.
    async fn handle_identify(&mut self) -> Response {
        let paired = self.shared.state().lock().await.paired();
        crate::handler::identify::handle(paired, &self.shared.capabilities().identify)
    }

    async fn handle_pairings(&mut self, request: &Request) -> Option<Response> {
        let requester = self.client()?;
        let mut state = self.shared.state().lock().await;
        let outcome = crate::pairing::admin::handle(&mut state, requester, &request.body);
        drop(state);
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(_) => {
                let body = crate::pairing::error_response(
                    crate::pairing::Sequence::M2,
                    crate::error::TlvErrorCode::Authentication,
                );
                return Some(Response {
                    status: 200,
                    reason: "OK",
                    content_type: "application/pairing+tlv8",
                    body: Bytes::from(body),
                });
            }
        };
        if outcome.republish_mdns {
            self.shared.request_persist();
            self.shared.request_republish();
        }
        Some(Response {
            status: 200,
            reason: "OK",
            content_type: "application/pairing+tlv8",
            body: Bytes::from(outcome.response),
        })
    }
}

async fn sleep_for(delay: Option<Duration>) {
    match delay {
        Some(delay) => tokio::time::sleep(delay).await,
        None => std::future::pending::<()>().await,
    }
}
