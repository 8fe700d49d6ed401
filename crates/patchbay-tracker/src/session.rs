//! Per-connection session state and the connection read loop.
//!
//! Each accepted socket gets one session task. The read half stays with
//! the task; the write half lives behind a lock in the shared [`Session`]
//! so pairing replies from other connections' dispatches can target it
//! concurrently.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use patchbay_proto::{
    read_frame, write_frame, TrackerRequest, TrackerResponse, RPC_TRACKER_MAGIC,
};

use crate::tracker::Tracker;

/// Session handle stored in scheduler entries instead of a pointer.
pub type SessionId = u64;

/// State for one connected peer.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    host: String,
    port: u16,
    key: StdMutex<String>,
    pending_match_keys: StdMutex<Vec<String>>,
    writer: Mutex<OwnedWriteHalf>,
}

impl Session {
    fn new(id: SessionId, peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id,
            host: peer.ip().to_string(),
            port: peer.port(),
            key: StdMutex::new(String::new()),
            pending_match_keys: StdMutex::new(Vec::new()),
            writer: Mutex::new(writer),
        }
    }

    /// Tracker-local handle of this session.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Peer host as observed on accept.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Peer port as observed on accept.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The key the peer self-reported via UPDATE_INFO; empty until set.
    #[must_use]
    pub fn key(&self) -> String {
        self.key.lock().unwrap().clone()
    }

    pub(crate) fn set_key(&self, key: String) {
        *self.key.lock().unwrap() = key;
    }

    /// Match keys this session has offered and not yet had consumed,
    /// in insertion order.
    #[must_use]
    pub fn match_keys(&self) -> Vec<String> {
        self.pending_match_keys.lock().unwrap().clone()
    }

    pub(crate) fn add_match_key(&self, match_key: &str) {
        let mut keys = self.pending_match_keys.lock().unwrap();
        if !keys.iter().any(|k| k == match_key) {
            keys.push(match_key.to_owned());
        }
    }

    pub(crate) fn remove_match_key(&self, match_key: &str) {
        self.pending_match_keys
            .lock()
            .unwrap()
            .retain(|k| k != match_key);
    }

    /// Writes one reply frame to the peer.
    pub(crate) async fn send(&self, response: &TrackerResponse) -> patchbay_proto::Result<()> {
        let frame = response.encode();
        debug!(host = %self.host, port = self.port, frame = %frame, "reply");
        let mut writer = self.writer.lock().await;
        write_frame(&mut *writer, &frame).await
    }

    /// Shuts the write side down, unblocking the peer and, through the
    /// resulting read error, this session's own read loop.
    pub(crate) async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// Drives one accepted connection to completion.
///
/// Handshakes, registers the session, then processes request frames until
/// the peer disconnects or misbehaves. All exits funnel through
/// `Tracker::close` so no scheduler entry outlives the session.
pub(crate) async fn serve(tracker: Arc<Tracker>, mut stream: TcpStream, peer: SocketAddr) {
    match handshake(&mut stream).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(peer = %peer, "handshake mismatch, closing");
            return;
        }
        Err(_) => return,
    }

    let (mut reader, writer) = stream.into_split();
    let session = Arc::new(Session::new(tracker.next_session_id(), peer, writer));
    tracker.register(Arc::clone(&session)).await;
    debug!(session = session.id(), peer = %peer, "session open");

    loop {
        let payload = match read_frame(&mut reader, tracker.max_frame_size()).await {
            Ok(payload) => payload,
            Err(e) => {
                if !e.is_disconnect() {
                    warn!(session = session.id(), error = %e, "dropping session");
                }
                break;
            }
        };
        debug!(host = %session.host(), port = session.port(), frame = %payload, "request");

        let request = match TrackerRequest::parse(&payload) {
            Ok(request) => request,
            Err(e) => {
                warn!(session = session.id(), error = %e, "malformed request, dropping session");
                break;
            }
        };

        if dispatch(&tracker, &session, request).await.is_err() {
            break;
        }
    }

    tracker.close(session.id()).await;
    debug!(session = session.id(), "session closed");
}

/// Reads the 4-byte magic and echoes it back on match.
///
/// Returns `Ok(false)` on a mismatch; the caller closes silently.
async fn handshake(stream: &mut TcpStream) -> std::io::Result<bool> {
    let mut magic = [0u8; 4];
    stream.read_exact(&mut magic).await?;
    if u32::from_le_bytes(magic) != RPC_TRACKER_MAGIC {
        return Ok(false);
    }
    stream.write_all(&magic).await?;
    Ok(true)
}

/// Handles one decoded request. An error means the peer's socket failed
/// mid-reply and the session should end.
async fn dispatch(
    tracker: &Arc<Tracker>,
    session: &Arc<Session>,
    request: TrackerRequest,
) -> patchbay_proto::Result<()> {
    match request {
        // Status codes from peers carry no action.
        TrackerRequest::Fail | TrackerRequest::Success => Ok(()),

        TrackerRequest::Ping => session.send(&TrackerResponse::Success).await,

        TrackerRequest::Stop => {
            // Reply first so the bytes flush before sockets shut down.
            session.send(&TrackerResponse::Success).await?;
            tracker.terminate().await;
            Ok(())
        }

        TrackerRequest::Put {
            key,
            port,
            match_key,
            address,
        } => {
            let address = address.unwrap_or_else(|| session.host().to_owned());
            session.add_match_key(&match_key);
            tracker
                .put(&key, address, port, match_key, session.id())
                .await;
            session.send(&TrackerResponse::Success).await
        }

        TrackerRequest::Request {
            key,
            user,
            priority,
        } => {
            // Deferred: the reply is written by whichever pairing
            // eventually serves this request.
            tracker.request(&key, user, priority, session.id()).await;
            Ok(())
        }

        TrackerRequest::UpdateInfo { key } => {
            session.set_key(key);
            session.send(&TrackerResponse::Success).await
        }

        TrackerRequest::Summary => {
            let (queue_info, server_info) = tracker.summary().await;
            session
                .send(&TrackerResponse::Summary {
                    queue_info,
                    server_info,
                })
                .await
        }

        TrackerRequest::GetPendingMatchkeys => {
            session
                .send(&TrackerResponse::MatchKeys(session.match_keys()))
                .await
        }
    }
}
