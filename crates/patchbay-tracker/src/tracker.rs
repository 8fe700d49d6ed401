//! Tracker core: connection set, per-key schedulers, accept loop.
//!
//! A single mutex guards the connection map and every scheduler; the lock
//! is never held across a socket write. Pairing decisions are drained to a
//! local list under the lock, delivered after release, and write failures
//! feed back as tail restores followed by another drain.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use patchbay_proto::TrackerResponse;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::error::{Result, TrackerError};
use crate::scheduler::{Pairing, PriorityScheduler, WorkerEntry};
use crate::session::{self, Session, SessionId};

#[derive(Debug, Default)]
struct TrackerState {
    connections: HashMap<SessionId, Arc<Session>>,
    schedulers: HashMap<String, PriorityScheduler>,
}

/// The tracker service.
///
/// Owns the listening socket, the set of live sessions, and one
/// [`PriorityScheduler`] per key (created lazily, never destroyed while
/// the tracker lives).
#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    port: u16,
    state: Mutex<TrackerState>,
    next_session: AtomicU64,
    cancel: CancellationToken,
    accept_task: Mutex<Option<JoinHandle<()>>>,
}

impl Tracker {
    /// Binds the first free port in the configured range, starts the
    /// accept loop, and returns the running tracker.
    pub async fn start(config: TrackerConfig) -> Result<Arc<Self>> {
        let listener = bind_scan(&config).await?;
        let port = listener.local_addr()?.port();
        if !config.silent {
            info!(host = %config.host, port, "tracker listening");
        }

        let tracker = Arc::new(Self {
            config,
            port,
            state: Mutex::new(TrackerState::default()),
            next_session: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            accept_task: Mutex::new(None),
        });

        let accept = tokio::spawn(accept_loop(Arc::clone(&tracker), listener));
        *tracker.accept_task.lock().await = Some(accept);

        Ok(tracker)
    }

    /// The bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves once the tracker has been told to shut down.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub(crate) fn max_frame_size(&self) -> usize {
        self.config.max_frame_size
    }

    pub(crate) fn next_session_id(&self) -> SessionId {
        self.next_session.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) async fn register(&self, session: Arc<Session>) {
        self.state
            .lock()
            .await
            .connections
            .insert(session.id(), session);
    }

    /// Queues one advertised worker slot under `key` and delivers any
    /// pairings it enables.
    pub async fn put(
        &self,
        key: &str,
        address: String,
        port: u16,
        match_key: String,
        session: SessionId,
    ) {
        let pairings = {
            let mut state = self.state.lock().await;
            state
                .schedulers
                .entry(key.to_owned())
                .or_default()
                .put(WorkerEntry {
                    session,
                    address,
                    port,
                    match_key,
                })
        };
        self.deliver(key, pairings).await;
    }

    /// Queues one request under `key` and delivers any pairings it
    /// enables.
    pub async fn request(&self, key: &str, user: String, priority: i64, session: SessionId) {
        let pairings = {
            let mut state = self.state.lock().await;
            state
                .schedulers
                .entry(key.to_owned())
                .or_default()
                .request(session, user, priority)
        };
        self.deliver(key, pairings).await;
    }

    /// Removes a session and scrubs every scheduler entry that
    /// back-references it.
    pub(crate) async fn close(&self, id: SessionId) {
        let mut state = self.state.lock().await;
        let removed = state.connections.remove(&id).is_some();
        for scheduler in state.schedulers.values_mut() {
            scheduler.remove_session(id);
        }
        if removed {
            debug!(session = id, "session removed");
        }
    }

    /// Builds the SUMMARY payload: per-key queue counts plus every live
    /// session whose self-reported key begins with `"server"`.
    pub(crate) async fn summary(&self) -> (Value, Value) {
        let state = self.state.lock().await;

        let queue_info: Value = state
            .schedulers
            .iter()
            .map(|(key, scheduler)| (key.clone(), json!(scheduler.summary())))
            .collect::<serde_json::Map<String, Value>>()
            .into();

        let server_info: Vec<Value> = state
            .connections
            .values()
            .filter_map(|session| {
                let key = session.key();
                key.starts_with("server")
                    .then(|| json!({"addr": [session.host(), session.port()], "key": key}))
            })
            .collect();

        (queue_info, Value::Array(server_info))
    }

    /// Shuts the tracker down: stops the accept loop, closes every
    /// session socket, and drops all state. Idempotent.
    pub async fn terminate(&self) {
        self.cancel.cancel();

        let accept = self.accept_task.lock().await.take();
        if let Some(accept) = accept {
            let _ = accept.await;
        }

        let sessions: Vec<Arc<Session>> = {
            let mut state = self.state.lock().await;
            state.schedulers.clear();
            state.connections.drain().map(|(_, s)| s).collect()
        };
        for session in &sessions {
            session.shutdown().await;
        }

        if !self.config.silent {
            info!(port = self.port, "tracker terminated");
        }
    }

    /// Writes pairing replies, feeding write failures back into the
    /// scheduler as tail restores.
    ///
    /// A failed write means the requester is gone: its session is
    /// scrubbed (dropping any other requests it had queued) and the
    /// worker slot goes back to the end of the queue, which may enable
    /// further pairings with the remaining requests.
    async fn deliver(&self, key: &str, pairings: Vec<Pairing>) {
        let mut queue: VecDeque<Pairing> = pairings.into();

        while let Some(pairing) = queue.pop_front() {
            let (requester, worker_session) = {
                let state = self.state.lock().await;
                (
                    state.connections.get(&pairing.request.session).cloned(),
                    state.connections.get(&pairing.worker.session).cloned(),
                )
            };

            let reply = TrackerResponse::Match {
                address: pairing.worker.address.clone(),
                port: pairing.worker.port,
                match_key: pairing.worker.match_key.clone(),
            };
            let delivered = match requester {
                Some(requester) => requester.send(&reply).await.is_ok(),
                None => false,
            };

            if delivered {
                if let Some(worker_session) = worker_session {
                    worker_session.remove_match_key(&pairing.worker.match_key);
                }
                debug!(
                    key,
                    user = %pairing.request.user,
                    match_key = %pairing.worker.match_key,
                    "paired"
                );
            } else {
                warn!(
                    key,
                    user = %pairing.request.user,
                    "requester gone, returning worker to the queue"
                );
                let more = {
                    let mut state = self.state.lock().await;
                    state.connections.remove(&pairing.request.session);
                    for scheduler in state.schedulers.values_mut() {
                        scheduler.remove_session(pairing.request.session);
                    }
                    match state.schedulers.get_mut(key) {
                        Some(scheduler) => scheduler.restore(pairing.worker),
                        None => Vec::new(),
                    }
                };
                queue.extend(more);
            }
        }
    }
}

async fn accept_loop(tracker: Arc<Tracker>, listener: TcpListener) {
    loop {
        tokio::select! {
            () = tracker.cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(session::serve(Arc::clone(&tracker), stream, peer));
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            },
        }
    }
    debug!("accept loop exited");
}

/// Binds the first free port in `[port, port_end]` on the configured
/// host. Port 0 is the usual OS-assigned ephemeral bind.
async fn bind_scan(config: &TrackerConfig) -> Result<TcpListener> {
    let mut last_error = None;
    for port in config.port..=config.port_end {
        match TcpListener::bind((config.host.as_str(), port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => last_error = Some(e),
        }
    }
    Err(TrackerError::BindFailed {
        start: config.port,
        end: config.port_end,
        source: last_error
            .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty port range")),
    })
}
