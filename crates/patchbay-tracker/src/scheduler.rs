//! Per-key pairing of free workers against prioritised requests.
//!
//! The scheduler is plain data owned by the tracker core: mutators return
//! the pairings they produced and the caller performs the socket writes
//! after releasing the tracker lock. Workers are served strictly FIFO;
//! requests are served by priority (higher first) with arrival order
//! breaking ties.

use std::collections::{BinaryHeap, VecDeque};

use serde::Serialize;

use crate::session::SessionId;

/// One advertised worker slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEntry {
    /// Handle of the session that advertised the slot.
    pub session: SessionId,
    /// Host the requester should dial.
    pub address: String,
    /// Port the requester should dial.
    pub port: u16,
    /// Opaque identifier of this specific offer.
    pub match_key: String,
}

/// One pending request for a worker.
#[derive(Debug, Clone)]
pub struct RequestEntry {
    /// Handle of the requesting session.
    pub session: SessionId,
    /// Requester label, for reporting only.
    pub user: String,
    /// Higher is more urgent.
    pub priority: i64,
    /// Scheduler-local arrival counter; lower wins among equal priorities.
    pub sequence: u64,
}

impl PartialEq for RequestEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for RequestEntry {}

impl PartialOrd for RequestEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RequestEntry {
    /// Max-heap order: higher priority first, then lower sequence.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// One pairing decision: the worker slot to hand to the requester.
#[derive(Debug, Clone)]
pub struct Pairing {
    /// The request being served.
    pub request: RequestEntry,
    /// The worker slot it receives.
    pub worker: WorkerEntry,
}

/// Queue counts for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSummary {
    /// Workers waiting to be matched.
    pub free: usize,
    /// Requests waiting for a worker.
    pub pending: usize,
}

/// Pairing engine for a single key.
///
/// Invariant: after any mutator returns, at most one of the two queues is
/// non-empty.
#[derive(Debug, Default)]
pub struct PriorityScheduler {
    workers: VecDeque<WorkerEntry>,
    requests: BinaryHeap<RequestEntry>,
    request_count: u64,
}

impl PriorityScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a worker slot and drains any pairings it enables.
    pub fn put(&mut self, worker: WorkerEntry) -> Vec<Pairing> {
        self.workers.push_back(worker);
        self.pair()
    }

    /// Queues a request and drains any pairings it enables.
    pub fn request(&mut self, session: SessionId, user: String, priority: i64) -> Vec<Pairing> {
        let sequence = self.request_count;
        self.request_count += 1;
        self.requests.push(RequestEntry {
            session,
            user,
            priority,
            sequence,
        });
        self.pair()
    }

    /// Returns an unmatched worker slot to the tail of the queue.
    ///
    /// Used when the requester it was paired with turned out to be gone;
    /// the slot is served again, after every worker already queued.
    pub fn restore(&mut self, worker: WorkerEntry) -> Vec<Pairing> {
        self.workers.push_back(worker);
        self.pair()
    }

    /// Removes one worker slot by structural equality.
    ///
    /// Returns true if a matching slot was queued.
    pub fn remove(&mut self, worker: &WorkerEntry) -> bool {
        match self.workers.iter().position(|w| w == worker) {
            Some(index) => {
                self.workers.remove(index);
                true
            }
            None => false,
        }
    }

    /// Drops every entry owned by the given session, both queues.
    pub fn remove_session(&mut self, session: SessionId) {
        self.workers.retain(|w| w.session != session);
        if self.requests.iter().any(|r| r.session == session) {
            let kept: Vec<RequestEntry> = self
                .requests
                .drain()
                .filter(|r| r.session != session)
                .collect();
            self.requests = kept.into();
        }
    }

    /// Current queue counts.
    #[must_use]
    pub fn summary(&self) -> QueueSummary {
        QueueSummary {
            free: self.workers.len(),
            pending: self.requests.len(),
        }
    }

    fn pair(&mut self) -> Vec<Pairing> {
        let mut pairings = Vec::new();
        while let Some(worker) = self.workers.pop_front() {
            match self.requests.pop() {
                Some(request) => pairings.push(Pairing { request, worker }),
                None => {
                    self.workers.push_front(worker);
                    break;
                }
            }
        }
        pairings
    }
}
