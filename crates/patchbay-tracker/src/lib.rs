//! Patchbay tracker - brokers worker endpoints to prioritised requests.
//!
//! The tracker is a long-running TCP service. Worker processes advertise
//! endpoint slots under a key (typically a device family); clients
//! request a worker for a key with a priority. The tracker pairs the two
//! streams per key - workers strictly FIFO, requests by priority with
//! arrival order breaking ties - and hands the requester an
//! `(address, port, match_key)` tuple. The actual work transfer happens
//! peer-to-peer afterwards; the tracker never sees it.
//!
//! # Architecture
//!
//! - One accept-loop task plus one read-loop task per connection.
//! - Sessions dispatch every mutation through the [`Tracker`], which
//!   serialises them behind a single lock; socket writes always happen
//!   outside it.
//! - Schedulers are plain per-key data; pairing decisions drain to the
//!   caller, so a dead requester costs nothing but a tail re-queue of
//!   the worker slot.
//!
//! # Example
//!
//! ```ignore
//! use patchbay_tracker::TrackerConfig;
//!
//! let config = TrackerConfig::default().with_port_range(9190, 9199);
//! let port = patchbay_tracker::start(config).await?;
//! // peers connect to `port`...
//! patchbay_tracker::terminate().await;
//! ```

pub mod config;
pub mod error;
mod lifecycle;
pub mod scheduler;
pub mod session;
pub mod tracker;

// Re-export main types
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use lifecycle::{start, stop, terminate};
pub use scheduler::{Pairing, PriorityScheduler, QueueSummary, RequestEntry, WorkerEntry};
pub use session::{Session, SessionId};
pub use tracker::Tracker;
