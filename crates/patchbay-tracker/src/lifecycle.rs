//! Process-wide tracker entry points.
//!
//! A host program controls the tracker through these three functions. At
//! most one tracker runs per process; `start` while one is live returns
//! the existing bound port instead of erroring.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::tracker::Tracker;

static RUNNING: Mutex<Option<Arc<Tracker>>> = Mutex::const_new(None);

/// Starts the process-wide tracker, or returns the bound port of the one
/// already running.
pub async fn start(config: TrackerConfig) -> Result<u16> {
    let mut slot = RUNNING.lock().await;
    if let Some(tracker) = slot.as_ref() {
        return Ok(tracker.port());
    }

    let tracker = Tracker::start(config).await?;
    let port = tracker.port();

    // A STOP opcode tears the instance down from inside; clear the slot
    // when that happens so a later start yields a fresh tracker.
    let watched = Arc::clone(&tracker);
    tokio::spawn(async move {
        watched.cancelled().await;
        let mut slot = RUNNING.lock().await;
        if let Some(current) = slot.as_ref() {
            if Arc::ptr_eq(current, &watched) {
                *slot = None;
            }
        }
    });

    *slot = Some(tracker);
    Ok(port)
}

/// Stops the process-wide tracker. Alias for [`terminate`].
pub async fn stop() {
    terminate().await;
}

/// Tears the process-wide tracker down and clears the slot. A later
/// [`start`] yields a fresh instance. No-op when nothing is running.
pub async fn terminate() {
    let tracker = RUNNING.lock().await.take();
    if let Some(tracker) = tracker {
        tracker.terminate().await;
    }
}
