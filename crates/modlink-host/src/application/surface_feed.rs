//! Host-side relay of the device list to client UIs.
//!
//! [`SurfaceFeed`] holds the host's current device list.  Each
//! [`publish`](SurfaceFeed::publish) diffs the new snapshot against that
//! baseline and broadcasts the resulting [`SurfacesUpdate`]s, in order, to
//! every subscriber.  A subscriber starts from the snapshot returned by
//! [`subscribe`](SurfaceFeed::subscribe) and applies the stream on top of it.
//!
//! A subscriber that falls more than `capacity` updates behind receives
//! `RecvError::Lagged` and must subscribe again to get a fresh baseline.

use std::sync::{Mutex, MutexGuard, PoisonError};

use modlink_core::{diff_devices, ClientDevicesListItem, SurfacesUpdate};
use tokio::sync::broadcast;
use tracing::debug;

/// Baseline device list plus an ordered broadcast of changes to it.
#[derive(Debug)]
pub struct SurfaceFeed {
    baseline: Mutex<Vec<ClientDevicesListItem>>,
    updates: broadcast::Sender<SurfacesUpdate>,
}

impl SurfaceFeed {
    /// Creates a feed with an empty baseline.
    ///
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self::with_baseline(Vec::new(), capacity)
    }

    pub fn with_baseline(baseline: Vec<ClientDevicesListItem>, capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self {
            baseline: Mutex::new(baseline),
            updates,
        }
    }

    /// Returns the current baseline and a receiver for every update published
    /// after it.
    pub fn subscribe(&self) -> (Vec<ClientDevicesListItem>, broadcast::Receiver<SurfacesUpdate>) {
        // Both under the lock so no publish can fall between them.
        let baseline = self.baseline();
        (baseline.clone(), self.updates.subscribe())
    }

    /// Replaces the baseline with `snapshot` and broadcasts the difference.
    ///
    /// Returns the number of updates emitted.
    pub fn publish(&self, snapshot: Vec<ClientDevicesListItem>) -> usize {
        let mut baseline = self.baseline();
        let updates = diff_devices(&baseline, &snapshot);
        for update in &updates {
            if self.updates.send(update.clone()).is_err() {
                debug!(item = update.item_id(), "no surface subscribers; update not delivered");
            }
        }
        *baseline = snapshot;
        updates.len()
    }

    /// A copy of the current baseline.
    pub fn snapshot(&self) -> Vec<ClientDevicesListItem> {
        self.baseline().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }

    fn baseline(&self) -> MutexGuard<'_, Vec<ClientDevicesListItem>> {
        self.baseline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
