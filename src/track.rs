//! Presence tracking state machine.
//!
//! Converts the noisy per-frame count of accepted detections into stable
//! entry/exit events. A drop in the count is only confirmed as an exit after
//! it persists for a configurable number of consecutive frames, so transient
//! detection misses never produce spurious exit/re-entry pairs.
//!
//! The tracker is a plain state struct driven by exactly one sequential
//! caller; it performs no I/O and never fails.

use std::time::{Duration, Instant};

/// Frames a count must stay non-increasing before an exit is confirmed.
pub const DEFAULT_TOLERANCE_FRAMES: u32 = 10;

/// Domain events emitted by [`PresenceTracker::update`].
///
/// Entry and exit events precede the occupancy event for the same frame, so
/// a subscriber always sees the new running total before the count update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TrackEvent {
    /// A new presence interval began. Carries the updated running total.
    PersonEntered { total: u64 },
    /// A presence interval ended. Carries how long it lasted.
    PersonExited { duration: Duration },
    /// Per-frame occupancy, emitted on every update.
    OccupancyChanged { count: u32 },
}

/// Per-stream presence state. Created once at stream start, updated once per
/// frame, never shared across threads.
///
/// The running total increments by the full count delta on entry, not by a
/// flat one: two people stepping into view on the same frame count as two
/// entries inside a single presence interval. This matches the observable
/// totals of deployed counters and is pinned by
/// `multi_person_jump_increments_total_by_delta`.
pub struct PresenceTracker {
    last_count: u32,
    total_count: u64,
    awaiting_exit: bool,
    tolerance: u32,
    entered_at: Option<Instant>,
    tolerance_frames: u32,
}

impl PresenceTracker {
    pub fn new(tolerance_frames: u32) -> Self {
        Self {
            last_count: 0,
            total_count: 0,
            awaiting_exit: false,
            tolerance: 0,
            entered_at: None,
            tolerance_frames,
        }
    }

    /// Running total of confirmed entries. Monotonically non-decreasing.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Accepted-detection count observed on the most recent frame.
    pub fn occupancy(&self) -> u32 {
        self.last_count
    }

    /// True while a presence interval is open.
    pub fn person_present(&self) -> bool {
        self.awaiting_exit
    }

    /// Feed one frame's accepted-detection count, in frame order.
    ///
    /// Total over all inputs: every call returns at least the occupancy
    /// event, and mutates nothing outside this struct.
    pub fn update(&mut self, current_count: u32, now: Instant) -> Vec<TrackEvent> {
        let mut events = Vec::with_capacity(2);

        if current_count > self.last_count {
            if self.awaiting_exit {
                // The count recovered before the pending exit was confirmed:
                // still the same presence interval, no second entry event.
                self.tolerance = 0;
            } else {
                self.entered_at = Some(now);
                self.awaiting_exit = true;
                self.tolerance = 0;
                self.total_count += u64::from(current_count - self.last_count);
                events.push(TrackEvent::PersonEntered {
                    total: self.total_count,
                });
            }
        } else if self.awaiting_exit {
            self.tolerance += 1;
            if self.tolerance > self.tolerance_frames {
                let duration = self
                    .entered_at
                    .take()
                    .map(|entered| now.duration_since(entered))
                    .unwrap_or_default();
                self.awaiting_exit = false;
                self.tolerance = 0;
                events.push(TrackEvent::PersonExited { duration });
            }
        }

        self.last_count = current_count;
        events.push(TrackEvent::OccupancyChanged {
            count: current_count,
        });
        events
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_TOLERANCE_FRAMES)
    }
}
