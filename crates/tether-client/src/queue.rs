//! Bounded event queue between the connection loop and listeners
//!
//! The connection loop pushes; a scheduler drains one bounded batch per
//! tick. When listeners fall behind the oldest events are dropped and the
//! drops are reported through a rate-limited [`OverflowReporter`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tether_protocol::StreamEvent;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;
/// Default events dispatched per drain tick
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Drop-oldest FIFO of received events
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<StreamEvent>,
    capacity: usize,
    batch_size: usize,
    dropped_total: u64,
}

impl EventQueue {
    /// Create a queue (capacity and batch size are at least 1)
    #[must_use]
    pub fn new(capacity: usize, batch_size: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
            batch_size: batch_size.max(1),
            dropped_total: 0,
        }
    }

    /// Enqueue; returns `true` if the oldest event was dropped to make room
    pub fn push(&mut self, event: StreamEvent) -> bool {
        let dropped = if self.events.len() >= self.capacity {
            self.events.pop_front();
            self.dropped_total += 1;
            true
        } else {
            false
        };
        self.events.push_back(event);
        dropped
    }

    /// Remove up to one batch of events, oldest first
    pub fn drain_batch(&mut self) -> Vec<StreamEvent> {
        let n = self.batch_size.min(self.events.len());
        self.events.drain(..n).collect()
    }

    /// Discard everything queued
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Queued events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether nothing is queued
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events dropped since creation
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.dropped_total
    }

    /// Maximum queued events
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, DEFAULT_BATCH_SIZE)
    }
}

/// Rate limiter for overflow notifications.
///
/// Drops are counted as pending; at most one report is due per `interval`,
/// and [`OverflowReporter::flush`] releases whatever is still pending. The
/// reporter only decides *when* to report: callers report the queue's
/// running total.
#[derive(Debug)]
pub struct OverflowReporter {
    interval: Duration,
    pending: u64,
    last_report: Option<Instant>,
}

impl OverflowReporter {
    /// Report at most once per `interval`
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending: 0,
            last_report: None,
        }
    }

    /// Count `dropped` events; returns whether a report is due now
    pub fn record(&mut self, dropped: u64, now: Instant) -> bool {
        self.pending += dropped;
        let due = self
            .last_report
            .map_or(true, |last| now.duration_since(last) >= self.interval);
        due && self.take(now)
    }

    /// Whether unreported drops remain; clears them regardless of the rate limit
    pub fn flush(&mut self, now: Instant) -> bool {
        self.take(now)
    }

    /// Drops counted but not yet reported
    #[must_use]
    pub fn pending(&self) -> u64 {
        self.pending
    }

    fn take(&mut self, now: Instant) -> bool {
        if self.pending == 0 {
            return false;
        }
        self.last_report = Some(now);
        self.pending = 0;
        true
    }
}

impl Default for OverflowReporter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
