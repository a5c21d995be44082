//! Bounded, ordered store of recent Log Lines for one session
//!
//! Sequence numbers start at 1 and are never reused, even after the oldest
//! lines have been evicted. Replay requests that reach behind the oldest
//! retained line are answered with a [`Gap`].

use chrono::Utc;
use std::collections::VecDeque;
use tether_protocol::{Gap, LogLine, LogStream};

/// Lines to replay for a subscriber, plus a gap marker if history was lost
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    /// Set when `last_sequence + 1` is older than the oldest retained line
    pub gap: Option<Gap>,
    /// Retained lines after the requested sequence, in order
    pub lines: Vec<LogLine>,
}

/// Fixed-capacity ring of Log Lines
#[derive(Debug)]
pub struct RingBuffer {
    lines: VecDeque<LogLine>,
    capacity: usize,
    next_sequence: u64,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` lines (minimum 1)
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            next_sequence: 1,
        }
    }

    /// Append a line, evicting the oldest when full
    pub fn push(&mut self, stream: LogStream, content: impl Into<String>) -> LogLine {
        let line = LogLine {
            sequence: self.next_sequence,
            stream,
            content: content.into(),
            timestamp: Utc::now(),
        };
        self.next_sequence += 1;

        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.clone());
        line
    }

    /// Lines with `sequence > last_sequence`.
    ///
    /// `None` means "from the beginning" and behaves like `Some(0)`.
    #[must_use]
    pub fn since(&self, last_sequence: Option<u64>) -> Replay {
        let requested = last_sequence.unwrap_or(0);
        let gap = self.oldest_sequence().and_then(|oldest| {
            (requested.saturating_add(1) < oldest).then_some(Gap {
                requested,
                oldest_available: oldest,
            })
        });

        let start = self.lines.partition_point(|l| l.sequence <= requested);
        Replay {
            gap,
            lines: self.lines.range(start..).cloned().collect(),
        }
    }

    /// The most recent `n` lines, oldest first
    #[must_use]
    pub fn tail(&self, n: usize) -> Vec<LogLine> {
        let start = self.lines.len().saturating_sub(n);
        self.lines.range(start..).cloned().collect()
    }

    /// Sequence of the oldest retained line
    #[must_use]
    pub fn oldest_sequence(&self) -> Option<u64> {
        self.lines.front().map(|l| l.sequence)
    }

    /// Sequence of the last appended line (0 before the first append)
    #[must_use]
    pub fn latest_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Number of retained lines
    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Whether no line has been retained
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Maximum number of retained lines
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
