//! Mutex-Guarded Shared Reading Buffer
//!
//! ## Overview
//!
//! The one piece of mutable state both tasks touch: the producer task appends
//! a reading every sample period, the sender task drains the lot once per
//! send interval. Capacity equals `send_interval / sample_interval`, so a
//! healthy cycle drains the buffer just before it would fill.
//!
//! ## Concurrency contract
//!
//! - `append` and `drain` each hold the lock for one O(1)-ish operation
//!   (a push, or a pointer swap); neither performs I/O under the lock.
//! - Both are all-or-nothing: a poisoned lock leaves the contents untouched
//!   and surfaces [`BufferError::LockPoisoned`]; the caller retries on a
//!   later cycle.
//!
//! ## Full-buffer policy
//!
//! A full buffer rejects the incoming reading and keeps what it has
//! ([`AppendOutcome::Full`]). The buffer only fills when the sender has been
//! unable to drain for a whole interval, i.e. the network is down; at that
//! point the already-buffered readings are exactly the data the next cycle
//! will persist, and overwriting them to admit one newer sample would trade
//! many readings for one. Warnings about the condition are rate-limited so a
//! week-long outage does not flood the log sink.

use std::sync::Mutex;
use std::time::Duration;

use log::{debug, warn};

use crate::errors::BufferError;
use crate::reading::Reading;

/// Consecutive full-buffer warnings before suppression kicks in
const FULL_WARNING_LIMIT: u32 = 5;

/// Result of an append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Reading stored
    Appended,
    /// Buffer at capacity; reading rejected, contents unchanged
    Full,
}

struct BufferState {
    readings: Vec<Reading>,
    full_warnings: u32,
}

/// Fixed-capacity reading buffer shared between the producer and sender tasks
pub struct ReadingBuffer {
    state: Mutex<BufferState>,
    capacity: usize,
}

impl ReadingBuffer {
    /// Create a buffer holding at most `capacity` readings
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                readings: Vec::with_capacity(capacity),
                full_warnings: 0,
            }),
            capacity,
        }
    }

    /// Derive capacity from the sampling and send cadence
    ///
    /// A 5-minute send interval with 15-second samples yields capacity 20.
    /// Degenerate configurations still get room for one reading.
    pub fn for_intervals(send_interval: Duration, sample_interval: Duration) -> Self {
        let sample = sample_interval.as_secs().max(1);
        let capacity = (send_interval.as_secs() / sample).max(1) as usize;
        Self::with_capacity(capacity)
    }

    /// Append one reading; O(1), the lock is released before any logging
    pub fn append(&self, reading: Reading) -> Result<AppendOutcome, BufferError> {
        let mut state = self.state.lock().map_err(|_| BufferError::LockPoisoned)?;

        if state.readings.len() < self.capacity {
            state.readings.push(reading);
            state.full_warnings = 0;
            let buffered = state.readings.len();
            drop(state);

            debug!("reading #{buffered} buffered (value {:.2})", reading.value);
            return Ok(AppendOutcome::Appended);
        }

        state.full_warnings = state.full_warnings.saturating_add(1);
        let warnings = state.full_warnings;
        drop(state);

        if warnings <= FULL_WARNING_LIMIT {
            warn!(
                "reading buffer full ({0}/{0}); network may be down, sender will persist the backlog",
                self.capacity
            );
        } else if warnings == FULL_WARNING_LIMIT + 1 {
            warn!("further buffer-full warnings suppressed");
        }

        Ok(AppendOutcome::Full)
    }

    /// Atomically copy out every buffered reading and reset to empty
    ///
    /// Exclusively for the sender side. Returns readings in insertion order.
    pub fn drain(&self) -> Result<Vec<Reading>, BufferError> {
        let mut state = self.state.lock().map_err(|_| BufferError::LockPoisoned)?;
        let drained = std::mem::replace(&mut state.readings, Vec::with_capacity(self.capacity));
        Ok(drained)
    }

    /// Current number of buffered readings
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .readings
            .len()
    }

    /// Whether the buffer holds no readings
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of readings the buffer will hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_buffer() {
        let buffer = ReadingBuffer::with_capacity(4);
        assert!(buffer.is_empty());
        assert_eq!(buffer.len(), 0);
        assert!(buffer.drain().unwrap().is_empty());
    }

    #[test]
    fn append_then_drain_preserves_order() {
        let buffer = ReadingBuffer::with_capacity(8);
        for i in 0..5 {
            let outcome = buffer.append(Reading::new(1000 + i, i as f32)).unwrap();
            assert_eq!(outcome, AppendOutcome::Appended);
        }

        let drained = buffer.drain().unwrap();
        let timestamps: Vec<i64> = drained.iter().map(|r| r.timestamp).collect();
        assert_eq!(timestamps, vec![1000, 1001, 1002, 1003, 1004]);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn full_buffer_rejects_and_keeps_contents() {
        let buffer = ReadingBuffer::with_capacity(2);
        buffer.append(Reading::new(1, 1.0)).unwrap();
        buffer.append(Reading::new(2, 2.0)).unwrap();

        // Rejected repeatedly, existing data untouched
        for _ in 0..10 {
            assert_eq!(buffer.append(Reading::new(3, 3.0)).unwrap(), AppendOutcome::Full);
        }
        assert_eq!(buffer.len(), 2);

        let drained = buffer.drain().unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].timestamp, 1);
        assert_eq!(drained[1].timestamp, 2);
    }

    #[test]
    fn capacity_from_intervals() {
        let buffer = ReadingBuffer::for_intervals(
            Duration::from_secs(5 * 60),
            Duration::from_secs(15),
        );
        assert_eq!(buffer.capacity(), 20);

        // Degenerate config still buffers something
        let buffer = ReadingBuffer::for_intervals(Duration::from_secs(1), Duration::from_secs(60));
        assert_eq!(buffer.capacity(), 1);
    }

    #[test]
    fn append_resumes_after_drain() {
        let buffer = ReadingBuffer::with_capacity(1);
        buffer.append(Reading::new(1, 1.0)).unwrap();
        assert_eq!(buffer.append(Reading::new(2, 2.0)).unwrap(), AppendOutcome::Full);

        buffer.drain().unwrap();
        assert_eq!(buffer.append(Reading::new(3, 3.0)).unwrap(), AppendOutcome::Appended);
        assert_eq!(buffer.len(), 1);
    }

    proptest! {
        /// Any sequence of appends within capacity drains back in insertion
        /// order and leaves the buffer empty.
        #[test]
        fn drain_returns_insertion_order(values in proptest::collection::vec(-1.0e6f32..1.0e6, 0..32)) {
            let buffer = ReadingBuffer::with_capacity(32);
            for (i, value) in values.iter().enumerate() {
                let outcome = buffer.append(Reading::new(i as i64, *value)).unwrap();
                prop_assert_eq!(outcome, AppendOutcome::Appended);
            }

            let drained = buffer.drain().unwrap();
            prop_assert_eq!(drained.len(), values.len());
            for (i, reading) in drained.iter().enumerate() {
                prop_assert_eq!(reading.timestamp, i as i64);
                prop_assert_eq!(reading.value, values[i]);
            }
            prop_assert_eq!(buffer.len(), 0);
        }
    }
}
