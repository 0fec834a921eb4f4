//! Fixed-capacity FIFO of records waiting for dispatch.
//!
//! The buffer never overwrites: once full, `enqueue` is refused until a
//! confirmed delivery frees space through [`RecordBuffer::commit_drain`].
//! Reading a batch for formatting (`peek_batch`) and removing it after
//! delivery (`commit_drain`) are deliberately separate steps so that a failed
//! dispatch leaves the buffer exactly as it was.

use crate::error::{RollcallError, RollcallResult};
use crate::record::IdentityRecord;

/// Default number of records the device can hold between flushes.
pub const DEFAULT_CAPACITY: usize = 10;

/// Circular queue of [`IdentityRecord`]s.
#[derive(Debug, Clone)]
pub struct RecordBuffer {
    slots: Vec<Option<IdentityRecord>>,
    head: usize,
    tail: usize,
    occupied: usize,
}

impl RecordBuffer {
    /// Create an empty buffer holding at most `capacity` records.
    ///
    /// A zero capacity is bumped to one; configuration validation rejects it
    /// earlier.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: vec![None; capacity],
            head: 0,
            tail: 0,
            occupied: 0,
        }
    }

    /// Number of slots, fixed at construction.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Records currently buffered.
    pub fn occupied(&self) -> usize {
        self.occupied
    }

    /// Whether the next `enqueue` would be rejected.
    pub fn is_full(&self) -> bool {
        self.occupied == self.capacity()
    }

    /// Whether nothing is waiting to be sent.
    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    /// Append a record at the tail.
    ///
    /// Returns the new occupancy, or `BufferFull` without touching the
    /// buffer when no slot is free.
    pub fn enqueue(&mut self, record: IdentityRecord) -> RollcallResult<usize> {
        if self.is_full() {
            return Err(RollcallError::BufferFull {
                capacity: self.capacity(),
            });
        }

        self.slots[self.tail] = Some(record);
        self.tail = (self.tail + 1) % self.capacity();
        self.occupied += 1;
        Ok(self.occupied)
    }

    /// The oldest `min(max_n, occupied)` records, oldest first.
    pub fn peek_batch(&self, max_n: usize) -> Vec<&IdentityRecord> {
        let count = max_n.min(self.occupied);
        (0..count)
            .filter_map(|offset| self.slots[(self.head + offset) % self.capacity()].as_ref())
            .collect()
    }

    /// Remove the `n` oldest records after their delivery was confirmed.
    ///
    /// Asking for more than is buffered is a caller bug and is reported as
    /// `DrainExceedsOccupancy`; nothing is removed in that case.
    pub fn commit_drain(&mut self, n: usize) -> RollcallResult<()> {
        if n > self.occupied {
            return Err(RollcallError::DrainExceedsOccupancy {
                requested: n,
                occupied: self.occupied,
            });
        }

        for _ in 0..n {
            self.slots[self.head] = None;
            self.head = (self.head + 1) % self.capacity();
        }
        self.occupied -= n;
        Ok(())
    }

    /// Iterate over every buffered record, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &IdentityRecord> + '_ {
        self.peek_batch(self.occupied).into_iter()
    }
}

impl Default for RecordBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
