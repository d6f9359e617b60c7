//! Bounded FIFO of clients waiting for admission.
//!
//! A fixed array of slots with wrapping read/write indices. Each slot is an
//! `Option<T>`: an empty slot is `None`, so no value of `T` doubles as an
//! "unused" marker. Removal takes the value out of its slot, which makes it
//! impossible to hand the same entry out twice.

use crate::error::{FlowError, FlowResult};

/// Statistics about ring usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    /// Current number of waiting entries.
    pub len: usize,
    /// Maximum number of waiting entries.
    pub capacity: usize,
    /// Total entries pushed since creation.
    pub total_pushed: u64,
    /// Total entries popped since creation.
    pub total_popped: u64,
    /// Largest number of entries waiting at once.
    pub high_watermark: usize,
}

/// A bounded first-in first-out ring of waiting entries.
#[derive(Debug)]
pub struct AdmissionRing<T> {
    /// Slots; `None` marks a free slot.
    slots: Box<[Option<T>]>,

    /// Index of the oldest entry.
    head: usize,

    /// Number of occupied slots.
    len: usize,

    /// Total entries pushed.
    total_pushed: u64,

    /// Total entries popped.
    total_popped: u64,

    /// Largest `len` observed.
    high_watermark: usize,
}

impl<T> AdmissionRing<T> {
    /// Creates an empty ring holding at most `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::InvalidConfig` if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> FlowResult<Self> {
        if capacity == 0 {
            return Err(FlowError::InvalidConfig {
                message: "admission ring capacity must be positive".to_string(),
            });
        }

        Ok(Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
            len: 0,
            total_pushed: 0,
            total_popped: 0,
            high_watermark: 0,
        })
    }

    /// Returns the maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of waiting entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if no more entries fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Index of the slot the next push writes to.
    fn tail(&self) -> usize {
        (self.head + self.len) % self.capacity()
    }

    /// Appends an entry at the back.
    ///
    /// # Errors
    ///
    /// Returns `FlowError::QueueFull` if the ring is at capacity. The entry is
    /// dropped in that case; check [`is_full`](Self::is_full) first to keep it.
    pub fn push(&mut self, entry: T) -> FlowResult<()> {
        if self.is_full() {
            return Err(FlowError::QueueFull {
                size: self.len,
                max_size: self.capacity(),
            });
        }

        let tail = self.tail();
        debug_assert!(self.slots[tail].is_none(), "tail slot {tail} occupied");
        self.slots[tail] = Some(entry);
        self.len += 1;
        self.total_pushed += 1;
        self.high_watermark = self.high_watermark.max(self.len);
        Ok(())
    }

    /// Removes and returns the oldest entry.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }

        let entry = self.slots[self.head].take();
        debug_assert!(entry.is_some(), "head slot {} empty", self.head);
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        self.total_popped += 1;
        entry
    }

    /// Returns the oldest entry without removing it.
    #[must_use]
    pub fn front(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].as_ref()
    }

    /// Iterates over waiting entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        (0..self.len).filter_map(move |i| self.slots[(self.head + i) % self.capacity()].as_ref())
    }

    /// Returns ring statistics.
    #[must_use]
    pub fn stats(&self) -> RingStats {
        RingStats {
            len: self.len,
            capacity: self.capacity(),
            total_pushed: self.total_pushed,
            total_popped: self.total_popped,
            high_watermark: self.high_watermark,
        }
    }
}
