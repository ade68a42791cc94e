//! Bounded batch accumulation.

use crate::models::PatientRecord;

/// Buffers normalized records up to a fixed capacity.
///
/// The accumulator owns the in-memory buffer exclusively until a flush
/// hands it back to the caller, bounding memory to `O(B)` records. The
/// caller owns the flush itself: `push` returns the full batch the moment
/// capacity is reached, and the orchestrator does not read further rows
/// until that batch's cascade has settled.
pub struct BatchAccumulator {
    buffer: Vec<PatientRecord>,
    capacity: usize,
}

impl BatchAccumulator {
    /// Create an accumulator with capacity `B >= 1`.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity >= 1);
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append one record. Returns the full batch when the buffer reaches
    /// capacity, transferring ownership out.
    pub fn push(&mut self, record: PatientRecord) -> Option<Vec<PatientRecord>> {
        self.buffer.push(record);
        if self.buffer.len() >= self.capacity {
            Some(std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.capacity),
            ))
        } else {
            None
        }
    }

    /// Drain whatever remains at end-of-stream. May be empty.
    pub fn finish(&mut self) -> Vec<PatientRecord> {
        std::mem::take(&mut self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
