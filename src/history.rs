//! Fixed-capacity history buffers.

use nalgebra::{Point3, Vector3};

/// Ring buffer with O(1) push; the oldest element is evicted when full.
///
/// Storage is allocated once at construction and never grows.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    capacity: usize,
    /// Index of the oldest element once the buffer has wrapped
    head: usize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create an empty buffer
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Ring buffer capacity must be greater than 0");
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Append a value, returning the evicted oldest value when full
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            return None;
        }
        let evicted = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.len() == self.capacity
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Element `index` counting from the oldest
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.slots.len() {
            return None;
        }
        self.slots.get((self.head + index) % self.slots.len())
    }

    /// Most recently pushed element
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        (0..self.slots.len()).map(move |i| &self.slots[(self.head + i) % self.slots.len()])
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }
}

/// One processed frame as recorded for quality scoring
#[derive(Debug, Clone, PartialEq)]
pub struct PoseRecord {
    pub timestamp: f64,
    /// Unfiltered pose position
    pub raw_position: Point3<f64>,
    /// Filtered position before the configured offset
    pub position: Point3<f64>,
    /// Filtered rotation, `(roll, pitch, yaw)` degrees
    pub rotation: Vector3<f64>,
    pub scale: f64,
    pub confidence: f64,
}

/// Bounded per-frame history of raw and filtered poses
#[derive(Debug, Clone)]
pub struct TrackingHistory {
    records: RingBuffer<PoseRecord>,
}

impl TrackingHistory {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: RingBuffer::new(capacity),
        }
    }

    pub fn push(&mut self, record: PoseRecord) {
        self.records.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&PoseRecord> {
        self.records.latest()
    }

    /// Records from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &PoseRecord> + ExactSizeIterator + '_ {
        self.records.iter()
    }

    /// The newest `count` records, oldest first
    #[must_use]
    pub fn recent(&self, count: usize) -> Vec<&PoseRecord> {
        let skip = self.records.len().saturating_sub(count);
        self.records.iter().skip(skip).collect()
    }

    /// Copy of the whole history, oldest first
    #[must_use]
    pub fn to_vec(&self) -> Vec<PoseRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Drop the history and start over with a new capacity
    pub fn resize(&mut self, capacity: usize) {
        if capacity != self.records.capacity() {
            let kept = self.recent(capacity).into_iter().cloned().collect::<Vec<_>>();
            self.records = RingBuffer::new(capacity);
            for record in kept {
                self.records.push(record);
            }
        }
    }
}
