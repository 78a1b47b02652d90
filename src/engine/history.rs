//! Bounded rolling histories kept by the detector.

use std::collections::VecDeque;
use std::time::Duration;

pub const BEAT_TIME_CAPACITY: usize = 12;
pub const BEAT_ENERGY_CAPACITY: usize = 8;
pub const BAND_LEVEL_CAPACITY: usize = 8;
pub const DELTA_CAPACITY: usize = 40;

/// Fixed-capacity FIFO; pushing into a full buffer evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, value: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + ExactSizeIterator + '_ {
        self.items.iter()
    }

    pub fn last(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Rolling state the detector and tempo estimator read back from.
#[derive(Debug, Clone)]
pub struct BeatHistory {
    /// Stream-relative time of each detected beat.
    pub beat_times: RingBuffer<Duration>,
    /// Smoothed bass level at each detected beat.
    pub beat_energies: RingBuffer<f32>,
    /// Shaped (pre-smoothing) high band level per tick.
    pub high_levels: RingBuffer<f32>,
    /// Smoothed bass change per tick.
    pub bass_deltas: RingBuffer<f32>,
}

impl BeatHistory {
    pub fn new() -> Self {
        Self {
            beat_times: RingBuffer::new(BEAT_TIME_CAPACITY),
            beat_energies: RingBuffer::new(BEAT_ENERGY_CAPACITY),
            high_levels: RingBuffer::new(BAND_LEVEL_CAPACITY),
            bass_deltas: RingBuffer::new(DELTA_CAPACITY),
        }
    }

    pub fn clear(&mut self) {
        self.beat_times.clear();
        self.beat_energies.clear();
        self.high_levels.clear();
        self.bass_deltas.clear();
    }
}

impl Default for BeatHistory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_when_full() {
        let mut ring = RingBuffer::new(3);
        for v in 1..=5 {
            ring.push(v);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.last(), Some(&5));
    }

    #[test]
    #[should_panic(expected = "capacity must be positive")]
    fn zero_capacity_is_rejected() {
        let _ = RingBuffer::<f32>::new(0);
    }

    #[test]
    fn clear_empties_every_queue() {
        let mut history = BeatHistory::new();
        history.beat_times.push(Duration::from_millis(10));
        history.beat_energies.push(0.5);
        history.high_levels.push(0.2);
        history.bass_deltas.push(0.1);
        history.clear();
        assert!(history.beat_times.is_empty());
        assert!(history.beat_energies.is_empty());
        assert!(history.high_levels.is_empty());
        assert!(history.bass_deltas.is_empty());
        assert_eq!(history.bass_deltas.capacity(), DELTA_CAPACITY);
    }
}
