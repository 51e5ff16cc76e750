// THEORY:
// A short rolling record of what the controller was looking at: the last N
// (angle offset, distance offset) pairs, oldest first. It exists for whoever is
// watching the robot tune itself; the control law never reads it.
//
// Capacity is fixed at construction. The buffer is allocated once and the oldest
// entry is evicted before each push, so it never grows or reallocates.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OffsetSample {
    pub angle_offset_px: f64,
    pub distance_offset_px: f64,
}

#[derive(Debug, Clone)]
pub struct OffsetHistory {
    samples: VecDeque<OffsetSample>,
    capacity: usize,
}

impl OffsetHistory {
    /// `capacity` is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, angle_offset_px: f64, distance_offset_px: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(OffsetSample {
            angle_offset_px,
            distance_offset_px,
        });
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &OffsetSample> {
        self.samples.iter()
    }

    pub fn latest(&self) -> Option<&OffsetSample> {
        self.samples.back()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn to_pairs(&self) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .map(|s| (s.angle_offset_px, s.distance_offset_px))
            .collect()
    }
}
