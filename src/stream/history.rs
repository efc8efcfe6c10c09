use std::collections::VecDeque;

use crate::models::Sample;

/// Number of samples kept for charting
pub const HISTORY_CAPACITY: usize = 10;

/// Fixed-size window of the most recent samples, oldest first.
/// Appending past capacity evicts from the front.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryWindow {
    capacity: usize,
    samples: VecDeque<Sample>,
}

impl Default for HistoryWindow {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
        }
    }

    pub fn append(&mut self, sample: Sample) -> &[Sample] {
        self.samples.push_back(sample);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.samples.make_contiguous()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }

    /// A new window holding only `sensor_id`'s samples, order preserved
    pub fn filter_by_sensor(&self, sensor_id: &str) -> HistoryWindow {
        HistoryWindow {
            capacity: self.capacity,
            samples: self
                .samples
                .iter()
                .filter(|s| s.sensor_id == sensor_id)
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
