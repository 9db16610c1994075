//! Signal Model
//!
//! This module defines the raw intensity samples produced by the frame pump
//! and the fixed-capacity sliding buffer that holds the most recent few
//! seconds of them for analysis.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use time::Duration;

use crate::core::constants::SIGNAL_BUFFER_SIZE;

/// One extracted intensity sample.
///
/// `elapsed` is measured from the start of the measurement window on a
/// monotonic clock; samples are immutable once created.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Time elapsed since the measurement window started.
    pub elapsed: Duration,
    /// Mean red-channel intensity over the region of interest.
    pub value: f64,
}

impl Sample {
    pub fn new(elapsed: Duration, value: f64) -> Self {
        Self { elapsed, value }
    }

    /// Elapsed time in milliseconds, the unit all peak arithmetic uses.
    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_seconds_f64() * 1000.0
    }
}

/// Sliding window over the most recent intensity samples.
///
/// Insertion is append-at-tail; once the capacity is reached the oldest
/// sample is evicted first. The buffer is owned exclusively by the active
/// measurement session and cleared at the start of each one.
#[derive(Clone, Debug)]
pub struct SignalBuffer {
    samples: VecDeque<Sample>,
    capacity: usize,
}

impl Default for SignalBuffer {
    fn default() -> Self {
        Self::with_capacity(SIGNAL_BUFFER_SIZE)
    }
}

impl SignalBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends a sample, evicting the oldest one once the window is full.
    pub fn push(&mut self, sample: Sample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// The buffered samples in insertion order, oldest first.
    pub fn snapshot(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clears all buffered samples while keeping the configured capacity.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
