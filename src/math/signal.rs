//! Signal Processing
//!
//! This module contains the photoplethysmography pipeline stages that turn
//! buffered intensity samples into beats per minute: region-of-interest
//! extraction, moving-average smoothing, thresholded peak detection with a
//! refractory period, and the rolling BPM estimate.

use log::trace;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use time::Duration;

use crate::core::constants::{
    ASSUMED_FPS, BPM_MOVING_AVERAGE_SIZE, BPM_PLAUSIBLE_RANGE, MIN_PEAK_DISTANCE_MS,
    SMOOTHING_WINDOW,
};
use crate::model::camera::VideoFrame;
use crate::model::signal::Sample;

/// `roi_mean_red` function.
///
/// Computes the mean of the red channel over a square region of interest
/// centered in the frame.
///
/// # Arguments
/// - `frame`: A decoded RGB8 frame.
/// - `roi_size`: Side length of the square region in pixels.
///
/// # Returns
/// The mean intensity, or `None` while the frame cannot be sampled yet
/// (smaller than the region or not fully decoded). Callers retry on the next
/// tick.
pub fn roi_mean_red(frame: &VideoFrame, roi_size: u32) -> Option<f64> {
    if roi_size == 0 || frame.width < roi_size || frame.height < roi_size {
        return None;
    }
    if frame.data.len() < (frame.width * frame.height) as usize * 3 {
        return None;
    }

    let sx = frame.width / 2 - roi_size / 2;
    let sy = frame.height / 2 - roi_size / 2;
    let mut sum = 0u64;
    for y in sy..sy + roi_size {
        let row = (y * frame.width + sx) as usize * 3;
        for x in 0..roi_size as usize {
            sum += frame.data[row + x * 3] as u64;
        }
    }
    Some(sum as f64 / (roi_size as u64 * roi_size as u64) as f64)
}

/// `moving_average` function.
///
/// Applies a centered moving average to a sample series, producing a
/// smoothed series aligned 1:1 with the input by timestamp.
///
/// # Arguments
/// - `samples`: The raw series, oldest first.
/// - `window`: Size of the averaging window.
///
/// # Returns
/// The smoothed series; windows are truncated at both ends of the input.
pub fn moving_average(samples: &[Sample], window: usize) -> Vec<Sample> {
    if window <= 1 {
        return samples.to_vec();
    }
    let half_floor = window / 2;
    let half_ceil = (window + 1) / 2;
    samples
        .iter()
        .enumerate()
        .map(|(i, sample)| {
            let start = i.saturating_sub(half_floor);
            let end = usize::min(samples.len(), i + half_ceil);
            let slice = &samples[start..end];
            let avg = slice.iter().map(|s| s.value).sum::<f64>() / slice.len() as f64;
            Sample::new(sample.elapsed, avg)
        })
        .collect()
}

/// How a candidate peak must clear the candidate window's statistics.
///
/// Two variants of the detector exist in the wild; the configured default is
/// the fixed ratio above the window mean.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ThresholdStrategy {
    /// Peak value must exceed `mean * ratio`.
    RatioAboveMean(f64),
    /// Peak value must exceed `mean + standard deviation`.
    MeanPlusStdDev,
}

impl Default for ThresholdStrategy {
    fn default() -> Self {
        ThresholdStrategy::RatioAboveMean(1.01)
    }
}

/// Tunables of the smoothing and peak-detection stage.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    pub threshold: ThresholdStrategy,
    /// Centered moving-average window applied before detection.
    pub smoothing_window: usize,
    /// Number of trailing smoothed samples evaluated per tick.
    pub candidate_window: usize,
    /// Minimum history before any evaluation takes place.
    pub min_history: usize,
    /// Refractory period between two accepted peaks.
    pub min_peak_distance: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdStrategy::default(),
            smoothing_window: SMOOTHING_WINDOW,
            candidate_window: ASSUMED_FPS,
            min_history: ASSUMED_FPS,
            min_peak_distance: Duration::milliseconds(MIN_PEAK_DISTANCE_MS),
        }
    }
}

/// Detects local maxima in the smoothed signal and converts peak-to-peak
/// intervals into instantaneous BPM values.
///
/// The candidate window is the trailing second of smoothed samples; its
/// midpoint sample is declared a peak when it is the window maximum and
/// clears the configured threshold. An accepted peak must be separated from
/// the previous one by at least the refractory period; the first accepted
/// peak only anchors the next interval.
#[derive(Clone, Debug, Default)]
pub struct PeakDetector {
    config: DetectorConfig,
    last_peak: Option<Duration>,
}

impl PeakDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            last_peak: None,
        }
    }

    /// Forgets the previous peak; called when a new session starts.
    pub fn reset(&mut self) {
        self.last_peak = None;
    }

    /// Evaluates the smoothed series after a new sample arrived.
    ///
    /// # Arguments
    /// - `smoothed`: The smoothed series, oldest first.
    ///
    /// # Returns
    /// The instantaneous BPM when a new peak-to-peak interval completed,
    /// `None` otherwise.
    pub fn evaluate(&mut self, smoothed: &[Sample]) -> Option<f64> {
        if smoothed.len() < self.config.min_history {
            return None;
        }
        let start = smoothed.len().saturating_sub(self.config.candidate_window);
        let candidates = &smoothed[start..];
        let values = DVector::from_iterator(candidates.len(), candidates.iter().map(|s| s.value));
        let mean = values.mean();
        let threshold = match self.config.threshold {
            ThresholdStrategy::RatioAboveMean(ratio) => mean * ratio,
            ThresholdStrategy::MeanPlusStdDev => mean + values.variance().sqrt(),
        };

        let midpoint = candidates[candidates.len() / 2];
        let is_peak = midpoint.value > threshold
            && candidates.iter().all(|s| s.value <= midpoint.value);
        if !is_peak {
            return None;
        }

        // Intervals are anchored at detection time, i.e. the newest sample's
        // timestamp; the detection lag is a constant half-window, so the
        // intervals still equal the peak-to-peak periods.
        let now = candidates[candidates.len() - 1].elapsed;
        match self.last_peak {
            Some(previous) if now - previous <= self.config.min_peak_distance => None,
            previous => {
                self.last_peak = Some(now);
                previous.map(|p| {
                    let interval_ms = (now - p).as_seconds_f64() * 1000.0;
                    60_000.0 / interval_ms
                })
            }
        }
    }
}

/// Rolling BPM average over the most recent accepted values.
///
/// Implausible values never enter the window; the finalized result is the
/// window mean or the explicit no-reliable-reading outcome.
#[derive(Clone, Debug)]
pub struct BpmEstimator {
    window: VecDeque<f64>,
    capacity: usize,
}

impl Default for BpmEstimator {
    fn default() -> Self {
        Self {
            window: VecDeque::with_capacity(BPM_MOVING_AVERAGE_SIZE),
            capacity: BPM_MOVING_AVERAGE_SIZE,
        }
    }
}

impl BpmEstimator {
    /// Offers an instantaneous BPM value to the rolling window.
    ///
    /// # Returns
    /// `true` if the value was plausible and accepted.
    pub fn accept(&mut self, bpm: f64) -> bool {
        let (low, high) = BPM_PLAUSIBLE_RANGE;
        if bpm <= low || bpm >= high {
            trace!("dropping implausible instantaneous bpm {:.1}", bpm);
            return false;
        }
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(bpm);
        true
    }

    /// The live readout: rounded moving average of the window.
    pub fn live(&self) -> Option<u32> {
        self.mean().map(|m| m.round() as u32)
    }

    /// The end-of-session aggregate.
    ///
    /// # Returns
    /// The rounded window mean, or `None` when the window is empty or the
    /// mean itself is implausible. The caller surfaces this as a failed
    /// measurement, never as a number.
    pub fn finalize(&self) -> Option<u32> {
        let (low, high) = BPM_PLAUSIBLE_RANGE;
        self.mean()
            .filter(|m| *m > low && *m < high)
            .map(|m| m.round() as u32)
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    fn mean(&self) -> Option<f64> {
        if self.window.is_empty() {
            None
        } else {
            Some(self.window.iter().sum::<f64>() / self.window.len() as f64)
        }
    }
}
