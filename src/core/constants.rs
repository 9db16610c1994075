//! Fixed acquisition constants.
//!
//! These values parameterize the whole measurement pipeline and are not
//! user-exposed; the detector-specific knobs live in
//! [`crate::math::signal::DetectorConfig`].

/// Length of one measurement window in milliseconds.
pub const MEASUREMENT_DURATION_MS: u64 = 15_000;
/// Countdown displayed before the measurement window starts.
pub const COUNTDOWN_SECONDS: u8 = 3;
/// Sliding signal window kept for analysis, in seconds.
pub const SIGNAL_BUFFER_SECONDS: usize = 5;
/// Frame rate assumed for buffer sizing and the frame pump cadence.
pub const ASSUMED_FPS: usize = 30;
/// Capacity of the signal buffer in samples.
pub const SIGNAL_BUFFER_SIZE: usize = SIGNAL_BUFFER_SECONDS * ASSUMED_FPS;
/// Refractory period between accepted peaks; 300 ms caps detection at 200 BPM.
pub const MIN_PEAK_DISTANCE_MS: i64 = 300;
/// Rolling window used for the live BPM readout and the final average.
pub const BPM_MOVING_AVERAGE_SIZE: usize = 5;
/// Exclusive range of physiologically plausible BPM values.
pub const BPM_PLAUSIBLE_RANGE: (f64, f64) = (40.0, 200.0);
/// Side length in pixels of the square region of interest.
pub const ROI_SIZE: u32 = 50;
/// Settling delay between the measurement window and the final result.
pub const ANALYSIS_DELAY_MS: u64 = 2_000;
/// Window size of the centered moving average applied before peak detection.
pub const SMOOTHING_WINDOW: usize = 5;
/// Cadence of the measurement progress timer.
pub const PROGRESS_TICK_MS: u64 = 100;
