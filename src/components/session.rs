//! Measurement Session Component
//!
//! The aggregate owning all per-measurement state: the sliding signal
//! buffer, the peak detector, the rolling BPM estimate and the acquisition
//! state machine bookkeeping. One instance exists per user-initiated
//! measurement; it is reset on "measure again" and torn down with the
//! controller.

use crate::{
    api::{
        controller::SessionApi,
        model::SessionModelApi,
    },
    core::constants::COUNTDOWN_SECONDS,
    math::signal::{moving_average, BpmEstimator, DetectorConfig, PeakDetector},
    model::{
        session::{Instructions, MeasurementMethod, MeasurementState},
        signal::{Sample, SignalBuffer},
    },
};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{info, trace};

/// Represents the measurement session, managing signal data and the state
/// machine position.
#[derive(Debug, Clone)]
pub struct SessionData {
    state: MeasurementState,
    method: MeasurementMethod,
    countdown: u8,
    progress: f64,
    buffer: SignalBuffer,
    detector: PeakDetector,
    estimator: BpmEstimator,
    live_bpm: Option<u32>,
    final_bpm: Option<u32>,
    notice: Option<String>,
    error: Option<String>,
    detector_config: DetectorConfig,
}

impl Default for SessionData {
    fn default() -> Self {
        Self::with_config(DetectorConfig::default())
    }
}

impl SessionData {
    pub fn with_config(config: DetectorConfig) -> Self {
        Self {
            state: MeasurementState::Idle,
            method: MeasurementMethod::default(),
            countdown: COUNTDOWN_SECONDS,
            progress: 0.0,
            buffer: SignalBuffer::default(),
            detector: PeakDetector::new(config),
            estimator: BpmEstimator::default(),
            live_bpm: None,
            final_bpm: None,
            notice: None,
            error: None,
            detector_config: config,
        }
    }
}

#[async_trait]
impl SessionApi for SessionData {
    async fn reset(&mut self) -> Result<()> {
        self.buffer.reset();
        self.detector.reset();
        self.estimator.reset();
        self.countdown = COUNTDOWN_SECONDS;
        self.progress = 0.0;
        self.live_bpm = None;
        self.final_bpm = None;
        self.notice = None;
        Ok(())
    }

    async fn transition(&mut self, next: MeasurementState) -> Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(anyhow!(
                "illegal state transition {:?} -> {:?}",
                self.state,
                next
            ));
        }
        trace!("session state {:?} -> {:?}", self.state, next);
        if next == MeasurementState::Idle {
            self.error = None;
        }
        self.state = next;
        Ok(())
    }

    async fn fail(&mut self, message: String) -> Result<()> {
        info!("session failed: {}", message);
        self.error = Some(message);
        self.state = MeasurementState::Error;
        Ok(())
    }

    async fn set_method(&mut self, method: MeasurementMethod) -> Result<()> {
        self.method = method;
        Ok(())
    }

    async fn set_notice(&mut self, notice: Option<String>) -> Result<()> {
        self.notice = notice;
        Ok(())
    }

    async fn set_countdown(&mut self, remaining: u8) -> Result<()> {
        self.countdown = remaining;
        Ok(())
    }

    async fn set_progress(&mut self, percent: f64) -> Result<()> {
        self.progress = percent.clamp(0.0, 100.0);
        Ok(())
    }

    async fn record_sample(&mut self, sample: Sample) -> Result<()> {
        if self.state != MeasurementState::Measuring {
            // The pump may still deliver a frame or two across a
            // transition.
            trace!("sample outside measuring state dropped");
            return Ok(());
        }
        self.buffer.push(sample);
        let smoothed = moving_average(
            &self.buffer.snapshot(),
            self.detector_config.smoothing_window,
        );
        if let Some(bpm) = self.detector.evaluate(&smoothed) {
            if self.estimator.accept(bpm) {
                self.live_bpm = self.estimator.live();
            }
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.final_bpm = self.estimator.finalize();
        match self.final_bpm {
            Some(bpm) => info!("measurement finalized at {} BPM", bpm),
            None => info!("measurement finalized without a reliable reading"),
        }
        Ok(())
    }
}

impl SessionModelApi for SessionData {
    fn get_state(&self) -> MeasurementState {
        self.state
    }

    fn get_method(&self) -> MeasurementMethod {
        self.method
    }

    fn get_instructions(&self) -> Instructions {
        self.method.instructions()
    }

    fn get_countdown(&self) -> u8 {
        self.countdown
    }

    fn get_progress(&self) -> f64 {
        self.progress
    }

    fn get_live_bpm(&self) -> Option<u32> {
        self.live_bpm
    }

    fn get_final_bpm(&self) -> Option<u32> {
        self.final_bpm
    }

    fn get_notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    fn get_error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn get_signal_trace(&self) -> Vec<[f64; 2]> {
        self.buffer
            .snapshot()
            .iter()
            .map(|s| [s.elapsed.as_seconds_f64(), s.value])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::ASSUMED_FPS;
    use time::Duration;

    fn sample_at(tick: usize, value: f64) -> Sample {
        Sample::new(
            Duration::seconds_f64(tick as f64 / ASSUMED_FPS as f64),
            value,
        )
    }

    async fn advance_to_measuring(session: &mut SessionData) {
        session.transition(MeasurementState::Countdown).await.unwrap();
        session.transition(MeasurementState::Measuring).await.unwrap();
    }

    #[test]
    fn test_default_session() {
        let session = SessionData::default();
        assert_eq!(session.get_state(), MeasurementState::Idle);
        assert_eq!(session.get_method(), MeasurementMethod::Face);
        assert_eq!(session.get_countdown(), COUNTDOWN_SECONDS);
        assert_eq!(session.get_live_bpm(), None);
        assert_eq!(session.get_final_bpm(), None);
        assert!(session.get_signal_trace().is_empty());
    }

    #[tokio::test]
    async fn test_illegal_transition_is_rejected() {
        let mut session = SessionData::default();
        assert!(session.transition(MeasurementState::Measuring).await.is_err());
        assert!(session.transition(MeasurementState::Result).await.is_err());
        assert_eq!(session.get_state(), MeasurementState::Idle);
        assert!(session.transition(MeasurementState::Countdown).await.is_ok());
    }

    #[tokio::test]
    async fn test_fail_from_any_state_and_recover_via_idle() {
        let mut session = SessionData::default();
        advance_to_measuring(&mut session).await;
        session.fail("camera lost".to_string()).await.unwrap();
        assert_eq!(session.get_state(), MeasurementState::Error);
        assert_eq!(session.get_error(), Some("camera lost"));
        // Recovery requires going back through idle.
        assert!(session.transition(MeasurementState::Countdown).await.is_err());
        session.transition(MeasurementState::Idle).await.unwrap();
        assert_eq!(session.get_error(), None);
    }

    #[tokio::test]
    async fn test_samples_outside_measuring_are_dropped() {
        let mut session = SessionData::default();
        session.record_sample(sample_at(0, 128.0)).await.unwrap();
        assert!(session.get_signal_trace().is_empty());
    }

    #[tokio::test]
    async fn test_constant_signal_yields_unreliable_reading() {
        let mut session = SessionData::default();
        advance_to_measuring(&mut session).await;
        for tick in 0..(15 * ASSUMED_FPS) {
            session.record_sample(sample_at(tick, 128.0)).await.unwrap();
        }
        assert_eq!(session.get_live_bpm(), None);
        session.transition(MeasurementState::Analyzing).await.unwrap();
        session.finalize().await.unwrap();
        session.transition(MeasurementState::Result).await.unwrap();
        assert_eq!(session.get_final_bpm(), None);
    }

    #[tokio::test]
    async fn test_pulsatile_signal_yields_reading() {
        let mut session = SessionData::default();
        advance_to_measuring(&mut session).await;
        for tick in 0..(15 * ASSUMED_FPS) {
            let t = tick as f64 / ASSUMED_FPS as f64;
            let value = 128.0 + 10.0 * (2.0 * std::f64::consts::PI * 1.2 * t).sin();
            session.record_sample(sample_at(tick, value)).await.unwrap();
        }
        let live = session.get_live_bpm().expect("no live bpm") as f64;
        assert!((live - 72.0).abs() <= 5.0);
        session.finalize().await.unwrap();
        let final_bpm = session.get_final_bpm().expect("no final bpm") as f64;
        assert!((final_bpm - 72.0).abs() <= 5.0);
    }

    #[tokio::test]
    async fn test_reset_clears_pipeline_but_not_method() {
        let mut session = SessionData::default();
        session.set_method(MeasurementMethod::Finger).await.unwrap();
        session.set_notice(Some("note".to_string())).await.unwrap();
        advance_to_measuring(&mut session).await;
        for tick in 0..60 {
            session.record_sample(sample_at(tick, 128.0)).await.unwrap();
        }
        session.set_progress(55.0).await.unwrap();
        session.reset().await.unwrap();
        assert!(session.get_signal_trace().is_empty());
        assert_eq!(session.get_progress(), 0.0);
        assert_eq!(session.get_countdown(), COUNTDOWN_SECONDS);
        assert_eq!(session.get_notice(), None);
        assert_eq!(session.get_method(), MeasurementMethod::Finger);
    }

    #[tokio::test]
    async fn test_progress_is_clamped() {
        let mut session = SessionData::default();
        session.set_progress(140.0).await.unwrap();
        assert_eq!(session.get_progress(), 100.0);
        session.set_progress(-3.0).await.unwrap();
        assert_eq!(session.get_progress(), 0.0);
    }
}
