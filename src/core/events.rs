//! Core Events
//!
//! This module defines the events used for communication between the
//! components of the vitals monitor. Events are central to the application's
//! event-driven architecture: user input, timer ticks and extracted samples
//! all travel over one broadcast bus and are dispatched by the application
//! controller.

use anyhow::Result;

use crate::api::controller::SessionApi;
use crate::model::camera::DeviceDescriptor;
use crate::model::signal::Sample;

/// Events originating from the user interface.
#[derive(Clone, Debug, PartialEq)]
pub enum UiInputEvent {
    /// Start a measurement from the idle state.
    StartMeasurement,
    /// Return from the result state to idle, keeping the device setup.
    MeasureAgain,
    /// Switch to another camera device; honored only while idle.
    SelectDevice(DeviceDescriptor),
    /// Re-initialize from scratch after a fatal camera error.
    Retry,
}

/// Events produced by the frame pump for the active session.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    /// One extracted intensity sample.
    RecordSample(Sample),
}

impl SessionEvent {
    /// Forwards the event to the session implementation.
    pub async fn forward_to<T: SessionApi>(self, target: &mut T) -> Result<()> {
        match self {
            SessionEvent::RecordSample(sample) => target.record_sample(sample).await,
        }
    }
}

/// Ticks emitted by the controller-owned timer tasks.
#[derive(Clone, Debug, PartialEq)]
pub enum TimerEvent {
    /// One second of the pre-measurement countdown elapsed.
    CountdownTick,
    /// Progress update during the measurement window, in percent.
    ProgressTick(f64),
    /// The measurement window's hard deadline was reached.
    MeasurementElapsed,
    /// The post-measurement settling delay elapsed.
    AnalysisComplete,
}

/// Faults raised asynchronously by the camera side.
#[derive(Clone, Debug, PartialEq)]
pub enum CameraEvent {
    /// The device failed mid-session; fatal to the measurement.
    Fault(String),
}

/// Enumeration of all application-level events.
///
/// These events drive the interaction between views, the controller and the
/// components.
#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    /// User interactions published by the view layer.
    UiInput(UiInputEvent),
    /// Pipeline data for the active measurement session.
    Session(SessionEvent),
    /// Timer ticks owned by the acquisition controller.
    Timer(TimerEvent),
    /// Camera faults.
    Camera(CameraEvent),
}
