//! Controller Module
//!
//! This module defines the traits and structures for managing the
//! application's core functionalities: the frame source seam, camera
//! control, and the measurement session. It provides a set of asynchronous
//! APIs to handle operations such as opening and switching devices, driving
//! the light, and advancing the acquisition state machine.

use crate::model::camera::{CameraCapabilities, CameraError, DeviceDescriptor, VideoFrame};
use crate::model::session::{MeasurementMethod, MeasurementState};
use crate::model::signal::Sample;
use anyhow::Result;
use async_trait::async_trait;

use super::model::{CameraModelApi, SessionModelApi};

/// FrameGrabber trait
///
/// The hardware seam: one opened camera device delivering decoded frames.
/// The production implementation wraps a platform camera backend; tests use
/// a mock. The trait is synchronous because frame delivery on the backends
/// is; asynchronous orchestration happens a level above, in the camera
/// component.
pub trait FrameGrabber: Send {
    /// Start the device stream. Must be called before the first `frame`.
    fn open(&mut self) -> Result<(), CameraError>;

    /// Fetch the next decoded frame.
    ///
    /// Returns `CameraError::FrameNotReady` while the device warms up; the
    /// caller retries on its next tick instead of treating this as a fault.
    fn frame(&mut self) -> Result<VideoFrame, CameraError>;

    /// Capability snapshot of the opened device.
    fn capabilities(&self) -> CameraCapabilities;

    /// Switch the supplemental light.
    ///
    /// Callers must treat failure as non-fatal and fall back to the
    /// no-light acquisition method.
    fn set_light(&mut self, on: bool) -> Result<(), CameraError>;

    /// Release all device resources. Idempotent; invoked on every exit
    /// path.
    fn close(&mut self);
}

/// CameraDiscovery trait
///
/// Enumeration and construction of frame grabbers, implemented alongside
/// `FrameGrabber` by each backend.
pub trait CameraDiscovery<C: FrameGrabber> {
    /// List the available camera devices in stable backend order.
    fn enumerate_devices() -> Result<Vec<DeviceDescriptor>, CameraError>;

    /// Open a grabber for the given device descriptor.
    fn open_device(device: &DeviceDescriptor) -> Result<C, CameraError>;
}

/// CameraApi trait
///
/// This trait extends the read-only `CameraModelApi` and defines the
/// mutating camera operations: initialization, device switching, light
/// control, and the frame pump feeding the measurement session.
#[async_trait]
pub trait CameraApi: CameraModelApi + Send + Sync {
    /// Enumerate devices and open the default one, probing capabilities.
    async fn initialize(&mut self) -> Result<(), CameraError>;

    /// Release the active device and open the given one instead.
    ///
    /// The previous handle is fully released before the new one is
    /// acquired. Refused (as a logged no-op) while frames are being
    /// pumped.
    async fn select_device(&mut self, device: DeviceDescriptor) -> Result<(), CameraError>;

    /// Switch the supplemental light of the active device.
    async fn set_light(&mut self, on: bool) -> Result<(), CameraError>;

    /// Start the frame pump task publishing extracted samples on the event
    /// bus.
    async fn start_streaming(&mut self) -> Result<()>;

    /// Stop the frame pump task.
    async fn stop_streaming(&mut self) -> Result<()>;

    /// Stop streaming, switch the light off and release the device.
    /// Idempotent.
    async fn shutdown(&mut self) -> Result<()>;
}

/// SessionApi trait
///
/// This trait extends the read-only `SessionModelApi` trait and defines the
/// mutating measurement-session operations used by the acquisition
/// controller.
#[async_trait]
pub trait SessionApi: SessionModelApi {
    /// Clear all per-session state (signal buffer, peak anchor, BPM window,
    /// countdown, progress, notice) while keeping device setup intact.
    async fn reset(&mut self) -> Result<()>;

    /// Advance the acquisition state machine.
    ///
    /// # Errors
    /// When the transition is not in the legality table.
    async fn transition(&mut self, next: MeasurementState) -> Result<()>;

    /// Enter the persistent error state with a user-facing message.
    async fn fail(&mut self, message: String) -> Result<()>;

    /// Set the acquisition method (finger with light vs. face).
    async fn set_method(&mut self, method: MeasurementMethod) -> Result<()>;

    /// Surface a non-fatal notice to the user, or clear it with `None`.
    async fn set_notice(&mut self, notice: Option<String>) -> Result<()>;

    async fn set_countdown(&mut self, remaining: u8) -> Result<()>;

    /// Set the measurement progress in percent (0–100).
    async fn set_progress(&mut self, percent: f64) -> Result<()>;

    /// Record one extracted sample.
    ///
    /// Samples arriving outside the measuring state are dropped silently;
    /// the pump may still be winding down across a transition.
    async fn record_sample(&mut self, sample: Sample) -> Result<()>;

    /// Compute the final BPM from the rolling window, or the
    /// unreliable-reading outcome.
    async fn finalize(&mut self) -> Result<()>;
}
