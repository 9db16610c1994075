//! Camera Component
//!
//! This module implements the frame-source side of the monitor. It handles
//! device enumeration, opening and switching cameras, capability probing
//! (controllable light), light control, and the frame pump that extracts one
//! intensity sample per frame and publishes it on the event bus.

use crate::api::controller::{CameraApi, CameraDiscovery, FrameGrabber};
use crate::api::model::CameraModelApi;
use crate::core::constants::{ASSUMED_FPS, ROI_SIZE};
use crate::core::events::{AppEvent, CameraEvent, SessionEvent};
use crate::math::signal::roi_mean_red;
use crate::model::camera::{CameraCapabilities, CameraError, DeviceDescriptor, VideoFrame};
use crate::model::signal::Sample;
use anyhow::{anyhow, Result};
use log::{trace, warn};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::Sender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use async_trait::async_trait;

/// Seconds of consecutive not-ready frames after which the device is
/// considered lost.
const STALE_FRAME_LIMIT_SECONDS: usize = 5;

/// Manages the camera and the frame pump.
///
/// # Type Parameters
/// - `C`: Frame grabber type providing its own discovery
///
/// # Fields
/// - `event_bus`: Channel for broadcasting extracted samples and faults
/// - `devices`: Enumerated camera devices, stable backend order
/// - `active`: Currently opened device and its grabber handle
/// - `capabilities`: Capability snapshot of the active device
/// - `pump_handle`: Task handle of the running frame pump
/// - `light_on`: Whether the supplemental light was switched on
#[derive(Debug)]
pub struct CameraComponent<C: FrameGrabber + CameraDiscovery<C> + Debug + 'static> {
    event_bus: Sender<AppEvent>,
    devices: Vec<DeviceDescriptor>,
    active: Option<(DeviceDescriptor, Arc<Mutex<C>>)>,
    capabilities: Option<CameraCapabilities>,
    pump_handle: Option<JoinHandle<()>>,
    light_on: bool,
}

impl<C: FrameGrabber + CameraDiscovery<C> + Debug> Drop for CameraComponent<C> {
    /// Ensures the frame pump does not outlive the component. Device
    /// release happens in `shutdown`; the grabber's own drop stops the
    /// stream as a last resort.
    fn drop(&mut self) {
        if let Some(handle) = &self.pump_handle {
            handle.abort();
        }
    }
}

impl<C: FrameGrabber + CameraDiscovery<C> + Debug> CameraComponent<C> {
    /// Creates a new `CameraComponent` instance.
    ///
    /// # Arguments
    /// - `event_bus`: The event bus for broadcasting application events.
    pub fn new(event_bus: Sender<AppEvent>) -> Self {
        Self {
            event_bus,
            devices: Vec::new(),
            active: None,
            capabilities: None,
            pump_handle: None,
            light_on: false,
        }
    }

    /// Opens the given device and probes its capabilities. Any previously
    /// active device must already be released.
    async fn open_and_probe(&mut self, device: DeviceDescriptor) -> Result<(), CameraError> {
        let mut grabber = C::open_device(&device)?;
        grabber.open()?;
        let capabilities = grabber.capabilities();
        trace!(
            "opened camera '{}' ({}x{} @ {} fps, light: {})",
            device.get_name(),
            capabilities.width,
            capabilities.height,
            capabilities.frame_rate,
            capabilities.has_light
        );
        self.capabilities = Some(capabilities);
        self.active = Some((device, Arc::new(Mutex::new(grabber))));
        Ok(())
    }

    /// Fully releases the active device, switching the light off first.
    async fn release_active(&mut self) {
        if let Some((device, grabber)) = self.active.take() {
            let mut lock = grabber.lock().await;
            if self.light_on {
                let _ = lock.set_light(false);
                self.light_on = false;
            }
            lock.close();
            trace!("released camera '{}'", device.get_name());
        }
        self.capabilities = None;
    }

    /// Frame pump: one scheduling tick per frame at the assumed frame rate.
    ///
    /// Extracts the region-of-interest mean per frame and publishes it as a
    /// sample; not-ready frames are retried silently until the stale limit,
    /// any other failure is published as a fault and ends the pump.
    pub async fn pump_frames(
        grabber: Arc<Mutex<C>>,
        event_bus: Sender<AppEvent>,
    ) {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(
            1_000 / ASSUMED_FPS as u64,
        ));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        let mut stale_frames = 0usize;
        loop {
            ticker.tick().await;
            let result = grabber.lock().await.frame();
            match result {
                Ok(frame) => {
                    stale_frames = 0;
                    if let Some(value) = roi_mean_red(&frame, ROI_SIZE) {
                        let elapsed = time::Duration::seconds_f64(started.elapsed().as_secs_f64());
                        let sample = Sample::new(elapsed, value);
                        if event_bus
                            .send(AppEvent::Session(SessionEvent::RecordSample(sample)))
                            .is_err()
                        {
                            break;
                        }
                    }
                }
                Err(CameraError::FrameNotReady) => {
                    stale_frames += 1;
                    if stale_frames > ASSUMED_FPS * STALE_FRAME_LIMIT_SECONDS {
                        let _ = event_bus.send(AppEvent::Camera(CameraEvent::Fault(
                            "camera stopped delivering frames".to_string(),
                        )));
                        break;
                    }
                }
                Err(e) => {
                    let _ = event_bus.send(AppEvent::Camera(CameraEvent::Fault(e.to_string())));
                    break;
                }
            }
        }
        warn!("frame pump terminated");
    }
}

#[async_trait]
impl<C: FrameGrabber + CameraDiscovery<C> + Debug + 'static> CameraApi for CameraComponent<C> {
    async fn initialize(&mut self) -> Result<(), CameraError> {
        if let Some(handle) = self.pump_handle.take() {
            handle.abort();
        }
        self.release_active().await;
        self.devices = C::enumerate_devices()?;
        let device = self
            .devices
            .first()
            .cloned()
            .ok_or_else(|| CameraError::DeviceUnavailable("no camera devices found".to_string()))?;
        self.open_and_probe(device).await
    }

    async fn select_device(&mut self, device: DeviceDescriptor) -> Result<(), CameraError> {
        if self.pump_handle.is_some() {
            warn!("device switch requested while streaming, ignored");
            return Ok(());
        }
        if self
            .active
            .as_ref()
            .map(|(active, _)| active == &device)
            .unwrap_or(false)
        {
            return Ok(());
        }
        // The previous handle must be fully released before the next one is
        // acquired; holding two camera locks at once is not allowed.
        self.release_active().await;
        self.open_and_probe(device).await
    }

    async fn set_light(&mut self, on: bool) -> Result<(), CameraError> {
        let (_, grabber) = self
            .active
            .as_ref()
            .ok_or(CameraError::LightControlUnsupported)?;
        grabber.lock().await.set_light(on)?;
        self.light_on = on;
        Ok(())
    }

    async fn start_streaming(&mut self) -> Result<()> {
        if self.pump_handle.is_some() {
            return Ok(());
        }
        let (_, grabber) = self
            .active
            .as_ref()
            .ok_or_else(|| anyhow!("no active camera to stream from"))?;
        self.pump_handle = Some(tokio::spawn(Self::pump_frames(
            grabber.clone(),
            self.event_bus.clone(),
        )));
        Ok(())
    }

    async fn stop_streaming(&mut self) -> Result<()> {
        if let Some(handle) = self.pump_handle.take() {
            handle.abort();
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.stop_streaming().await?;
        self.release_active().await;
        Ok(())
    }
}

impl<C: FrameGrabber + CameraDiscovery<C> + Debug + 'static> CameraModelApi for CameraComponent<C> {
    fn get_devices(&self) -> &[DeviceDescriptor] {
        self.devices.as_slice()
    }

    fn get_active_device(&self) -> Option<DeviceDescriptor> {
        self.active.as_ref().map(|(device, _)| device.clone())
    }

    fn get_capabilities(&self) -> Option<CameraCapabilities> {
        self.capabilities
    }

    fn is_streaming(&self) -> bool {
        self.pump_handle.is_some()
    }
}

/// Production frame grabber over the `nokhwa` camera backend.
///
/// The backend exposes no supplemental-light control on any platform, so
/// `set_light` reports `LightControlUnsupported` and the session falls back
/// to the face acquisition method.
pub struct NokhwaGrabber {
    camera: nokhwa::Camera,
    opened: bool,
}

impl Debug for NokhwaGrabber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NokhwaGrabber")
            .field("opened", &self.opened)
            .finish()
    }
}

fn map_backend_error(e: nokhwa::NokhwaError) -> CameraError {
    let message = e.to_string();
    let lowered = message.to_lowercase();
    if lowered.contains("permission") || lowered.contains("denied") || lowered.contains("access") {
        CameraError::PermissionDenied
    } else {
        CameraError::DeviceUnavailable(message)
    }
}

impl FrameGrabber for NokhwaGrabber {
    fn open(&mut self) -> Result<(), CameraError> {
        if !self.opened {
            self.camera.open_stream().map_err(map_backend_error)?;
            self.opened = true;
        }
        Ok(())
    }

    fn frame(&mut self) -> Result<VideoFrame, CameraError> {
        // Decode failures during warm-up are indistinguishable from a frame
        // that is not ready yet; both are retried by the pump.
        let buffer = self.camera.frame().map_err(|_| CameraError::FrameNotReady)?;
        let image = buffer
            .decode_image::<nokhwa::pixel_format::RgbFormat>()
            .map_err(|_| CameraError::FrameNotReady)?;
        Ok(image.into())
    }

    fn capabilities(&self) -> CameraCapabilities {
        let format = self.camera.camera_format();
        CameraCapabilities {
            has_light: false,
            width: format.resolution().width_x,
            height: format.resolution().height_y,
            frame_rate: format.frame_rate(),
        }
    }

    fn set_light(&mut self, _on: bool) -> Result<(), CameraError> {
        Err(CameraError::LightControlUnsupported)
    }

    fn close(&mut self) {
        if self.opened {
            let _ = self.camera.stop_stream();
            self.opened = false;
        }
    }
}

impl CameraDiscovery<NokhwaGrabber> for NokhwaGrabber {
    fn enumerate_devices() -> Result<Vec<DeviceDescriptor>, CameraError> {
        let infos = nokhwa::query(nokhwa::utils::ApiBackend::Auto).map_err(map_backend_error)?;
        Ok(infos
            .iter()
            .enumerate()
            .map(|(i, info)| DeviceDescriptor::new(info.human_name().to_string(), i as u32))
            .collect())
    }

    fn open_device(device: &DeviceDescriptor) -> Result<NokhwaGrabber, CameraError> {
        let requested = nokhwa::utils::RequestedFormat::new::<nokhwa::pixel_format::RgbFormat>(
            nokhwa::utils::RequestedFormatType::AbsoluteHighestFrameRate,
        );
        let camera = nokhwa::Camera::new(
            nokhwa::utils::CameraIndex::Index(device.get_index()),
            requested,
        )
        .map_err(map_backend_error)?;
        Ok(NokhwaGrabber {
            camera,
            opened: false,
        })
    }
}

/// Synthetic pulsatile frame source for running without a camera.
///
/// Generates uniform frames whose red channel follows a sine at the
/// configured frequency plus a little noise; reports a controllable light so
/// the finger path can be exercised end to end.
#[cfg(any(test, feature = "mock"))]
#[derive(Debug)]
pub struct SyntheticGrabber {
    started: Instant,
    freq_hz: f64,
    light_on: bool,
    opened: bool,
}

#[cfg(any(test, feature = "mock"))]
impl SyntheticGrabber {
    pub fn new(freq_hz: f64) -> Self {
        Self {
            started: Instant::now(),
            freq_hz,
            light_on: false,
            opened: false,
        }
    }
}

#[cfg(any(test, feature = "mock"))]
impl Default for SyntheticGrabber {
    fn default() -> Self {
        // 1.2 Hz = 72 BPM.
        Self::new(1.2)
    }
}

#[cfg(any(test, feature = "mock"))]
impl FrameGrabber for SyntheticGrabber {
    fn open(&mut self) -> Result<(), CameraError> {
        self.opened = true;
        Ok(())
    }

    fn frame(&mut self) -> Result<VideoFrame, CameraError> {
        use rand::Rng;
        if !self.opened {
            return Err(CameraError::FrameNotReady);
        }
        let t = self.started.elapsed().as_secs_f64();
        let noise: f64 = rand::thread_rng().gen_range(-0.5..0.5);
        let value = 128.0 + 10.0 * (2.0 * std::f64::consts::PI * self.freq_hz * t).sin() + noise;
        Ok(VideoFrame::uniform(640, 480, value.clamp(0.0, 255.0) as u8))
    }

    fn capabilities(&self) -> CameraCapabilities {
        CameraCapabilities {
            has_light: true,
            width: 640,
            height: 480,
            frame_rate: ASSUMED_FPS as u32,
        }
    }

    fn set_light(&mut self, on: bool) -> Result<(), CameraError> {
        self.light_on = on;
        Ok(())
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

#[cfg(any(test, feature = "mock"))]
impl CameraDiscovery<SyntheticGrabber> for SyntheticGrabber {
    fn enumerate_devices() -> Result<Vec<DeviceDescriptor>, CameraError> {
        Ok(vec![DeviceDescriptor::new(
            "Synthetic pulse source".to_string(),
            0,
        )])
    }

    fn open_device(_device: &DeviceDescriptor) -> Result<SyntheticGrabber, CameraError> {
        Ok(SyntheticGrabber::default())
    }
}
