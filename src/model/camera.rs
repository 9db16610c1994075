//! Camera Model
//!
//! This module defines the model and utility structures for managing
//! camera-related data. It provides abstractions for:
//! - Video frames handed from the frame source to the extraction stage
//! - Device descriptors and capability snapshots
//! - The camera failure taxonomy

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the frame source.
///
/// Permission and device failures are fatal to a session; light-control
/// failures are recovered locally by falling back to the no-light
/// acquisition method; `FrameNotReady` is transient and silently retried on
/// the next scheduled tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no usable camera device: {0}")]
    DeviceUnavailable(String),
    #[error("the active device does not expose a controllable light")]
    LightControlUnsupported,
    #[error("could not switch the light: {0}")]
    LightControlFailed(String),
    #[error("frame not ready")]
    FrameNotReady,
}

impl CameraError {
    /// Whether this failure ends the measurement session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::PermissionDenied | CameraError::DeviceUnavailable(_)
        )
    }
}

/// One decoded RGB8 video frame.
///
/// `data` holds `width * height` pixels as packed `[r, g, b]` triplets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
        }
    }

    /// A frame carrying a single intensity in its red channel, used by the
    /// synthetic source and the tests.
    pub fn uniform(width: u32, height: u32, red: u8) -> Self {
        let mut data = vec![0u8; (width * height) as usize * 3];
        for px in data.chunks_exact_mut(3) {
            px[0] = red;
        }
        Self {
            width,
            height,
            data,
        }
    }
}

impl From<image::RgbImage> for VideoFrame {
    fn from(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            data: img.into_raw(),
        }
    }
}

/// Read-only snapshot of what the active device can do.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    /// Whether the device exposes a controllable supplemental light.
    pub has_light: bool,
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

/// Represents a discoverable camera device.
///
/// Carries a human-readable name, the backend enumeration index, and a
/// unique UUID assigned at discovery time for selection bookkeeping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    name: String,
    index: u32,
    uuid: Uuid,
}

impl DeviceDescriptor {
    pub fn new(name: String, index: u32) -> Self {
        Self {
            name,
            index,
            uuid: Uuid::new_v4(),
        }
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_index(&self) -> u32 {
        self.index
    }

    pub fn get_uuid(&self) -> &Uuid {
        &self.uuid
    }
}

impl PartialEq for DeviceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.uuid.eq(&other.uuid)
    }
}
impl Eq for DeviceDescriptor {}
