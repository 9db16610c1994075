//! This module defines the read only API for interacting with the models.
//! It provides the interfaces the presentation layer subscribes to: camera
//! devices and capabilities, and the live measurement session.

use std::{fmt::Debug, sync::Arc};
use tokio::sync::RwLock;

use crate::model::{
    camera::{CameraCapabilities, DeviceDescriptor},
    session::{Instructions, MeasurementMethod, MeasurementState},
};

/// `CameraModelApi` trait.
///
/// Read-only view of the frame source: enumerated devices, the active
/// device and its capability snapshot.
pub trait CameraModelApi: Debug + Send + Sync {
    /// The enumerated camera devices, in stable backend order.
    fn get_devices(&self) -> &[DeviceDescriptor];

    /// The currently opened device, if any.
    fn get_active_device(&self) -> Option<DeviceDescriptor>;

    /// Capability snapshot of the active device; refreshed on every device
    /// change.
    fn get_capabilities(&self) -> Option<CameraCapabilities>;

    /// Whether the frame pump is currently running.
    fn is_streaming(&self) -> bool;
}

/// `SessionModelApi` trait.
///
/// Read-only view of one measurement session: everything the presentation
/// layer renders, with no rendering concern below it.
pub trait SessionModelApi: Debug + Send + Sync {
    /// Current state of the acquisition state machine.
    fn get_state(&self) -> MeasurementState;

    /// The acquisition method chosen from the device capabilities.
    fn get_method(&self) -> MeasurementMethod;

    /// Instructional text keyed by the acquisition method.
    fn get_instructions(&self) -> Instructions;

    /// Remaining countdown seconds.
    fn get_countdown(&self) -> u8;

    /// Measurement progress in percent (0–100).
    fn get_progress(&self) -> f64;

    /// Rolling-average BPM for the live readout, once peaks were accepted.
    fn get_live_bpm(&self) -> Option<u32>;

    /// Finalized BPM; `None` in the result state means no reliable reading.
    fn get_final_bpm(&self) -> Option<u32>;

    /// A non-fatal, user-visible notice (e.g. light fallback).
    fn get_notice(&self) -> Option<&str>;

    /// The persistent error message while in the error state.
    fn get_error(&self) -> Option<&str>;

    /// The buffered signal as `[elapsed seconds, intensity]` points for
    /// plotting.
    fn get_signal_trace(&self) -> Vec<[f64; 2]>;
}

pub type ModelHandle<T> = Arc<RwLock<T>>;
