//! Session Model
//!
//! Data types describing one user-initiated measurement: the acquisition
//! state machine's states, the acquisition method, and the instructional
//! text keyed by method.

use serde::{Deserialize, Serialize};

/// States of the acquisition state machine.
///
/// The happy path is `Idle → Countdown → Measuring → Analyzing → Result`;
/// `Error` is reachable from every state on a fatal device failure.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementState {
    #[default]
    Idle,
    Countdown,
    Measuring,
    Analyzing,
    Result,
    Error,
}

impl MeasurementState {
    /// Transition legality table.
    ///
    /// `Error` is accepting from anywhere; leaving `Error` requires a full
    /// re-initialization back to `Idle`.
    pub fn can_advance_to(self, next: MeasurementState) -> bool {
        use MeasurementState::*;
        matches!(
            (self, next),
            (Idle, Countdown)
                | (Countdown, Measuring)
                | (Measuring, Analyzing)
                | (Analyzing, Result)
                | (Result, Idle)
                | (Error, Idle)
                | (_, Error)
        )
    }
}

/// How the signal is acquired.
///
/// `Finger` needs a controllable light next to the lens; devices without one
/// fall back to `Face`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementMethod {
    Finger,
    #[default]
    Face,
}

/// Instructional text and icon shown while waiting for the user to start.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Instructions {
    pub icon: &'static str,
    pub title: &'static str,
    pub detail: &'static str,
}

impl MeasurementMethod {
    pub fn instructions(&self) -> Instructions {
        match self {
            MeasurementMethod::Finger => Instructions {
                icon: "☝",
                title: "Place your finger on the back camera.",
                detail: "Cover the camera and light completely.",
            },
            MeasurementMethod::Face => Instructions {
                icon: "🙂",
                title: "Position your face in the frame.",
                detail: "Stay in a well-lit room and hold still.",
            },
        }
    }
}
