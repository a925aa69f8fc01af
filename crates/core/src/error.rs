//! Error taxonomy for the harness.
//!
//! Everything that can go wrong before the execution loop starts is an
//! operator-input mistake and surfaces as a [`SessionError`]: reported once
//! and fatal, never retried. After the loop starts the only failure channel
//! is the core's `Crashed` run-state, with one exception: a signal-wiring
//! cycle discovered during propagation ([`WiringError::Cycle`]) aborts the
//! loop cleanly and is reported alongside the termination result.

use std::path::PathBuf;
use thiserror::Error;

use crate::signal::Pin;

/// Fatal session-level errors. All variants abort the session before (or,
/// for `Wiring`, instead of) producing a termination result.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing or contradictory operator input.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The firmware image could not be read or parsed.
    #[error("unable to load firmware from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    /// The target device name matched no supported MCU.
    #[error("unknown mcu device '{0}'")]
    UnknownDevice(String),

    /// Signal-graph misconfiguration detected at wiring or propagation time.
    #[error("signal wiring error: {0}")]
    Wiring(#[from] WiringError),

    /// The rendering frontend could not be brought up.
    #[error("frontend error: {0}")]
    Frontend(String),
}

/// Signal-graph errors. `DuplicateWire`, `DuplicateSink` and
/// `DirectionMismatch` are rejected at `connect` time; `Cycle` is detected
/// at propagation time when a chain revisits a pin already active in the
/// current propagation stack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WiringError {
    /// The exact same wire was registered twice.
    #[error("duplicate wire {source} -> {sink}")]
    DuplicateWire { source: Pin, sink: Pin },

    /// A core pin already feeds a different device in the same direction.
    #[error("core pin {source} is already claimed by another device")]
    DuplicateSink { source: Pin },

    /// The direction tag does not match the endpoint owners.
    #[error("wire {source} -> {sink} contradicts its direction tag")]
    DirectionMismatch { source: Pin, sink: Pin },

    /// A propagation chain revisited a pin that is still being propagated.
    #[error("propagation cycle revisits active pin {pin}")]
    Cycle { pin: Pin },
}
