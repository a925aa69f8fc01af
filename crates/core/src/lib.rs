//! # avrbench-core
//!
//! Co-simulation harness for AVR microcontroller firmware with virtual
//! peripheral hardware (v0.3.0).
//!
//! Runs a simulated core on a background thread, wires its I/O pins to
//! peripheral device models through a bidirectional signal graph, and hands
//! consistent snapshots of device state to a polling renderer. Headless
//! sessions block until the firmware halts and report its return value
//! (r25:r24, the avr-gcc convention) as the process exit status, the
//! contract automated test suites build on.
//!
//! ## Architecture
//!
//! - [`session`] — top-level sequencing: configuration → loader → wiring →
//!   execution loop → render bridge or blocking wait → termination result
//! - [`firmware`] — Intel HEX / AVR ELF image parsing and core resolution
//! - [`engine`] — the [`engine::CoreEngine`] seam, run-state, pin-line
//!   numbering, and the shared run-state cell
//! - [`mcu`] — built-in AVR engine (avr-gcc integer instruction subset,
//!   GPIO ports, SPI output)
//! - [`signal`] — pins, wires, and synchronous depth-bounded propagation
//! - [`devices`] — HD44780 LCD, SSD1306 OLED, and status-LED models
//! - [`exec`] — the execution-loop thread and its testable quantum step
//! - [`render`] — frame snapshots and the frontend event interface
//! - [`gdb`] — remote debug stub (run-state start/stop hook)
//! - [`error`] — fatal error taxonomy
//!
//! ## Threads
//!
//! Exactly two threads matter: the execution loop (the only mutator of
//! simulated time and device state) and the caller's thread (render bridge
//! and quit handling). Device state crosses between them behind per-device
//! mutexes; the run-state crosses through an acquire/release cell that the
//! optional debug endpoint also uses to hold or release the core.

pub mod devices;
pub mod engine;
pub mod error;
pub mod exec;
pub mod firmware;
pub mod gdb;
pub mod mcu;
pub mod render;
pub mod session;
pub mod signal;

pub use devices::DeviceKind;
pub use engine::RunState;
pub use error::{SessionError, WiringError};
pub use render::{ControlEvent, DeviceFrame, FrameState, Frontend};
pub use session::{SessionConfig, DEFAULT_FREQUENCY};
