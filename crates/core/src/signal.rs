//! Bidirectional signal graph between core I/O pins and peripheral pins.
//!
//! Replaces raw notify-callback/context-pointer pairs with an owned wire
//! registry keyed by pin identity. A [`Wire`] carries values one way; a
//! bidirectional link (the HD44780 data bus) is registered as two wires.
//!
//! Propagation is synchronous and depth-bounded: delivering to a core pin
//! latches the input and continues from that pin (a port bit is a shared
//! net, so its other listeners see the change), delivering to a device pin
//! runs the device's notification hook and then propagates whatever the
//! device emitted from its own pins. A chain that revisits a pin still on
//! the propagation stack fails with [`WiringError::Cycle`] instead of
//! looping forever.
//!
//! All wiring happens before the execution loop starts; the graph is moved
//! into the loop thread, so late `connect` calls are impossible by
//! construction.

use std::fmt;

use crate::devices::SharedDevice;
use crate::engine::{line_name, CoreEngine};
use crate::error::WiringError;

/// Node index inside one signal graph. Node 0 is always the core.
pub type NodeId = usize;

/// The core's node id.
pub const CORE_NODE: NodeId = 0;

/// Identity of a single-bit or bus-width signal endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pin {
    pub node: NodeId,
    pub line: u16,
}

impl Pin {
    /// A pin on the core, by symbolic line id (see [`crate::engine`]).
    pub fn core(line: u16) -> Self {
        Pin { node: CORE_NODE, line }
    }

    /// A pin on an attached device.
    pub fn device(node: NodeId, line: u16) -> Self {
        Pin { node, line }
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.node == CORE_NODE {
            write!(f, "{}", line_name(self.line))
        } else {
            write!(f, "dev{}:{}", self.node, self.line)
        }
    }
}

// `WiringError` (derived via `thiserror`) has variants with a field named
// `source`, which thiserror treats as the error source and therefore requires
// to implement `std::error::Error`. `Pin` already provides the `Debug` +
// `Display` bounds `Error` needs; this impl satisfies the derive.
impl std::error::Error for Pin {}

/// Propagation direction of a wire, relative to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    CoreToDevice,
    DeviceToCore,
}

/// An ordered source→sink link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wire {
    pub source: Pin,
    pub sink: Pin,
    pub direction: Direction,
}

/// Registration-ordered set of wires.
///
/// Fan-out order follows registration order; this is deterministic and part
/// of the observable contract for devices sensitive to notification order.
#[derive(Default)]
pub struct SignalGraph {
    wires: Vec<Wire>,
}

impl SignalGraph {
    pub fn new() -> Self {
        SignalGraph { wires: Vec::new() }
    }

    /// Register a wire.
    ///
    /// Rejected configurations:
    /// - the direction tag contradicts the endpoint owners,
    /// - the exact same wire registered twice,
    /// - a core source pin already feeding a *different* device in the same
    ///   direction (two peripherals claiming one port bit is a
    ///   configuration mistake, not a priority question).
    pub fn connect(
        &mut self,
        source: Pin,
        sink: Pin,
        direction: Direction,
    ) -> Result<(), WiringError> {
        let direction_ok = match direction {
            Direction::CoreToDevice => source.node == CORE_NODE && sink.node != CORE_NODE,
            Direction::DeviceToCore => source.node != CORE_NODE && sink.node == CORE_NODE,
        };
        if !direction_ok {
            return Err(WiringError::DirectionMismatch { source, sink });
        }

        for wire in &self.wires {
            if wire.source == source && wire.sink == sink {
                return Err(WiringError::DuplicateWire { source, sink });
            }
            if direction == Direction::CoreToDevice
                && wire.direction == Direction::CoreToDevice
                && wire.source == source
                && wire.sink.node != sink.node
            {
                return Err(WiringError::DuplicateSink { source });
            }
        }

        self.wires.push(Wire { source, sink, direction });
        Ok(())
    }

    /// Number of registered wires.
    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    /// Fan a changed pin value out to every wire sourced at `pin`.
    ///
    /// Called by the execution loop for every core pin event of a quantum,
    /// and recursively for values emitted by devices. `devices` is indexed
    /// by `NodeId - 1` in attach order.
    pub fn propagate(
        &self,
        pin: Pin,
        value: u32,
        core: &mut dyn CoreEngine,
        devices: &[SharedDevice],
    ) -> Result<(), WiringError> {
        let mut active = Vec::new();
        self.propagate_from(pin, value, core, devices, &mut active)
    }

    fn propagate_from(
        &self,
        pin: Pin,
        value: u32,
        core: &mut dyn CoreEngine,
        devices: &[SharedDevice],
        active: &mut Vec<Pin>,
    ) -> Result<(), WiringError> {
        if active.contains(&pin) {
            return Err(WiringError::Cycle { pin });
        }
        active.push(pin);

        for wire in self.wires.iter().filter(|w| w.source == pin) {
            if wire.sink.node == CORE_NODE {
                core.set_pin(wire.sink.line, value);
                // The port bit changed; its own listeners see the new level.
                self.propagate_from(wire.sink, value, core, devices, active)?;
            } else {
                let mut emitted = Vec::new();
                {
                    let mut dev = devices[wire.sink.node - 1]
                        .lock()
                        .unwrap_or_else(|e| e.into_inner());
                    dev.pin_changed(wire.sink.line, value, &mut emitted);
                }
                for ev in emitted {
                    self.propagate_from(
                        Pin::device(wire.sink.node, ev.line),
                        ev.value,
                        core,
                        devices,
                        active,
                    )?;
                }
            }
        }

        active.pop();
        Ok(())
    }
}
