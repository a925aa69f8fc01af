//! Virtual peripheral device models.
//!
//! - [`hd44780::Hd44780`] — 20×4 character LCD on a 4-bit bidirectional bus
//! - [`ssd1306::Ssd1306`] — 128×64 monochrome OLED on the SPI bus
//! - [`led::Led`] — single status LED on one port bit
//!
//! Every model implements [`DeviceModel`]: it reacts to pin-value
//! notifications (and may emit values back onto its own pins, e.g. the
//! LCD's busy-flag read-back) and produces a [`DeviceFrame`] snapshot of
//! its visible state for the render bridge. Models are mutated only by the
//! execution loop through signal propagation and read only by the render
//! bridge, each behind its own mutex.

pub mod hd44780;
pub mod led;
pub mod ssd1306;

use std::sync::{Arc, Mutex};

use crate::engine::{port_line, PinEvent, LINE_SPI};
use crate::error::WiringError;
use crate::render::DeviceFrame;
use crate::signal::{Direction, NodeId, Pin, SignalGraph};

/// A peripheral model wired into the signal graph.
pub trait DeviceModel: Send {
    /// A wired pin changed to `value`. Values the device drives onto its
    /// own pins in response are appended to `out`.
    fn pin_changed(&mut self, line: u16, value: u32, out: &mut Vec<PinEvent>);

    /// Snapshot of the visible state for rendering. Takes `&mut self` so
    /// models can drain per-frame journals (LED edges).
    fn frame(&mut self) -> DeviceFrame;
}

/// Shared handle used by both the execution loop and the render bridge.
pub type SharedDevice = Arc<Mutex<dyn DeviceModel>>;

/// The peripherals this harness knows how to attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Hd44780,
    Ssd1306,
    Led,
}

impl DeviceKind {
    /// Parse a `-hw` argument value.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "hd44780" => Some(DeviceKind::Hd44780),
            "ssd1306" => Some(DeviceKind::Ssd1306),
            "led" => Some(DeviceKind::Led),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Hd44780 => "hd44780",
            DeviceKind::Ssd1306 => "ssd1306",
            DeviceKind::Led => "led",
        }
    }
}

/// An attached peripheral: kind, graph node, and the shared model.
pub struct Peripheral {
    pub kind: DeviceKind,
    pub node: NodeId,
    pub model: SharedDevice,
}

// `model` is a `dyn DeviceModel` trait object and cannot be derived; format it
// as an opaque placeholder so `Peripheral` satisfies `Debug` (needed by tests
// that `.unwrap_err()` an `attach` result).
impl std::fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peripheral")
            .field("kind", &self.kind)
            .field("node", &self.node)
            .field("model", &"<dyn DeviceModel>")
            .finish()
    }
}

/// Instantiate a peripheral and wire it into the graph as node `node`.
///
/// Wiring tables follow the reference board layout:
/// - HD44780: data lines D4–D7 on port B0–B3 (bidirectional), RS on B4,
///   E on B5, RW on B6.
/// - SSD1306: byte stream from the SPI data register, chip-select on B4,
///   data/instruction on B1, reset on B3.
/// - LED: port B5.
///
/// Attaching two devices that claim the same core pin (e.g. the LCD's E
/// line and the LED both on B5) fails with a duplicate-sink error.
pub fn attach(
    kind: DeviceKind,
    graph: &mut SignalGraph,
    node: NodeId,
) -> Result<Peripheral, WiringError> {
    let model: SharedDevice = match kind {
        DeviceKind::Hd44780 => {
            for i in 0..4u16 {
                let port = Pin::core(port_line('B', i as u8));
                let data = Pin::device(node, hd44780::LINE_D4 + i);
                // Data lines are bidirectional: write path and busy-flag
                // read-back path.
                graph.connect(port, data, Direction::CoreToDevice)?;
                graph.connect(data, port, Direction::DeviceToCore)?;
            }
            graph.connect(
                Pin::core(port_line('B', 4)),
                Pin::device(node, hd44780::LINE_RS),
                Direction::CoreToDevice,
            )?;
            graph.connect(
                Pin::core(port_line('B', 5)),
                Pin::device(node, hd44780::LINE_E),
                Direction::CoreToDevice,
            )?;
            graph.connect(
                Pin::core(port_line('B', 6)),
                Pin::device(node, hd44780::LINE_RW),
                Direction::CoreToDevice,
            )?;
            Arc::new(Mutex::new(hd44780::Hd44780::new(20, 4)))
        }
        DeviceKind::Ssd1306 => {
            graph.connect(
                Pin::core(LINE_SPI),
                Pin::device(node, ssd1306::LINE_SPI_IN),
                Direction::CoreToDevice,
            )?;
            graph.connect(
                Pin::core(port_line('B', 4)),
                Pin::device(node, ssd1306::LINE_CS),
                Direction::CoreToDevice,
            )?;
            graph.connect(
                Pin::core(port_line('B', 1)),
                Pin::device(node, ssd1306::LINE_DC),
                Direction::CoreToDevice,
            )?;
            graph.connect(
                Pin::core(port_line('B', 3)),
                Pin::device(node, ssd1306::LINE_RESET),
                Direction::CoreToDevice,
            )?;
            Arc::new(Mutex::new(ssd1306::Ssd1306::new()))
        }
        DeviceKind::Led => {
            graph.connect(
                Pin::core(port_line('B', 5)),
                Pin::device(node, led::LINE_IN),
                Direction::CoreToDevice,
            )?;
            Arc::new(Mutex::new(led::Led::new()))
        }
    };

    Ok(Peripheral { kind, node, model })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind() {
        assert_eq!(DeviceKind::parse("hd44780"), Some(DeviceKind::Hd44780));
        assert_eq!(DeviceKind::parse("ssd1306"), Some(DeviceKind::Ssd1306));
        assert_eq!(DeviceKind::parse("led"), Some(DeviceKind::Led));
        assert_eq!(DeviceKind::parse("nokia"), None);
    }

    #[test]
    fn test_lcd_and_led_conflict_on_b5() {
        let mut graph = SignalGraph::new();
        attach(DeviceKind::Hd44780, &mut graph, 1).unwrap();
        let err = attach(DeviceKind::Led, &mut graph, 2).unwrap_err();
        assert!(matches!(err, WiringError::DuplicateSink { .. }));
    }

    #[test]
    fn test_oled_and_led_coexist() {
        let mut graph = SignalGraph::new();
        attach(DeviceKind::Ssd1306, &mut graph, 1).unwrap();
        attach(DeviceKind::Led, &mut graph, 2).unwrap();
        assert_eq!(graph.wire_count(), 5);
    }
}
