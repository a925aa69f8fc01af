//! Session controller: top-level sequencing from configuration to exit
//! code.
//!
//! Order of operations: resolve configuration → load firmware into a
//! stopped core → bind the debug endpoint if requested (the core then stays
//! debugger-held instead of auto-starting) → instantiate and wire every
//! requested peripheral → start the execution loop thread → run the render
//! bridge on the calling thread (if any peripheral was attached) or block
//! until the loop finishes (headless) → take the core back and report the
//! termination result.
//!
//! Peripherals are wired before the loop starts; the graph moves into the
//! loop thread, so no wiring can happen afterwards. Headless sessions
//! never invoke the frontend factory, so no rendering resource exists.

use std::path::PathBuf;

use crate::devices::{attach, DeviceKind, Peripheral, SharedDevice};
use crate::engine::termination_result;
use crate::error::SessionError;
use crate::exec::ExecutionLoop;
use crate::firmware;
use crate::gdb::DebugStub;
use crate::render::{Frontend, RenderBridge, DEFAULT_FPS, MAX_FPS, MIN_FPS};
use crate::signal::SignalGraph;

/// Default simulated clock frequency in Hz.
pub const DEFAULT_FREQUENCY: u32 = 16_000_000;

/// Resolved operator configuration.
#[derive(Debug)]
pub struct SessionConfig {
    /// Firmware image path (ELF or Intel HEX).
    pub firmware: Option<PathBuf>,
    /// Target device override; supersedes image metadata.
    pub device: Option<String>,
    /// Simulated clock frequency in Hz.
    pub frequency: u32,
    /// Bind the remote debug endpoint and start debugger-held.
    pub debug: bool,
    /// Peripherals to attach, in order.
    pub hardware: Vec<DeviceKind>,
    /// Render rate in Hz (only meaningful with peripherals attached).
    pub fps: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            firmware: None,
            device: None,
            frequency: DEFAULT_FREQUENCY,
            debug: false,
            hardware: Vec::new(),
            fps: DEFAULT_FPS,
        }
    }
}

/// Run a full session and return the firmware's 16-bit termination result.
///
/// `make_frontend` is invoked once, and only if at least one peripheral
/// was requested.
pub fn run<F>(config: SessionConfig, make_frontend: F) -> Result<u16, SessionError>
where
    F: FnOnce(&[DeviceKind]) -> Result<Box<dyn Frontend>, SessionError>,
{
    if config.frequency == 0 {
        return Err(SessionError::Configuration(
            "clock frequency must be positive".into(),
        ));
    }
    if !(MIN_FPS..=MAX_FPS).contains(&config.fps) {
        return Err(SessionError::Configuration(format!(
            "render rate must be {}..{} Hz, got {}",
            MIN_FPS, MAX_FPS, config.fps
        )));
    }

    let handle = firmware::load(
        config.firmware.as_deref(),
        config.device.as_deref(),
        config.frequency,
    )?;

    let stub = if config.debug {
        let stub = DebugStub::start(handle.state.clone())
            .map_err(|e| SessionError::Configuration(format!("debug endpoint: {}", e)))?;
        log::info!("core held stopped for the debugger on port {}", stub.port());
        Some(stub)
    } else {
        None
    };

    // Wire all peripherals before simulated time can advance
    let mut graph = SignalGraph::new();
    let mut peripherals: Vec<Peripheral> = Vec::new();
    for (i, &kind) in config.hardware.iter().enumerate() {
        log::info!("attaching {}", kind.name());
        peripherals.push(attach(kind, &mut graph, i + 1)?);
    }
    let shared: Vec<SharedDevice> = peripherals.iter().map(|p| p.model.clone()).collect();

    log::info!("launching firmware");
    let exec = ExecutionLoop::spawn(handle, graph, shared, config.debug);

    let outcome = if peripherals.is_empty() {
        // Headless: block until the loop reaches a terminal state
        exec.join()
    } else {
        let kinds: Vec<DeviceKind> = peripherals.iter().map(|p| p.kind).collect();
        let mut frontend = make_frontend(&kinds)?;
        let bridge = RenderBridge::new(&peripherals);
        bridge.run(frontend.as_mut());
        // Quit requested: stop simulated time, then collect the core
        exec.request_halt();
        exec.join()
    };

    if let Some(stub) = stub {
        stub.stop();
    }

    if let Some(fault) = outcome.fault {
        log::error!("session ended by wiring fault: {}", fault);
    }

    let result = termination_result(outcome.core.as_ref());
    log::info!("return value {}", result);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{ControlEvent, FrameState};
    use std::fs;
    use std::path::PathBuf;

    /// Intel HEX for a list of instruction words, single data record.
    fn hex_image(words: &[u16]) -> String {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        let mut record = vec![bytes.len() as u8, 0, 0, 0];
        record.extend_from_slice(&bytes);
        let sum: u8 = record.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        record.push(sum.wrapping_neg());
        let hex: String = record.iter().map(|b| format!("{:02X}", b)).collect();
        format!(":{}\n:00000001FF\n", hex)
    }

    fn temp_firmware(name: &str, words: &[u16]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("avrbench-{}-{}.hex", name, std::process::id()));
        fs::write(&path, hex_image(words)).unwrap();
        path
    }

    fn no_frontend(_: &[DeviceKind]) -> Result<Box<dyn Frontend>, SessionError> {
        panic!("headless session must not create rendering resources");
    }

    #[test]
    fn test_headless_exit_code() {
        // ldi r24, 7 ; ldi r25, 0 ; cli ; sleep
        let path = temp_firmware("exit7", &[0xE087, 0xE090, 0x94F8, 0x9588]);
        let config = SessionConfig {
            firmware: Some(path.clone()),
            device: Some("atmega328p".into()),
            ..SessionConfig::default()
        };
        let result = run(config, no_frontend).unwrap();
        let _ = fs::remove_file(path);
        assert_eq!(result, 7);
    }

    #[test]
    fn test_missing_firmware_fails_before_threads() {
        let config = SessionConfig {
            firmware: Some(PathBuf::from("/nonexistent/prog.hex")),
            device: Some("atmega328p".into()),
            ..SessionConfig::default()
        };
        let err = run(config, no_frontend).unwrap_err();
        assert!(matches!(err, SessionError::Load { .. }));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let config = SessionConfig {
            device: Some("atmega328p".into()),
            frequency: 0,
            ..SessionConfig::default()
        };
        assert!(matches!(
            run(config, no_frontend),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn test_out_of_range_fps_rejected() {
        let config = SessionConfig {
            device: Some("atmega328p".into()),
            fps: 120,
            ..SessionConfig::default()
        };
        assert!(matches!(
            run(config, no_frontend),
            Err(SessionError::Configuration(_))
        ));
    }

    #[test]
    fn test_conflicting_peripherals_rejected() {
        let path = temp_firmware("conflict", &[0x94F8, 0x9588]);
        let config = SessionConfig {
            firmware: Some(path.clone()),
            device: Some("atmega328p".into()),
            hardware: vec![DeviceKind::Hd44780, DeviceKind::Led],
            ..SessionConfig::default()
        };
        let err = run(config, no_frontend).unwrap_err();
        let _ = fs::remove_file(path);
        assert!(matches!(err, SessionError::Wiring(_)));
    }

    #[test]
    fn test_gui_quit_halts_spinning_firmware() {
        /// Ticks a few frames, then quits.
        struct CountedTicks {
            left: u32,
        }
        impl Frontend for CountedTicks {
            fn next_event(&mut self) -> ControlEvent {
                if self.left == 0 {
                    ControlEvent::Quit
                } else {
                    self.left -= 1;
                    ControlEvent::FrameTick
                }
            }
            fn present(&mut self, frame: &FrameState) {
                assert_eq!(frame.frames.len(), 1);
            }
        }

        // sei ; rjmp .-2: spins forever until the session halts it
        let path = temp_firmware("spin", &[0x9478, 0xCFFF]);
        let config = SessionConfig {
            firmware: Some(path.clone()),
            device: Some("atmega328p".into()),
            hardware: vec![DeviceKind::Led],
            ..SessionConfig::default()
        };
        let result = run(config, |kinds| {
            assert_eq!(kinds, &[DeviceKind::Led]);
            Ok(Box::new(CountedTicks { left: 3 }))
        })
        .unwrap();
        let _ = fs::remove_file(path);
        assert_eq!(result, 0);
    }
}
