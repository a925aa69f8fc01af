//! avrbench desktop frontend.
//!
//! Runs AVR firmware against virtual hardware and reports the firmware's
//! return value as the process exit status. With `-hw` peripherals a
//! window shows their live state; without any, the run is headless and
//! blocks until the firmware halts.
//!
//! ```text
//! avrbench -f firmware.elf -c 16000000 -m atmega328p -hw hd44780
//! ```

mod draw;

use avrbench_core::{
    session, ControlEvent, DeviceKind, FrameState, Frontend, SessionConfig, SessionError,
};
use minifb::{Key, Scale, ScaleMode, Window, WindowOptions};
use std::env;
use std::path::PathBuf;
use std::process;

fn usage(program: &str) {
    eprintln!(
        "Usage: {} -f firmware.elf [-c hz] [-m mcu] [-g] [-r fps] [-hw {{hd44780|ssd1306|led}}]...",
        program
    );
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -f <path>   firmware image (ELF or Intel HEX), required");
    eprintln!("  -m <name>   target device override (atmega328p, atmega32u4, atmega168)");
    eprintln!("  -c <hz>     clock frequency (default 16000000)");
    eprintln!("  -g          bind the remote debug endpoint on port 1234");
    eprintln!("  -r <fps>    render rate, 24-64 (default 32)");
    eprintln!("  -hw <name>  attach a peripheral (repeatable)");
    eprintln!();
    eprintln!("Window keys: Esc or Q = quit");
}

fn parse_args(args: &[String]) -> Result<SessionConfig, String> {
    let mut config = SessionConfig::default();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-f" => {
                i += 1;
                config.firmware = args.get(i).map(PathBuf::from);
            }
            "-m" => {
                i += 1;
                config.device = args.get(i).cloned();
            }
            "-c" => {
                i += 1;
                config.frequency = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .ok_or("-c needs a frequency in Hz")?;
            }
            "-r" => {
                i += 1;
                config.fps = args
                    .get(i)
                    .and_then(|s| s.parse().ok())
                    .ok_or("-r needs a rate in Hz")?;
            }
            "-g" => config.debug = true,
            "-hw" => {
                i += 1;
                let name = args.get(i).map(String::as_str).unwrap_or("");
                match DeviceKind::parse(name) {
                    Some(kind) => config.hardware.push(kind),
                    None => return Err(format!("unknown hardware: {}", name)),
                }
            }
            other => {
                // Best-effort parsing: report and carry on
                log::warn!("unknown argument {}", other);
            }
        }
        i += 1;
    }
    if config.firmware.is_none() {
        return Err("firmware must be provided using -f".into());
    }
    Ok(config)
}

/// minifb-backed frontend: one window with a stacked region per device.
/// Frame pacing comes from the window's target FPS, applied while
/// presenting; `next_event` only polls for quit.
struct MinifbFrontend {
    window: Window,
    buffer: Vec<u32>,
    width: usize,
    regions: Vec<draw::Region>,
}

impl MinifbFrontend {
    fn new(kinds: &[DeviceKind], fps: u32) -> Result<Self, SessionError> {
        let (regions, width, height) = draw::layout(kinds);
        let mut window = Window::new(
            "avrbench",
            width,
            height,
            WindowOptions {
                scale: Scale::X1,
                scale_mode: ScaleMode::AspectRatioStretch,
                resize: true,
                ..Default::default()
            },
        )
        .map_err(|e| SessionError::Frontend(e.to_string()))?;
        window.set_target_fps(fps as usize);
        Ok(MinifbFrontend { window, buffer: vec![0; width * height], width, regions })
    }
}

impl Frontend for MinifbFrontend {
    fn next_event(&mut self) -> ControlEvent {
        if !self.window.is_open()
            || self.window.is_key_down(Key::Escape)
            || self.window.is_key_down(Key::Q)
        {
            ControlEvent::Quit
        } else {
            ControlEvent::FrameTick
        }
    }

    fn present(&mut self, frame: &FrameState) {
        draw::draw_frame(&mut self.buffer, self.width, &self.regions, &frame.frames);
        let height = self.buffer.len() / self.width;
        if let Err(e) = self.window.update_with_buffer(&self.buffer, self.width, height) {
            log::warn!("window update failed: {}", e);
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() <= 1 {
        usage(&args[0]);
        process::exit(1);
    }

    let config = match parse_args(&args) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("avrbench: {}", msg);
            process::exit(1);
        }
    };

    let fps = config.fps;
    let result = session::run(config, |kinds| {
        MinifbFrontend::new(kinds, fps).map(|f| Box::new(f) as Box<dyn Frontend>)
    });

    match result {
        Ok(code) => process::exit(i32::from(code)),
        Err(e) => {
            eprintln!("avrbench: {}", e);
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("avrbench")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_full_command_line() {
        let config = parse_args(&args(&[
            "-f", "prog.elf", "-m", "atmega32u4", "-c", "8000000", "-g", "-hw", "ssd1306",
            "-hw", "led",
        ]))
        .unwrap();
        assert_eq!(config.firmware.as_deref(), Some(std::path::Path::new("prog.elf")));
        assert_eq!(config.device.as_deref(), Some("atmega32u4"));
        assert_eq!(config.frequency, 8_000_000);
        assert!(config.debug);
        assert_eq!(config.hardware, vec![DeviceKind::Ssd1306, DeviceKind::Led]);
    }

    #[test]
    fn test_firmware_is_required() {
        assert!(parse_args(&args(&["-m", "atmega328p"])).is_err());
    }

    #[test]
    fn test_unknown_hardware_is_fatal() {
        let err = parse_args(&args(&["-f", "a.hex", "-hw", "nokia5110"])).unwrap_err();
        assert!(err.contains("unknown hardware"));
    }

    #[test]
    fn test_unknown_flag_is_tolerated() {
        let config = parse_args(&args(&["-f", "a.hex", "--verbose"])).unwrap();
        assert_eq!(config.firmware.as_deref(), Some(std::path::Path::new("a.hex")));
    }

    #[test]
    fn test_defaults() {
        let config = parse_args(&args(&["-f", "a.hex"])).unwrap();
        assert_eq!(config.frequency, avrbench_core::DEFAULT_FREQUENCY);
        assert!(!config.debug);
        assert!(config.hardware.is_empty());
    }
}
