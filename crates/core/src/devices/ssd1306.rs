//! SSD1306 128×64 monochrome OLED display controller emulation.
//!
//! Receives command and data bytes over the SPI byte line, gated by
//! chip-select, with the data/instruction pin deciding how a byte is
//! interpreted. Maintains an internal VRAM of 8-row pages and supports the
//! horizontal addressing mode, column/page address windowing, display
//! on/off, inversion and contrast, which is the command set display libraries
//! actually use. A low reset pin returns the controller to power-on state.

use crate::engine::PinEvent;
use crate::render::DeviceFrame;

use super::DeviceModel;

/// Byte stream from the core's SPI data register.
pub const LINE_SPI_IN: u16 = 0;
/// Chip select, active low.
pub const LINE_CS: u16 = 1;
/// Data/instruction select: 0 = command, 1 = data.
pub const LINE_DC: u16 = 2;
/// Reset, active low.
pub const LINE_RESET: u16 = 3;

/// Display width in pixels.
pub const WIDTH: usize = 128;
/// Display height in pixels.
pub const HEIGHT: usize = 64;
const PAGES: usize = HEIGHT / 8;

#[derive(Debug, Clone, Copy)]
enum CmdState {
    Ready,
    SetColStart,
    SetColEnd,
    SetPageStart,
    SetPageEnd,
    SetContrast,
}

/// SSD1306 128x64 monochrome OLED display controller.
pub struct Ssd1306 {
    /// One byte per (page, column): 8 vertical pixels.
    vram: [u8; WIDTH * PAGES],
    col: u8,
    page: u8,
    col_start: u8,
    col_end: u8,
    page_start: u8,
    page_end: u8,
    inverted: bool,
    display_on: bool,
    pub contrast: u8,
    cmd_state: CmdState,
    /// Remaining parameter bytes to ignore after a one-parameter command.
    cmd_skip: u8,
    cs_low: bool,
    dc_data: bool,
    reset_low: bool,
}

impl Ssd1306 {
    pub fn new() -> Self {
        Ssd1306 {
            vram: [0; WIDTH * PAGES],
            col: 0,
            page: 0,
            col_start: 0,
            col_end: WIDTH as u8 - 1,
            page_start: 0,
            page_end: PAGES as u8 - 1,
            inverted: false,
            display_on: false,
            contrast: 0xCF, // SSD1306 power-on default
            cmd_state: CmdState::Ready,
            cmd_skip: 0,
            cs_low: false,
            dc_data: false,
            reset_low: false,
        }
    }

    fn reset(&mut self) {
        let (cs_low, dc_data, reset_low) = (self.cs_low, self.dc_data, self.reset_low);
        *self = Ssd1306::new();
        self.cs_low = cs_low;
        self.dc_data = dc_data;
        self.reset_low = reset_low;
    }

    fn receive_command(&mut self, byte: u8) {
        if self.cmd_skip > 0 {
            self.cmd_skip -= 1;
            return;
        }

        match self.cmd_state {
            CmdState::SetColStart => {
                self.col_start = byte.min(WIDTH as u8 - 1);
                self.col = self.col_start;
                self.cmd_state = CmdState::SetColEnd;
                return;
            }
            CmdState::SetColEnd => {
                self.col_end = byte.min(WIDTH as u8 - 1);
                self.cmd_state = CmdState::Ready;
                return;
            }
            CmdState::SetPageStart => {
                self.page_start = byte.min(PAGES as u8 - 1);
                self.page = self.page_start;
                self.cmd_state = CmdState::SetPageEnd;
                return;
            }
            CmdState::SetPageEnd => {
                self.page_end = byte.min(PAGES as u8 - 1);
                self.cmd_state = CmdState::Ready;
                return;
            }
            CmdState::SetContrast => {
                self.contrast = byte;
                self.cmd_state = CmdState::Ready;
                return;
            }
            CmdState::Ready => {}
        }

        match byte {
            0x21 => self.cmd_state = CmdState::SetColStart,
            0x22 => self.cmd_state = CmdState::SetPageStart,
            0x81 => self.cmd_state = CmdState::SetContrast,
            0xAE => self.display_on = false,
            0xAF => self.display_on = true,
            0xA6 => self.inverted = false,
            0xA7 => self.inverted = true,
            // Commands that take one parameter byte we don't interpret
            0x20 | // memory addressing mode
            0xA8 | // multiplex ratio
            0xD3 | // display offset
            0xD5 | // display clock divide
            0xD9 | // pre-charge period
            0xDA | // COM pins hardware config
            0xDB | // VCOMH deselect level
            0x8D   // charge pump
            => self.cmd_skip = 1,
            // Single-byte commands with no effect on the snapshot
            0x00..=0x0F | 0x10..=0x1F | 0x40..=0x7F => {}
            0xA0 | 0xA1 | 0xA4 | 0xA5 | 0xC0 | 0xC8 | 0xE3 => {}
            _ => {} // unknown command, ignore
        }
    }

    fn receive_data(&mut self, byte: u8) {
        let col = self.col as usize;
        let page = self.page as usize;
        if col < WIDTH && page < PAGES {
            self.vram[page * WIDTH + col] = byte;
        }

        // Advance the cursor through the addressing window
        self.col += 1;
        if self.col > self.col_end {
            self.col = self.col_start;
            self.page += 1;
            if self.page > self.page_end {
                self.page = self.page_start;
            }
        }
    }
}

impl Default for Ssd1306 {
    fn default() -> Self {
        Ssd1306::new()
    }
}

impl DeviceModel for Ssd1306 {
    fn pin_changed(&mut self, line: u16, value: u32, _out: &mut Vec<PinEvent>) {
        match line {
            LINE_CS => self.cs_low = value == 0,
            LINE_DC => self.dc_data = value != 0,
            LINE_RESET => {
                let low = value == 0;
                if low && !self.reset_low {
                    self.reset();
                }
                self.reset_low = low;
            }
            LINE_SPI_IN => {
                if !self.cs_low || self.reset_low {
                    return;
                }
                let byte = value as u8;
                if self.dc_data {
                    self.receive_data(byte);
                } else {
                    self.receive_command(byte);
                }
            }
            _ => {}
        }
    }

    fn frame(&mut self) -> DeviceFrame {
        let mut pixels = vec![0u8; WIDTH * HEIGHT];
        if self.display_on {
            let bright = self.contrast;
            for page in 0..PAGES {
                for col in 0..WIDTH {
                    let vbyte = self.vram[page * WIDTH + col];
                    for bit in 0..8 {
                        let on = ((vbyte >> bit) & 1 != 0) ^ self.inverted;
                        if on {
                            pixels[(page * 8 + bit) * WIDTH + col] = bright;
                        }
                    }
                }
            }
        }
        DeviceFrame::Oled { width: WIDTH, height: HEIGHT, pixels }
    }
}
