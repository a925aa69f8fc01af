//! Per-device pixel drawing into the shared window buffer.
//!
//! Each attached peripheral gets a stacked region: the OLED at 2× scale,
//! the LCD drawn with a 5×7 font at 3× scale on the classic fluorescent
//! green backlight, the LED as a blue square that lights when driven high.

use avrbench_core::{DeviceFrame, DeviceKind};

/// LCD palette: backlight, character cell background, text.
const LCD_BACKLIGHT: u32 = 0x00AA00;
const LCD_CELL_BG: u32 = 0x00CC00;
const LCD_TEXT: u32 = 0x000000;
/// LED on color.
const LED_ON: u32 = 0x0000CC;
const LED_OFF: u32 = 0x101018;
/// Window background between device regions.
const BACKGROUND: u32 = 0x202020;

/// LCD geometry the HD44780 model reports.
const LCD_COLS: usize = 20;
const LCD_ROWS: usize = 4;

/// One device's slot in the window.
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Stack one region per device vertically; returns the regions and the
/// total (width, height) of the window.
pub fn layout(kinds: &[DeviceKind]) -> (Vec<Region>, usize, usize) {
    let mut regions = Vec::with_capacity(kinds.len());
    let mut width = 1;
    let mut y = 0;
    for &kind in kinds {
        let (w, h) = match kind {
            DeviceKind::Ssd1306 => (128 * 2, 64 * 2),
            DeviceKind::Hd44780 => ((5 + LCD_COLS * 6) * 3, (5 + LCD_ROWS * 8) * 3),
            DeviceKind::Led => (64, 64),
        };
        regions.push(Region { x: 0, y, width: w, height: h });
        width = width.max(w);
        y += h;
    }
    (regions, width, y.max(1))
}

/// Render one frame's device snapshots into the window buffer.
pub fn draw_frame(
    buffer: &mut [u32],
    stride: usize,
    regions: &[Region],
    frames: &[DeviceFrame],
) {
    buffer.fill(BACKGROUND);
    for (region, frame) in regions.iter().zip(frames) {
        match frame {
            DeviceFrame::Oled { width, height, pixels } => {
                draw_oled(buffer, stride, region, *width, *height, pixels);
            }
            DeviceFrame::Lcd { cols, rows, cells } => {
                draw_lcd(buffer, stride, region, *cols as usize, *rows as usize, cells);
            }
            DeviceFrame::Led { on, edges } => {
                for &edge in edges {
                    log::debug!("led {}", if edge { "on" } else { "off" });
                }
                draw_led(buffer, stride, region, *on);
            }
        }
    }
}

fn put(buffer: &mut [u32], stride: usize, x: usize, y: usize, color: u32) {
    let idx = y * stride + x;
    if x < stride && idx < buffer.len() {
        buffer[idx] = color;
    }
}

/// Fill a scaled rectangle of logical pixels.
fn fill_rect(
    buffer: &mut [u32],
    stride: usize,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
    color: u32,
) {
    for dy in 0..h {
        for dx in 0..w {
            put(buffer, stride, x + dx, y + dy, color);
        }
    }
}

fn draw_oled(
    buffer: &mut [u32],
    stride: usize,
    region: &Region,
    width: usize,
    height: usize,
    pixels: &[u8],
) {
    let scale = (region.width / width).max(1);
    for py in 0..height {
        for px in 0..width {
            let lum = pixels[py * width + px] as u32;
            let color = (lum << 16) | (lum << 8) | lum;
            fill_rect(
                buffer,
                stride,
                region.x + px * scale,
                region.y + py * scale,
                scale,
                scale,
                color,
            );
        }
    }
}

fn draw_lcd(
    buffer: &mut [u32],
    stride: usize,
    region: &Region,
    cols: usize,
    rows: usize,
    cells: &[u8],
) {
    let scale = 3;
    fill_rect(buffer, stride, region.x, region.y, region.width, region.height, LCD_BACKLIGHT);

    for row in 0..rows {
        for col in 0..cols {
            let code = cells.get(row * cols + col).copied().unwrap_or(0x20);
            let cell_x = region.x + (3 + col * 6) * scale;
            let cell_y = region.y + (3 + row * 8) * scale;
            fill_rect(buffer, stride, cell_x, cell_y, 5 * scale, 7 * scale, LCD_CELL_BG);

            let glyph = glyph_for(code);
            for (gx, &column) in glyph.iter().enumerate() {
                for gy in 0..7 {
                    if column & (1 << gy) != 0 {
                        fill_rect(
                            buffer,
                            stride,
                            cell_x + gx * scale,
                            cell_y + gy * scale,
                            scale,
                            scale,
                            LCD_TEXT,
                        );
                    }
                }
            }
        }
    }
}

fn draw_led(buffer: &mut [u32], stride: usize, region: &Region, on: bool) {
    let color = if on { LED_ON } else { LED_OFF };
    // Square with a small margin, like a through-hole LED on a board
    fill_rect(
        buffer,
        stride,
        region.x + 7,
        region.y + 7,
        region.width - 14,
        region.height - 14,
        color,
    );
}

/// Font glyph for a character code. CGRAM codes (0–7) and anything outside
/// the printable range render as blanks.
fn glyph_for(code: u8) -> &'static [u8; 5] {
    const BLANK: [u8; 5] = [0; 5];
    if (0x20..=0x7F).contains(&code) {
        &FONT5X7[(code - 0x20) as usize]
    } else {
        &BLANK
    }
}

/// Classic 5×7 character set, one byte per column, bit 0 = top row.
/// Covers ASCII 0x20–0x7F, matching the HD44780 CGROM's ASCII block.
const FONT5X7: [[u8; 5]; 96] = [
    [0x00, 0x00, 0x00, 0x00, 0x00], // ' '
    [0x00, 0x00, 0x5F, 0x00, 0x00], // '!'
    [0x00, 0x07, 0x00, 0x07, 0x00], // '"'
    [0x14, 0x7F, 0x14, 0x7F, 0x14], // '#'
    [0x24, 0x2A, 0x7F, 0x2A, 0x12], // '$'
    [0x23, 0x13, 0x08, 0x64, 0x62], // '%'
    [0x36, 0x49, 0x55, 0x22, 0x50], // '&'
    [0x00, 0x05, 0x03, 0x00, 0x00], // '\''
    [0x00, 0x1C, 0x22, 0x41, 0x00], // '('
    [0x00, 0x41, 0x22, 0x1C, 0x00], // ')'
    [0x14, 0x08, 0x3E, 0x08, 0x14], // '*'
    [0x08, 0x08, 0x3E, 0x08, 0x08], // '+'
    [0x00, 0x50, 0x30, 0x00, 0x00], // ','
    [0x08, 0x08, 0x08, 0x08, 0x08], // '-'
    [0x00, 0x60, 0x60, 0x00, 0x00], // '.'
    [0x20, 0x10, 0x08, 0x04, 0x02], // '/'
    [0x3E, 0x51, 0x49, 0x45, 0x3E], // '0'
    [0x00, 0x42, 0x7F, 0x40, 0x00], // '1'
    [0x42, 0x61, 0x51, 0x49, 0x46], // '2'
    [0x21, 0x41, 0x45, 0x4B, 0x31], // '3'
    [0x18, 0x14, 0x12, 0x7F, 0x10], // '4'
    [0x27, 0x45, 0x45, 0x45, 0x39], // '5'
    [0x3C, 0x4A, 0x49, 0x49, 0x30], // '6'
    [0x01, 0x71, 0x09, 0x05, 0x03], // '7'
    [0x36, 0x49, 0x49, 0x49, 0x36], // '8'
    [0x06, 0x49, 0x49, 0x29, 0x1E], // '9'
    [0x00, 0x36, 0x36, 0x00, 0x00], // ':'
    [0x00, 0x56, 0x36, 0x00, 0x00], // ';'
    [0x08, 0x14, 0x22, 0x41, 0x00], // '<'
    [0x14, 0x14, 0x14, 0x14, 0x14], // '='
    [0x00, 0x41, 0x22, 0x14, 0x08], // '>'
    [0x02, 0x01, 0x51, 0x09, 0x06], // '?'
    [0x32, 0x49, 0x79, 0x41, 0x3E], // '@'
    [0x7E, 0x11, 0x11, 0x11, 0x7E], // 'A'
    [0x7F, 0x49, 0x49, 0x49, 0x36], // 'B'
    [0x3E, 0x41, 0x41, 0x41, 0x22], // 'C'
    [0x7F, 0x41, 0x41, 0x22, 0x1C], // 'D'
    [0x7F, 0x49, 0x49, 0x49, 0x41], // 'E'
    [0x7F, 0x09, 0x09, 0x09, 0x01], // 'F'
    [0x3E, 0x41, 0x49, 0x49, 0x7A], // 'G'
    [0x7F, 0x08, 0x08, 0x08, 0x7F], // 'H'
    [0x00, 0x41, 0x7F, 0x41, 0x00], // 'I'
    [0x20, 0x40, 0x41, 0x3F, 0x01], // 'J'
    [0x7F, 0x08, 0x14, 0x22, 0x41], // 'K'
    [0x7F, 0x40, 0x40, 0x40, 0x40], // 'L'
    [0x7F, 0x02, 0x0C, 0x02, 0x7F], // 'M'
    [0x7F, 0x04, 0x08, 0x10, 0x7F], // 'N'
    [0x3E, 0x41, 0x41, 0x41, 0x3E], // 'O'
    [0x7F, 0x09, 0x09, 0x09, 0x06], // 'P'
    [0x3E, 0x41, 0x51, 0x21, 0x5E], // 'Q'
    [0x7F, 0x09, 0x19, 0x29, 0x46], // 'R'
    [0x46, 0x49, 0x49, 0x49, 0x31], // 'S'
    [0x01, 0x01, 0x7F, 0x01, 0x01], // 'T'
    [0x3F, 0x40, 0x40, 0x40, 0x3F], // 'U'
    [0x1F, 0x20, 0x40, 0x20, 0x1F], // 'V'
    [0x3F, 0x40, 0x38, 0x40, 0x3F], // 'W'
    [0x63, 0x14, 0x08, 0x14, 0x63], // 'X'
    [0x07, 0x08, 0x70, 0x08, 0x07], // 'Y'
    [0x61, 0x51, 0x49, 0x45, 0x43], // 'Z'
    [0x00, 0x7F, 0x41, 0x41, 0x00], // '['
    [0x02, 0x04, 0x08, 0x10, 0x20], // '\\'
    [0x00, 0x41, 0x41, 0x7F, 0x00], // ']'
    [0x04, 0x02, 0x01, 0x02, 0x04], // '^'
    [0x40, 0x40, 0x40, 0x40, 0x40], // '_'
    [0x00, 0x01, 0x02, 0x04, 0x00], // '`'
    [0x20, 0x54, 0x54, 0x54, 0x78], // 'a'
    [0x7F, 0x48, 0x44, 0x44, 0x38], // 'b'
    [0x38, 0x44, 0x44, 0x44, 0x20], // 'c'
    [0x38, 0x44, 0x44, 0x48, 0x7F], // 'd'
    [0x38, 0x54, 0x54, 0x54, 0x18], // 'e'
    [0x08, 0x7E, 0x09, 0x01, 0x02], // 'f'
    [0x0C, 0x52, 0x52, 0x52, 0x3E], // 'g'
    [0x7F, 0x08, 0x04, 0x04, 0x78], // 'h'
    [0x00, 0x44, 0x7D, 0x40, 0x00], // 'i'
    [0x20, 0x40, 0x44, 0x3D, 0x00], // 'j'
    [0x7F, 0x10, 0x28, 0x44, 0x00], // 'k'
    [0x00, 0x41, 0x7F, 0x40, 0x00], // 'l'
    [0x7C, 0x04, 0x18, 0x04, 0x78], // 'm'
    [0x7C, 0x08, 0x04, 0x04, 0x78], // 'n'
    [0x38, 0x44, 0x44, 0x44, 0x38], // 'o'
    [0x7C, 0x14, 0x14, 0x14, 0x08], // 'p'
    [0x08, 0x14, 0x14, 0x18, 0x7C], // 'q'
    [0x7C, 0x08, 0x04, 0x04, 0x08], // 'r'
    [0x48, 0x54, 0x54, 0x54, 0x20], // 's'
    [0x04, 0x3F, 0x44, 0x40, 0x20], // 't'
    [0x3C, 0x40, 0x40, 0x20, 0x7C], // 'u'
    [0x1C, 0x20, 0x40, 0x20, 0x1C], // 'v'
    [0x3C, 0x40, 0x30, 0x40, 0x3C], // 'w'
    [0x44, 0x28, 0x10, 0x28, 0x44], // 'x'
    [0x0C, 0x50, 0x50, 0x50, 0x3C], // 'y'
    [0x44, 0x64, 0x54, 0x4C, 0x44], // 'z'
    [0x00, 0x08, 0x36, 0x41, 0x00], // '{'
    [0x00, 0x00, 0x7F, 0x00, 0x00], // '|'
    [0x00, 0x41, 0x36, 0x08, 0x00], // '}'
    [0x10, 0x08, 0x08, 0x10, 0x08], // '~'
    [0x00, 0x00, 0x00, 0x00, 0x00], // DEL
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_stacks_vertically() {
        let (regions, width, height) = layout(&[DeviceKind::Ssd1306, DeviceKind::Led]);
        assert_eq!(regions.len(), 2);
        assert_eq!(width, 256);
        assert_eq!(height, 128 + 64);
        assert_eq!(regions[1].y, 128);
    }

    #[test]
    fn test_led_region_lights_up() {
        let (regions, width, height) = layout(&[DeviceKind::Led]);
        let mut buffer = vec![0u32; width * height];
        let frames = vec![DeviceFrame::Led { on: true, edges: vec![true] }];
        draw_frame(&mut buffer, width, &regions, &frames);
        assert_eq!(buffer[32 * width + 32], LED_ON);
        assert_eq!(buffer[0], BACKGROUND);
    }

    #[test]
    fn test_lcd_cell_background_painted() {
        let (regions, width, height) = layout(&[DeviceKind::Hd44780]);
        let mut buffer = vec![0u32; width * height];
        let frames = vec![DeviceFrame::Lcd {
            cols: 20,
            rows: 4,
            cells: vec![0x20; 80],
        }];
        draw_frame(&mut buffer, width, &regions, &frames);
        // First cell starts at (9, 9) logical x scale 3
        assert_eq!(buffer[9 + 9 * width], LCD_CELL_BG);
        assert_eq!(buffer[0], LCD_BACKLIGHT);
    }

    #[test]
    fn test_glyph_lookup() {
        assert_eq!(glyph_for(b'!'), &[0x00, 0x00, 0x5F, 0x00, 0x00]);
        assert_eq!(glyph_for(0x05), &[0u8; 5]); // CGRAM slot renders blank
    }
}
