//! Firmware image loading and core resolution.
//!
//! Accepts Intel HEX (`:LLAAAATT[DD...]CC`) and 32-bit little-endian AVR
//! ELF images. ELF files additionally carry target metadata: the `.mmcu`
//! section embedded by AVR build setups names the device the image was
//! built for. The loader resolves image ⊕ device-name override ⊕ clock
//! frequency into a [`CoreHandle`] in `Stopped` state, with frequency and
//! device name bound permanently.
//!
//! All failures here are operator-input errors: reported once, fatal, no
//! retries, and always before any simulation thread exists.

use std::fs;
use std::path::Path;

use crate::engine::CoreHandle;
use crate::error::SessionError;
use crate::mcu::{self, SUPPORTED_MCUS};

/// A parsed firmware image.
pub struct FirmwareImage {
    /// Flash contents, starting at address 0.
    pub flash: Vec<u8>,
    /// Device name embedded in the image metadata, if any.
    pub mmcu: Option<String>,
}

const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const EM_AVR: u16 = 83;
const PT_LOAD: u32 = 1;

/// Resolve firmware + overrides into an initialized, stopped core.
///
/// The device name comes from the `-m` override if given, else from the
/// image metadata; if neither resolves the configuration is rejected.
pub fn load(
    firmware: Option<&Path>,
    device_override: Option<&str>,
    frequency: u32,
) -> Result<CoreHandle, SessionError> {
    let image = match firmware {
        Some(path) => {
            let image = load_image(path)?;
            log::info!(
                "firmware {} ({} bytes, mmcu={})",
                path.display(),
                image.flash.len(),
                image.mmcu.as_deref().unwrap_or("-")
            );
            Some(image)
        }
        None => None,
    };

    let device = device_override
        .map(str::to_string)
        .or_else(|| image.as_ref().and_then(|i| i.mmcu.clone()))
        .ok_or_else(|| {
            SessionError::Configuration(
                "no target device: pass -m or an image with embedded metadata".into(),
            )
        })?;

    let flash = image.map(|i| i.flash).unwrap_or_default();
    let engine = mcu::make_core(&device, flash, frequency)?;
    log::info!("core {} at {} Hz", engine.device_name(), engine.frequency());
    Ok(CoreHandle::new(engine))
}

/// Read and parse a firmware file, dispatching on its content.
pub fn load_image(path: &Path) -> Result<FirmwareImage, SessionError> {
    let bytes = fs::read(path).map_err(|e| SessionError::Load {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let parsed = if bytes.starts_with(&ELF_MAGIC) {
        parse_elf(&bytes)
    } else if bytes.first() == Some(&b':') {
        String::from_utf8(bytes)
            .map_err(|_| "HEX file is not valid UTF-8".to_string())
            .and_then(|text| parse_hex(&text))
            .map(|flash| FirmwareImage { flash, mmcu: None })
    } else {
        Err("unrecognized firmware format (expected ELF or Intel HEX)".into())
    };

    parsed.map_err(|reason| SessionError::Load { path: path.to_path_buf(), reason })
}

// ── Intel HEX ───────────────────────────────────────────────────────────────

/// Parse an Intel HEX string into a flash image. Supports record types 00
/// (data), 01 (EOF), 02/04 (extended addresses).
pub fn parse_hex(hex: &str) -> Result<Vec<u8>, String> {
    let mut flash = Vec::new();
    let mut base_addr: u32 = 0;

    for line in hex.lines() {
        let line = line.trim();
        if line.is_empty() || !line.starts_with(':') {
            continue;
        }

        let bytes = hex_line_to_bytes(&line[1..])?;
        if bytes.len() < 5 {
            return Err("record too short".into());
        }

        let byte_count = bytes[0] as usize;
        let addr = ((bytes[1] as u16) << 8) | bytes[2] as u16;
        let record_type = bytes[3];

        let sum: u8 = bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if sum != 0 {
            return Err(format!("checksum error: sum={}", sum));
        }
        if bytes.len() < 5 + byte_count {
            return Err("record shorter than its byte count".into());
        }

        match record_type {
            0x00 => {
                let full_addr = base_addr as usize + addr as usize;
                let end = full_addr + byte_count;
                if end > flash.len() {
                    flash.resize(end, 0xFF);
                }
                flash[full_addr..end].copy_from_slice(&bytes[4..4 + byte_count]);
            }
            0x01 => break,
            0x02 => {
                if byte_count >= 2 {
                    base_addr = (((bytes[4] as u32) << 8) | bytes[5] as u32) << 4;
                }
            }
            0x04 => {
                if byte_count >= 2 {
                    base_addr = (((bytes[4] as u32) << 8) | bytes[5] as u32) << 16;
                }
            }
            _ => {} // start-address records and unknown types: skip
        }
    }

    Ok(flash)
}

fn hex_line_to_bytes(hex_str: &str) -> Result<Vec<u8>, String> {
    let chars = hex_str.as_bytes();
    if chars.len() % 2 != 0 {
        return Err("odd number of hex characters".into());
    }
    let mut bytes = Vec::with_capacity(chars.len() / 2);
    for pair in chars.chunks(2) {
        bytes.push((hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?);
    }
    Ok(bytes)
}

fn hex_nibble(c: u8) -> Result<u8, String> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(format!("invalid hex character: {}", c as char)),
    }
}

// ── ELF ─────────────────────────────────────────────────────────────────────

fn u16le(d: &[u8], o: usize) -> u16 {
    (d[o] as u16) | ((d[o + 1] as u16) << 8)
}

fn u32le(d: &[u8], o: usize) -> u32 {
    (d[o] as u32) | ((d[o + 1] as u32) << 8) | ((d[o + 2] as u32) << 16) | ((d[o + 3] as u32) << 24)
}

fn read_str(d: &[u8], o: usize) -> &str {
    if o >= d.len() {
        return "";
    }
    let end = d[o..].iter().position(|&b| b == 0).unwrap_or(0);
    std::str::from_utf8(&d[o..o + end]).unwrap_or("")
}

/// Parse a 32-bit little-endian AVR ELF: PT_LOAD segments become the flash
/// image, the `.mmcu` section (if present) names the target device.
fn parse_elf(data: &[u8]) -> Result<FirmwareImage, String> {
    if data.len() < 52 {
        return Err("file too small for ELF header".into());
    }
    if data[0..4] != ELF_MAGIC {
        return Err("not an ELF file".into());
    }
    if data[4] != 1 {
        return Err("only 32-bit ELF supported".into());
    }
    if data[5] != 1 {
        return Err("only little-endian ELF supported".into());
    }
    let e_machine = u16le(data, 18);
    if e_machine != EM_AVR {
        return Err(format!("not AVR ELF (machine={})", e_machine));
    }

    let e_phoff = u32le(data, 28) as usize;
    let e_shoff = u32le(data, 32) as usize;
    let e_phentsize = u16le(data, 42) as usize;
    let e_phnum = u16le(data, 44) as usize;
    let e_shentsize = u16le(data, 46) as usize;
    let e_shnum = u16le(data, 48) as usize;
    let e_shstrndx = u16le(data, 50) as usize;

    // Load segments below the data-space mapping boundary
    let mut flash = Vec::new();
    for i in 0..e_phnum {
        let off = e_phoff + i * e_phentsize;
        if off + e_phentsize > data.len() {
            break;
        }
        if u32le(data, off) != PT_LOAD {
            continue;
        }
        let p_offset = u32le(data, off + 4) as usize;
        let p_vaddr = u32le(data, off + 8) as usize;
        let p_filesz = u32le(data, off + 16) as usize;
        if p_vaddr < 0x800000 && p_offset + p_filesz <= data.len() {
            let end = p_vaddr + p_filesz;
            if end > flash.len() {
                flash.resize(end, 0xFF);
            }
            flash[p_vaddr..end].copy_from_slice(&data[p_offset..p_offset + p_filesz]);
        }
    }

    // Section-name string table, then the .mmcu metadata section
    let shstrtab_off = if e_shstrndx < e_shnum {
        let sh = e_shoff + e_shstrndx * e_shentsize;
        if sh + e_shentsize <= data.len() {
            u32le(data, sh + 16) as usize
        } else {
            0
        }
    } else {
        0
    };

    let mut mmcu = None;
    for i in 0..e_shnum {
        let sh = e_shoff + i * e_shentsize;
        if sh + e_shentsize > data.len() {
            break;
        }
        let sh_name = u32le(data, sh) as usize;
        if read_str(data, shstrtab_off + sh_name) != ".mmcu" {
            continue;
        }
        let sh_offset = u32le(data, sh + 16) as usize;
        let sh_size = u32le(data, sh + 20) as usize;
        if sh_offset + sh_size <= data.len() {
            mmcu = find_device_name(&data[sh_offset..sh_offset + sh_size]);
        }
        break;
    }

    Ok(FirmwareImage { flash, mmcu })
}

/// The `.mmcu` section is a binary struct; the device name is the one
/// NUL-terminated string in it that matches a supported MCU.
fn find_device_name(section: &[u8]) -> Option<String> {
    SUPPORTED_MCUS
        .iter()
        .find(|m| {
            let name = m.name.as_bytes();
            section.windows(name.len() + 1).any(|w| {
                &w[..name.len()] == name && w[name.len()] == 0
            })
        })
        .map(|m| m.name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_hex() {
        let hex = ":100000000C9434000C944E000C944E000C944E00A4\n:00000001FF\n";
        let flash = parse_hex(hex).unwrap();
        assert_eq!(flash.len(), 16);
        assert_eq!(&flash[0..4], &[0x0C, 0x94, 0x34, 0x00]);
    }

    #[test]
    fn test_hex_checksum_error() {
        let hex = ":100000000C9434000C944E000C944E000C944E00FF\n:00000001FF\n";
        assert!(parse_hex(hex).is_err());
    }

    #[test]
    fn test_empty_hex() {
        assert_eq!(parse_hex(":00000001FF\n").unwrap().len(), 0);
    }

    #[test]
    fn test_elf_rejects_bad_magic() {
        assert!(parse_elf(&[0u8; 64]).is_err());
        assert!(parse_elf(&[0x7F, b'E', b'L', b'F']).is_err());
    }

    /// Assemble a minimal AVR ELF: one PT_LOAD segment and a .mmcu section.
    fn synthetic_elf(code: &[u8], mmcu: &[u8]) -> Vec<u8> {
        let phoff = 52usize;
        let code_off = phoff + 32;
        let mmcu_off = code_off + code.len();
        let shstr_off = mmcu_off + mmcu.len();
        let shstrtab = b"\0.mmcu\0.shstrtab\0";
        let shoff = shstr_off + shstrtab.len();

        let mut d = Vec::new();
        d.extend_from_slice(&ELF_MAGIC);
        d.extend_from_slice(&[1, 1, 1, 0]); // 32-bit, LE, version
        d.extend_from_slice(&[0; 8]); // padding
        d.extend_from_slice(&2u16.to_le_bytes()); // e_type = EXEC
        d.extend_from_slice(&EM_AVR.to_le_bytes());
        d.extend_from_slice(&1u32.to_le_bytes()); // e_version
        d.extend_from_slice(&0u32.to_le_bytes()); // e_entry
        d.extend_from_slice(&(phoff as u32).to_le_bytes());
        d.extend_from_slice(&(shoff as u32).to_le_bytes());
        d.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        d.extend_from_slice(&52u16.to_le_bytes()); // e_ehsize
        d.extend_from_slice(&32u16.to_le_bytes()); // e_phentsize
        d.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
        d.extend_from_slice(&40u16.to_le_bytes()); // e_shentsize
        d.extend_from_slice(&3u16.to_le_bytes()); // e_shnum
        d.extend_from_slice(&2u16.to_le_bytes()); // e_shstrndx
        assert_eq!(d.len(), 52);

        // Program header: PT_LOAD at vaddr 0
        d.extend_from_slice(&PT_LOAD.to_le_bytes());
        d.extend_from_slice(&(code_off as u32).to_le_bytes()); // p_offset
        d.extend_from_slice(&0u32.to_le_bytes()); // p_vaddr
        d.extend_from_slice(&0u32.to_le_bytes()); // p_paddr
        d.extend_from_slice(&(code.len() as u32).to_le_bytes()); // p_filesz
        d.extend_from_slice(&(code.len() as u32).to_le_bytes()); // p_memsz
        d.extend_from_slice(&5u32.to_le_bytes()); // p_flags
        d.extend_from_slice(&2u32.to_le_bytes()); // p_align

        d.extend_from_slice(code);
        d.extend_from_slice(mmcu);
        d.extend_from_slice(shstrtab);

        // Section headers: null, .mmcu, .shstrtab
        let mut shdr = |name: u32, offset: usize, size: usize| {
            d.extend_from_slice(&name.to_le_bytes());
            d.extend_from_slice(&1u32.to_le_bytes()); // SHT_PROGBITS
            d.extend_from_slice(&0u32.to_le_bytes()); // sh_flags
            d.extend_from_slice(&0u32.to_le_bytes()); // sh_addr
            d.extend_from_slice(&(offset as u32).to_le_bytes());
            d.extend_from_slice(&(size as u32).to_le_bytes());
            d.extend_from_slice(&[0; 16]); // link/info/align/entsize
        };
        shdr(0, 0, 0);
        shdr(1, mmcu_off, mmcu.len()); // ".mmcu"
        shdr(7, shstr_off, shstrtab.len()); // ".shstrtab"
        d
    }

    #[test]
    fn test_elf_load_segment_and_mmcu() {
        let code = [0x0C, 0x94, 0x34, 0x00];
        let elf = synthetic_elf(&code, b"\x01\x02atmega328p\0rest");
        let image = parse_elf(&elf).unwrap();
        assert_eq!(&image.flash[..4], &code);
        assert_eq!(image.mmcu.as_deref(), Some("atmega328p"));
    }

    #[test]
    fn test_elf_without_known_mmcu() {
        let elf = synthetic_elf(&[0, 0], b"\x01\x02attiny13\0");
        let image = parse_elf(&elf).unwrap();
        assert_eq!(image.mmcu, None);
    }

    #[test]
    fn test_load_missing_file_is_load_error() {
        let err = load(Some(Path::new("/nonexistent/firmware.elf")), None, 16_000_000)
            .unwrap_err();
        assert!(matches!(err, SessionError::Load { .. }));
    }

    #[test]
    fn test_load_without_device_is_configuration_error() {
        let err = load(None, None, 16_000_000).unwrap_err();
        assert!(matches!(err, SessionError::Configuration(_)));
    }

    #[test]
    fn test_load_unknown_override_is_rejected() {
        let err = load(None, Some("z80"), 16_000_000).unwrap_err();
        assert!(matches!(err, SessionError::UnknownDevice(_)));
    }

    #[test]
    fn test_load_device_only_gives_stopped_core() {
        let handle = load(None, Some("atmega328p"), 8_000_000).unwrap();
        assert_eq!(handle.engine.device_name(), "atmega328p");
        assert_eq!(handle.engine.frequency(), 8_000_000);
        assert_eq!(
            handle.engine.run_state(),
            crate::engine::RunState::Stopped
        );
    }
}
