//! Cartridge image handling: header parsing, Flash/SRAM backing store and
//! the GPIO overlay that forwards to the real-time clock.

use crate::{
    consts::{
        GPIO_CONTROL_ADDR, GPIO_DATA_ADDR, GPIO_DIRECTION_ADDR, HEADER_CHECKSUM_OFFSET,
        HEADER_GAME_CODE_OFFSET, HEADER_MAKER_CODE_OFFSET, HEADER_TITLE_OFFSET,
        HEADER_TITLE_SIZE, HEADER_VERSION_OFFSET, ROM_BASE, ROM_MAX_SIZE, SRAM_SIZE,
    },
    infoln,
    rtc::Rtc,
    state::{StateComponent, StateFormat},
};
use gba_core_common::error::Error;
use std::fmt::{self, Display, Formatter};

/// Flash identification: Macronix MX29L1011.
const FLASH_MANUFACTURER_ID: u8 = 0xc2;
const FLASH_DEVICE_ID: u8 = 0x09;

const GPIO_DATA_ADDR1: u32 = GPIO_DATA_ADDR + 1;
const GPIO_DIRECTION_ADDR1: u32 = GPIO_DIRECTION_ADDR + 1;
const GPIO_CONTROL_ADDR1: u32 = GPIO_CONTROL_ADDR + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlashMode {
    Normal,
    Identify,
}

impl FlashMode {
    fn description(&self) -> &'static str {
        match self {
            FlashMode::Normal => "Normal",
            FlashMode::Identify => "Identify",
        }
    }
}

impl Display for FlashMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Tracks the unlock-sequence state machine shared by program/erase/ID
/// commands, keyed on the standard JEDEC handshake addresses
/// `0x5555`/`0x2AAA` (masked into the 128 KiB SRAM window).
struct Flash {
    backing: Vec<u8>,
    mode: FlashMode,
    unlock_stage: u8,
    program_pending: bool,
    erase_pending: bool,
}

impl Flash {
    fn new() -> Self {
        Self {
            backing: vec![0xff; SRAM_SIZE as usize],
            mode: FlashMode::Normal,
            unlock_stage: 0,
            program_pending: false,
            erase_pending: false,
        }
    }

    fn read(&self, offset: u32) -> u8 {
        if self.mode == FlashMode::Identify {
            return match offset {
                0 => FLASH_MANUFACTURER_ID,
                1 => FLASH_DEVICE_ID,
                _ => 0xff,
            };
        }
        self.backing.get(offset as usize).copied().unwrap_or(0xff)
    }

    fn write(&mut self, offset: u32, value: u8) {
        if self.program_pending {
            if let Some(byte) = self.backing.get_mut(offset as usize) {
                *byte &= value;
            }
            self.program_pending = false;
            self.unlock_stage = 0;
            return;
        }
        if self.erase_pending && offset == 0x5555 && value == 0x10 {
            self.backing.iter_mut().for_each(|byte| *byte = 0xff);
            self.erase_pending = false;
            self.unlock_stage = 0;
            return;
        }

        match (self.unlock_stage, offset, value) {
            (0, 0x5555, 0xaa) => self.unlock_stage = 1,
            (1, 0x2aaa, 0x55) => self.unlock_stage = 2,
            (2, 0x5555, 0x90) => {
                self.mode = FlashMode::Identify;
                self.unlock_stage = 0;
            }
            (2, 0x5555, 0xf0) => {
                self.mode = FlashMode::Normal;
                self.unlock_stage = 0;
            }
            (2, 0x5555, 0xa0) => {
                self.program_pending = true;
                self.unlock_stage = 0;
            }
            (2, 0x5555, 0x80) => {
                self.erase_pending = true;
                self.unlock_stage = 0;
            }
            _ => self.unlock_stage = 0,
        }
    }
}

pub struct HeaderInfo {
    pub title: String,
    pub game_code: String,
    pub maker_code: String,
    pub version: u8,
    pub checksum: u8,
    pub valid_checksum: bool,
}

impl Display for HeaderInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}), maker={}, version={}, checksum={}",
            self.title,
            self.game_code,
            self.maker_code,
            self.version,
            if self.valid_checksum { "ok" } else { "mismatch" }
        )
    }
}

pub struct Cartridge {
    data: Vec<u8>,
    header: Option<HeaderInfo>,
    flash: Flash,
    rtc: Rtc,

    gpio_data: u16,
    gpio_direction: u16,
    gpio_control: u16,
}

impl Cartridge {
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            header: None,
            flash: Flash::new(),
            rtc: Rtc::new(),
            gpio_data: 0,
            gpio_direction: 0,
            gpio_control: 0,
        }
    }

    pub fn from_data(data: Vec<u8>) -> Result<Self, Error> {
        if data.is_empty() || data.len() as u32 > ROM_MAX_SIZE {
            return Err(Error::RomSize);
        }
        let mut cartridge = Self::new();
        let header = Self::parse_header(&data);
        infoln!("loaded cartridge: {}", header);
        cartridge.header = Some(header);
        cartridge.data = data;
        Ok(cartridge)
    }

    fn parse_header(data: &[u8]) -> HeaderInfo {
        let slice = |start: usize, len: usize| -> String {
            data.get(start..start + len)
                .map(|bytes| {
                    String::from_utf8_lossy(bytes)
                        .trim_end_matches('\0')
                        .to_string()
                })
                .unwrap_or_default()
        };
        let title = slice(HEADER_TITLE_OFFSET, HEADER_TITLE_SIZE);
        let game_code = slice(HEADER_GAME_CODE_OFFSET, 4);
        let maker_code = slice(HEADER_MAKER_CODE_OFFSET, 2);
        let version = data.get(HEADER_VERSION_OFFSET).copied().unwrap_or(0);
        let checksum = data.get(HEADER_CHECKSUM_OFFSET).copied().unwrap_or(0);
        let computed = Self::compute_checksum(data);
        HeaderInfo {
            title,
            game_code,
            maker_code,
            version,
            checksum,
            valid_checksum: computed == checksum,
        }
    }

    /// `(-sum(bytes[0xA0..=0xBC]) - 0x19) & 0xFF`.
    fn compute_checksum(data: &[u8]) -> u8 {
        let sum: u32 = data
            .get(HEADER_TITLE_OFFSET..=0xbc)
            .map(|bytes| bytes.iter().map(|&b| b as u32).sum())
            .unwrap_or(0);
        (0u32.wrapping_sub(sum).wrapping_sub(0x19) & 0xff) as u8
    }

    pub fn header(&self) -> Option<&HeaderInfo> {
        self.header.as_ref()
    }

    /// Resolves the reset-vector branch at offset 0 (`B <entry>`); ARM
    /// branch encoding stores `(target - (PC+8)) >> 2` in the low 24 bits.
    pub fn rom_entry(&self) -> u32 {
        if self.data.len() < 4 {
            return ROM_BASE;
        }
        let word = u32::from_le_bytes(self.data[0..4].try_into().unwrap());
        if word >> 24 != 0xea {
            return ROM_BASE;
        }
        let offset = ((word & 0x00ff_ffff) as i32) << 8 >> 8;
        (ROM_BASE as i64 + 8 + (offset as i64 * 4)) as u32
    }

    pub fn read(&self, addr: u32) -> u8 {
        let offset = addr - ROM_BASE;
        match addr {
            GPIO_DATA_ADDR | GPIO_DATA_ADDR1 => {
                let merged = self.gpio_data | self.rtc_sio_bit();
                byte_of(merged, addr - GPIO_DATA_ADDR)
            }
            GPIO_DIRECTION_ADDR | GPIO_DIRECTION_ADDR1 => {
                byte_of(self.gpio_direction, addr - GPIO_DIRECTION_ADDR)
            }
            GPIO_CONTROL_ADDR | GPIO_CONTROL_ADDR1 => {
                byte_of(self.gpio_control, addr - GPIO_CONTROL_ADDR)
            }
            _ => self.data.get(offset as usize).copied().unwrap_or(0xff),
        }
    }

    pub fn write(&mut self, addr: u32, value: u8) {
        match addr {
            GPIO_DATA_ADDR => {
                self.gpio_data = (self.gpio_data & 0xff00) | value as u16;
                self.rtc.write_gpio(self.gpio_data);
            }
            GPIO_DATA_ADDR1 => {
                self.gpio_data = (self.gpio_data & 0x00ff) | ((value as u16) << 8);
                self.rtc.write_gpio(self.gpio_data);
            }
            GPIO_DIRECTION_ADDR => {
                self.gpio_direction = (self.gpio_direction & 0xff00) | value as u16
            }
            GPIO_DIRECTION_ADDR1 => {
                self.gpio_direction = (self.gpio_direction & 0x00ff) | ((value as u16) << 8)
            }
            GPIO_CONTROL_ADDR => self.gpio_control = (self.gpio_control & 0xff00) | value as u16,
            GPIO_CONTROL_ADDR1 => {
                self.gpio_control = (self.gpio_control & 0x00ff) | ((value as u16) << 8)
            }
            // ROM is otherwise read-only media; writes outside the GPIO
            // overlay are no-ops.
            _ => {}
        }
    }

    fn rtc_sio_bit(&self) -> u16 {
        self.rtc.read_gpio() & 0x02
    }

    pub fn read_sram(&self, offset: u32) -> u8 {
        self.flash.read(offset)
    }

    pub fn write_sram(&mut self, offset: u32, value: u8) {
        self.flash.write(offset, value);
    }
}

fn byte_of(value: u16, offset: u32) -> u8 {
    if offset == 0 {
        value as u8
    } else {
        (value >> 8) as u8
    }
}

impl Default for Cartridge {
    fn default() -> Self {
        Self::new()
    }
}

impl StateComponent for Cartridge {
    fn state(&self, _format: Option<StateFormat>) -> Result<Vec<u8>, Error> {
        Ok(self.flash.backing.clone())
    }

    fn set_state(&mut self, data: &[u8], _format: Option<StateFormat>) -> Result<(), Error> {
        if data.len() != SRAM_SIZE as usize {
            return Err(Error::InvalidData);
        }
        self.flash.backing.copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Cartridge;
    use crate::consts::ROM_MAX_SIZE;

    fn make_header() -> Vec<u8> {
        let mut data = vec![0u8; 0x100];
        data[0xa0..0xac].copy_from_slice(b"POKEMON EME ");
        data[0xac..0xb0].copy_from_slice(b"BPEE");
        data[0xb0..0xb2].copy_from_slice(b"01");
        data[0xbc] = 0x00;
        let checksum = Cartridge::compute_checksum(&data);
        data[0xbd] = checksum;
        data
    }

    #[test]
    fn test_header_checksum_is_validated() {
        let data = make_header();
        let cartridge = Cartridge::from_data(data).unwrap();
        assert!(cartridge.header().unwrap().valid_checksum);
        assert_eq!(cartridge.header().unwrap().game_code, "BPEE");
    }

    #[test]
    fn test_mismatched_checksum_is_advisory_not_fatal() {
        let mut data = make_header();
        data[0xbd] ^= 0xff;
        let cartridge = Cartridge::from_data(data).unwrap();
        assert!(!cartridge.header().unwrap().valid_checksum);
    }

    #[test]
    fn test_flash_identification_sequence() {
        let mut cartridge = Cartridge::from_data(make_header()).unwrap();
        cartridge.write_sram(0x5555, 0xaa);
        cartridge.write_sram(0x2aaa, 0x55);
        cartridge.write_sram(0x5555, 0x90);
        assert_eq!(cartridge.read_sram(0), 0xc2);
        assert_eq!(cartridge.read_sram(1), 0x09);

        cartridge.write_sram(0x5555, 0xf0);
        assert_eq!(cartridge.read_sram(0), 0xff); // default SRAM contents
    }

    #[test]
    fn test_flash_byte_program() {
        let mut cartridge = Cartridge::from_data(make_header()).unwrap();
        cartridge.write_sram(0x5555, 0xaa);
        cartridge.write_sram(0x2aaa, 0x55);
        cartridge.write_sram(0x5555, 0xa0);
        cartridge.write_sram(0x1000, 0x42);
        assert_eq!(cartridge.read_sram(0x1000), 0x42);
    }

    #[test]
    fn test_rom_too_large_is_rejected() {
        let data = vec![0u8; (ROM_MAX_SIZE as usize) + 1];
        assert!(Cartridge::from_data(data).is_err());
    }
}
