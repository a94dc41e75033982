//! Top-level emulator core: wires the CPU, bus and PPU together into a
//! frame loop and exposes the host-facing API (`init`, `step`, `screen`,
//! save-states, memory peek/poke).

use crate::{
    bus::Bus,
    consts::{SCANLINE_CYCLES, TOTAL_SCANLINES},
    cpu::Cpu,
    dma::StartTiming,
    info::Info,
    ppu::Ppu,
    rom::Cartridge,
    state::{SaveState, StateComponent, StateFormat},
};
use gba_core_common::error::Error;
use std::fmt::{self, Display, Formatter};

/// Host-provided boot configuration; the HLE BIOS means a real BIOS image
/// is optional (only used for its boot logo/checksum behavior).
pub struct GbaConfig {
    pub bios: Option<Vec<u8>>,
    pub rom: Vec<u8>,
}

/// A frame's worth of emulated components, grouped so [`GbaCore`] can pass
/// `&mut Bus` around freely while the CPU borrows it only for `step`.
struct Components {
    cpu: Cpu,
    bus: Bus,
    ppu: Ppu,
}

pub struct GbaCore {
    components: Components,
    frame_count: u64,
}

impl GbaCore {
    pub fn new() -> Self {
        Self {
            components: Components {
                cpu: Cpu::new(),
                bus: Bus::new(),
                ppu: Ppu::new(),
            },
            frame_count: 0,
        }
    }

    /// Loads the BIOS/ROM images and resets the machine to its post-boot
    /// state (entry point resolved from the ROM's own reset vector, since
    /// there's no BIOS boot sequence to run through).
    pub fn init(&mut self, config: GbaConfig) -> Result<(), Error> {
        if let Some(bios) = &config.bios {
            self.components.bus.load_bios(bios);
        }
        let cartridge = Cartridge::from_data(config.rom)?;
        let entry = cartridge.rom_entry();
        self.components.bus.cartridge = cartridge;
        self.components.cpu.reset(entry);
        Ok(())
    }

    pub fn reset(&mut self) {
        let entry = self.components.bus.cartridge.rom_entry();
        self.components.bus.reset();
        self.components.cpu.reset(entry);
        self.components.ppu.reset();
        self.frame_count = 0;
    }

    /// Runs exactly one frame (228 scanlines), latching `buttons` at the
    /// frame boundary per the pad's documented synchronization point.
    pub fn step(&mut self, buttons: u16) {
        self.components.bus.pad.set_mask(buttons);
        self.components.bus.pad.latch();

        for line in 0..TOTAL_SCANLINES {
            self.components.bus.interrupts.tick_scanline(line);
            if line == crate::consts::VBLANK_LINE {
                self.components.bus.trigger_dma(StartTiming::VBlank);
            }
            if line < crate::consts::SCREEN_HEIGHT as u16 {
                self.components.ppu.render_line(&self.components.bus, line);
            }

            self.run_cycles(crate::consts::HDRAW_CYCLES);

            self.components.bus.interrupts.tick_hblank();
            self.components.bus.trigger_dma(StartTiming::HBlank);

            self.run_cycles(SCANLINE_CYCLES - crate::consts::HDRAW_CYCLES);
        }

        self.frame_count += 1;
    }

    /// Runs the CPU and timers for `cycles` worth of bus time, checking
    /// for a newly pending IRQ after each instruction.
    fn run_cycles(&mut self, cycles: u32) {
        let mut remaining = cycles;
        while remaining > 0 {
            let spent = if self.components.cpu.halted || self.components.bus.halted {
                remaining
            } else {
                self.components.cpu.step(&mut self.components.bus).max(1)
            };
            self.components
                .bus
                .timers
                .step(spent, &mut self.components.bus.interrupts);
            self.components.cpu.check_irq(&mut self.components.bus);
            remaining = remaining.saturating_sub(spent);
        }
    }

    /// The current frame as packed RGB888, row-major, top to bottom.
    pub fn screen(&self) -> &[u8] {
        self.components.ppu.frame()
    }

    pub fn read_mem(&self, addr: u32) -> u8 {
        self.components.bus.read8(addr)
    }

    pub fn write_mem(&mut self, addr: u32, value: u8) {
        self.components.bus.write8(addr, value);
    }

    pub fn save_state(&self) -> Result<Vec<u8>, Error> {
        let state = SaveState {
            frame_count: self.frame_count,
            blobs: vec![
                self.components.cpu.state(Some(StateFormat::Standard))?,
                self.components.bus.state(Some(StateFormat::Standard))?,
                self.components.bus.interrupts.state(Some(StateFormat::Standard))?,
                self.components.bus.timers.state(Some(StateFormat::Standard))?,
                self.components.bus.dma.state(Some(StateFormat::Standard))?,
                self.components.bus.cartridge.state(Some(StateFormat::Standard))?,
            ],
        };
        state.encode()
    }

    pub fn load_state(&mut self, data: &[u8]) -> Result<(), Error> {
        let state = SaveState::decode(data)?;
        let [cpu, bus, interrupts, timers, dma, cartridge]: [Vec<u8>; 6] = state
            .blobs
            .try_into()
            .map_err(|_| Error::CustomError(String::from("save-state component count mismatch")))?;
        self.components.cpu.set_state(&cpu, Some(StateFormat::Standard))?;
        self.components.bus.set_state(&bus, Some(StateFormat::Standard))?;
        self.components
            .bus
            .interrupts
            .set_state(&interrupts, Some(StateFormat::Standard))?;
        self.components.bus.timers.set_state(&timers, Some(StateFormat::Standard))?;
        self.components.bus.dma.set_state(&dma, Some(StateFormat::Standard))?;
        self.components
            .bus
            .cartridge
            .set_state(&cartridge, Some(StateFormat::Standard))?;
        self.frame_count = state.frame_count;
        Ok(())
    }

    pub fn cleanup(&mut self) {
        self.unset_diag();
    }

    pub(crate) fn description_debug(&self) -> String {
        format!(
            "{}\nframe={} pc=0x{:08x} thumb={} halted={}",
            self,
            self.frame_count,
            self.components.cpu.pc(),
            self.components.cpu.is_thumb(),
            self.components.cpu.halted,
        )
    }
}

impl Default for GbaCore {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for GbaCore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} ({})", Info::name(), Info::version(), Info::system())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rom_with_entry(entry_words: u32) -> Vec<u8> {
        let mut rom = vec![0u8; 0xc0];
        let branch = 0xea00_0000u32 | (entry_words & 0x00ff_ffff);
        rom[0..4].copy_from_slice(&branch.to_le_bytes());
        rom
    }

    #[test]
    fn test_init_resolves_entry_from_reset_vector() {
        let mut core = GbaCore::new();
        core.init(GbaConfig { bios: None, rom: rom_with_entry(0) }).unwrap();
        assert_eq!(core.components.cpu.pc(), 0x0800_0008);
    }

    #[test]
    fn test_step_advances_vcount_through_a_full_frame() {
        let mut core = GbaCore::new();
        core.init(GbaConfig { bios: None, rom: rom_with_entry(0) }).unwrap();
        core.step(0);
        assert_eq!(core.components.bus.interrupts.vcount(), TOTAL_SCANLINES - 1);
        assert_eq!(core.frame_count, 1);
    }

    #[test]
    fn test_save_state_round_trip_preserves_registers() {
        let mut core = GbaCore::new();
        core.init(GbaConfig { bios: None, rom: rom_with_entry(0) }).unwrap();
        core.components.cpu.set_reg(0, 0x1234_5678);
        let saved = core.save_state().unwrap();

        let mut restored = GbaCore::new();
        restored.init(GbaConfig { bios: None, rom: rom_with_entry(0) }).unwrap();
        restored.load_state(&saved).unwrap();
        assert_eq!(restored.components.cpu.reg(0), 0x1234_5678);
    }
}
