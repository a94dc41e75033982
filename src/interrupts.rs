//! Interrupt controller: IE/IF/IME, DISPSTAT and VCOUNT.

use crate::{
    consts::{IRQ_HBLANK, IRQ_VBLANK, IRQ_VCOUNT, TOTAL_SCANLINES, VBLANK_LINE},
    state::{StateComponent, StateFormat},
};
use gba_core_common::{
    data::{read_u16, write_u16},
    error::Error,
};
use std::io::Cursor;

pub struct InterruptController {
    ie: u16,
    iflags: u16,
    ime: bool,

    dispstat: u16,
    vcount: u16,
}

impl InterruptController {
    pub fn new() -> Self {
        Self {
            ie: 0,
            iflags: 0,
            ime: false,
            dispstat: 0,
            vcount: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn raise(&mut self, flag_mask: u16) {
        self.iflags |= flag_mask;
    }

    pub fn acknowledge(&mut self, flag_mask: u16) {
        self.iflags &= !flag_mask;
    }

    pub fn pending(&self) -> bool {
        self.ime && (self.ie & self.iflags) != 0
    }

    pub fn ie(&self) -> u16 {
        self.ie
    }

    pub fn set_ie(&mut self, value: u16) {
        self.ie = value;
    }

    pub fn iflags(&self) -> u16 {
        self.iflags
    }

    /// Writing IF acknowledges (clears) the bits set in `value`, it never
    /// stores the written value directly.
    pub fn write_if(&mut self, value: u16) {
        self.iflags &= !value;
    }

    pub fn ime(&self) -> bool {
        self.ime
    }

    pub fn set_ime(&mut self, value: bool) {
        self.ime = value;
    }

    pub fn dispstat(&self) -> u16 {
        self.dispstat
    }

    pub fn set_dispstat(&mut self, value: u16) {
        // bits 0-2 (VBlank/HBlank/VCount-match flags) are read-only from
        // the CPU's point of view, only the enable bits and the compare
        // value may be written.
        self.dispstat = (self.dispstat & 0x0007) | (value & 0xff38);
    }

    pub fn vcount(&self) -> u16 {
        self.vcount
    }

    fn vcount_compare(&self) -> u16 {
        self.dispstat >> 8
    }

    pub fn in_vblank(&self) -> bool {
        self.dispstat & 0x0001 != 0
    }

    fn set_hblank_flag(&mut self, value: bool) {
        self.dispstat = (self.dispstat & !0x0002) | if value { 0x0002 } else { 0 };
    }

    /// Called once per scanline before CPU execution resumes, per the
    /// frame loop's ordering guarantees. `line` is the scanline about to
    /// run (0..=227).
    pub fn tick_scanline(&mut self, line: u16) {
        self.vcount = line;
        self.set_hblank_flag(false);

        if line == VBLANK_LINE {
            self.dispstat |= 0x0001;
            if self.dispstat & 0x0008 != 0 {
                self.raise(IRQ_VBLANK);
            }
        } else if line == 0 {
            self.dispstat &= !0x0001;
        }

        let matched = line == self.vcount_compare();
        self.dispstat = (self.dispstat & !0x0004) | if matched { 0x0004 } else { 0 };
        if matched && self.dispstat & 0x0020 != 0 {
            self.raise(IRQ_VCOUNT);
        }
    }

    /// Called after the CPU has consumed the visible portion of the
    /// scanline (the HDraw cycles), ahead of HBlank DMA triggers.
    pub fn tick_hblank(&mut self) {
        self.set_hblank_flag(true);
        if self.dispstat & 0x0010 != 0 {
            self.raise(IRQ_HBLANK);
        }
    }

    pub fn is_last_scanline(line: u16) -> bool {
        line == TOTAL_SCANLINES - 1
    }
}

impl Default for InterruptController {
    fn default() -> Self {
        Self::new()
    }
}

impl StateComponent for InterruptController {
    fn state(&self, _format: Option<StateFormat>) -> Result<Vec<u8>, Error> {
        let mut data = Vec::new();
        write_u16(&mut data, self.ie)?;
        write_u16(&mut data, self.iflags)?;
        write_u16(&mut data, self.ime as u16)?;
        write_u16(&mut data, self.dispstat)?;
        write_u16(&mut data, self.vcount)?;
        Ok(data)
    }

    fn set_state(&mut self, data: &[u8], _format: Option<StateFormat>) -> Result<(), Error> {
        let mut cursor = Cursor::new(data);
        self.ie = read_u16(&mut cursor)?;
        self.iflags = read_u16(&mut cursor)?;
        self.ime = read_u16(&mut cursor)? != 0;
        self.dispstat = read_u16(&mut cursor)?;
        self.vcount = read_u16(&mut cursor)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::InterruptController;
    use crate::consts::IRQ_VBLANK;

    #[test]
    fn test_if_acknowledge() {
        let mut ic = InterruptController::new();
        ic.raise(0b0111);
        ic.write_if(0b0101);
        assert_eq!(ic.iflags(), 0b0010);
    }

    #[test]
    fn test_vblank_irq_at_line_160() {
        let mut ic = InterruptController::new();
        ic.set_dispstat(0x0008); // VBlank IRQ enable
        ic.set_ie(IRQ_VBLANK);
        ic.set_ime(true);
        ic.tick_scanline(159);
        assert!(!ic.in_vblank());
        ic.tick_scanline(160);
        assert!(ic.in_vblank());
        assert_eq!(ic.iflags() & IRQ_VBLANK, IRQ_VBLANK);
        assert!(ic.pending());
    }

    #[test]
    fn test_vblank_clears_at_line_0() {
        let mut ic = InterruptController::new();
        ic.tick_scanline(160);
        ic.tick_scanline(0);
        assert!(!ic.in_vblank());
    }

    #[test]
    fn test_vcount_match() {
        let mut ic = InterruptController::new();
        ic.set_dispstat(0x0020); // compare=0, VCount IRQ enable
        ic.set_ie(crate::consts::IRQ_VCOUNT);
        ic.set_ime(true);
        ic.tick_scanline(0);
        assert_eq!(ic.dispstat() & 0x0004, 0x0004);
        assert!(ic.pending());
    }
}
