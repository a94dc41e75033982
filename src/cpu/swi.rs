//! High-level emulation of the BIOS SWI table. Each handler runs fully in
//! Rust and returns directly to the caller (LR already points past the
//! SWI instruction from [`Cpu::enter_swi`]), so there is no HLE BIOS image
//! to execute through.

use super::Cpu;
use crate::{bus::Bus, consts::BIOS_CHECKSUM, warnln};
use gba_core_encoding::{codec::Codec, lz77::Lz77, rle::Rle};

/// Dispatches on the comment field of the SWI instruction that trapped
/// here, which [`Cpu::enter_swi`] doesn't decode itself (ARM encodes it in
/// bits 23-0 of the SWI instruction, Thumb in bits 7-0); both decoders
/// stash it in r12 before calling [`Cpu::enter_swi`] is not necessary here
/// since we re-read the triggering instruction directly.
pub fn dispatch(cpu: &mut Cpu, bus: &mut Bus) {
    let comment = last_swi_comment(cpu, bus);
    match comment {
        0x00 => soft_reset(cpu, bus),
        0x01 => {} // RegisterRamReset: no persistent host-side RAM banks to clear
        0x02 | 0x03 => cpu.halted = true, // Halt / Stop
        0x04 | 0x05 => cpu.halted = true, // IntrWait / VBlankIntrWait
        0x06 => div(cpu),
        0x08 => sqrt(cpu),
        0x0b => cpu_set(cpu, bus),
        0x0c => cpu_fast_set(cpu, bus),
        0x0d => cpu.set_reg(0, BIOS_CHECKSUM),
        0x11 => decompress::<Lz77>(cpu, bus),
        0x12 => decompress::<Lz77>(cpu, bus),
        0x14 | 0x15 => decompress::<Rle>(cpu, bus),
        other => warnln!("unimplemented SWI 0x{:02x}", other),
    }
    return_from_swi(cpu);
}

fn last_swi_comment(cpu: &Cpu, bus: &Bus) -> u32 {
    // LR was set to the address right after the SWI instruction; the SWI
    // itself sits one instruction width before it.
    if cpu.is_thumb() {
        let addr = cpu.reg(14).wrapping_sub(2);
        bus.read16(addr) as u32 & 0xff
    } else {
        let addr = cpu.reg(14).wrapping_sub(4);
        (bus.read32(addr) >> 16) & 0xff
    }
}

/// All HLE handlers run synchronously; this returns to the caller as if
/// the BIOS's own `MOVS PC, LR` epilogue had executed.
fn return_from_swi(cpu: &mut Cpu) {
    let lr = cpu.reg(14);
    let spsr = cpu.spsr();
    cpu.set_cpsr(spsr);
    cpu.set_reg(15, lr);
}

fn soft_reset(cpu: &mut Cpu, bus: &mut Bus) {
    let entry = bus.cartridge.rom_entry();
    cpu.reset(entry);
}

fn div(cpu: &mut Cpu) {
    let numerator = cpu.reg(0) as i32;
    let denominator = cpu.reg(1) as i32;
    if denominator == 0 {
        cpu.set_reg(0, 0);
        cpu.set_reg(1, numerator as u32);
        cpu.set_reg(3, 0);
        return;
    }
    let quotient = numerator.wrapping_div(denominator);
    let remainder = numerator.wrapping_rem(denominator);
    cpu.set_reg(0, quotient as u32);
    cpu.set_reg(1, remainder as u32);
    cpu.set_reg(3, quotient.unsigned_abs());
}

fn sqrt(cpu: &mut Cpu) {
    let value = cpu.reg(0);
    cpu.set_reg(0, (value as f64).sqrt() as u32);
}

fn cpu_set(cpu: &mut Cpu, bus: &mut Bus) {
    let source = cpu.reg(0);
    let dest = cpu.reg(1);
    let control = cpu.reg(2);
    let count = control & 0x001f_ffff;
    let word_size_32 = control & (1 << 26) != 0;
    let fixed_source = control & (1 << 24) != 0;

    let step = if word_size_32 { 4 } else { 2 };
    let mut src = source;
    let mut dst = dest;
    for _ in 0..count {
        if word_size_32 {
            bus.write32(dst, bus.read32(src));
        } else {
            bus.write16(dst, bus.read16(src));
        }
        if !fixed_source {
            src += step;
        }
        dst += step;
    }
}

fn cpu_fast_set(cpu: &mut Cpu, bus: &mut Bus) {
    let source = cpu.reg(0);
    let dest = cpu.reg(1);
    let control = cpu.reg(2);
    let count = (control & 0x001f_ffff).div_ceil(8) * 8; // rounded up to a multiple of 8 words
    let fixed_source = control & (1 << 24) != 0;

    let mut src = source;
    let mut dst = dest;
    for _ in 0..count {
        bus.write32(dst, bus.read32(src));
        if !fixed_source {
            src += 4;
        }
        dst += 4;
    }
}

fn decompress<C: Codec>(cpu: &mut Cpu, bus: &mut Bus) {
    let source = cpu.reg(0);
    let dest = cpu.reg(1);

    let header = bus.read32(source);
    let uncompressed_size = header >> 8;
    let compressed_len_estimate = (uncompressed_size as usize) * 2 + 16;
    let input: Vec<u8> = (0..compressed_len_estimate as u32)
        .map(|offset| bus.read8(source + 4 + offset))
        .collect();

    match C::decode(&input, uncompressed_size) {
        Ok(output) => {
            for (offset, byte) in output.iter().enumerate() {
                bus.write8(dest + offset as u32, *byte);
            }
        }
        Err(err) => warnln!("BIOS decompression failed: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;

    #[test]
    fn test_div_by_zero_returns_sentinel() {
        let mut cpu = Cpu::new();
        cpu.set_reg(0, 10);
        cpu.set_reg(1, 0);
        div(&mut cpu);
        assert_eq!(cpu.reg(0), 0);
        assert_eq!(cpu.reg(1), 10);
    }

    #[test]
    fn test_div_signed() {
        let mut cpu = Cpu::new();
        cpu.set_reg(0, (-7i32) as u32);
        cpu.set_reg(1, 2);
        div(&mut cpu);
        assert_eq!(cpu.reg(0) as i32, -3);
        assert_eq!(cpu.reg(1) as i32, -1);
    }

    #[test]
    fn test_cpu_set_16bit_copy() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        bus.write16(0x0200_0000, 0xabcd);
        bus.write16(0x0200_0002, 0x1234);
        cpu.set_reg(0, 0x0200_0000);
        cpu.set_reg(1, 0x0300_0000);
        cpu.set_reg(2, 2); // count=2, 16-bit, incrementing
        cpu_set(&mut cpu, &mut bus);
        assert_eq!(bus.read16(0x0300_0000), 0xabcd);
        assert_eq!(bus.read16(0x0300_0002), 0x1234);
    }
}
