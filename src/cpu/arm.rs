//! ARM-state (32-bit) instruction decode and execution.

use super::{barrel_shift, swi, Cpu, FLAG_T};
use crate::bus::Bus;

fn condition_passed(cpu: &Cpu, cond: u32) -> bool {
    match cond {
        0x0 => cpu.flag_z(),
        0x1 => !cpu.flag_z(),
        0x2 => cpu.flag_c(),
        0x3 => !cpu.flag_c(),
        0x4 => cpu.flag_n(),
        0x5 => !cpu.flag_n(),
        0x6 => cpu.flag_v(),
        0x7 => !cpu.flag_v(),
        0x8 => cpu.flag_c() && !cpu.flag_z(),
        0x9 => !cpu.flag_c() || cpu.flag_z(),
        0xa => cpu.flag_n() == cpu.flag_v(),
        0xb => cpu.flag_n() != cpu.flag_v(),
        0xc => !cpu.flag_z() && cpu.flag_n() == cpu.flag_v(),
        0xd => cpu.flag_z() || cpu.flag_n() != cpu.flag_v(),
        0xe => true,
        _ => false,
    }
}

pub fn step(cpu: &mut Cpu, bus: &mut Bus) -> u32 {
    let pc = cpu.pc();
    let inst = bus.read32(pc);
    cpu.set_reg(15, pc + 4);

    let cond = inst >> 28;
    if !condition_passed(cpu, cond) {
        return 1;
    }

    if inst & 0x0fff_fff0 == 0x012f_ff10 {
        return execute_bx(cpu, inst);
    }
    if inst & 0x0fc0_00f0 == 0x0000_0090 {
        return execute_multiply(cpu, inst);
    }
    if inst & 0x0fb0_0ff0 == 0x0100_0090 {
        return execute_swp(cpu, bus, inst);
    }
    match (inst >> 25) & 0x07 {
        0x0 | 0x1 => {
            // TST/TEQ/CMP/CMN always force S=1; the same opcode range with
            // S=0 is repurposed for MRS/MSR (PSR transfer).
            let test_opcode = matches!((inst >> 21) & 0x0f, 0x8..=0xb);
            let s_bit = inst & (1 << 20) != 0;
            if test_opcode && !s_bit {
                execute_psr_transfer(cpu, inst)
            } else {
                execute_data_processing(cpu, inst)
            }
        }
        0x2 | 0x3 => execute_single_transfer(cpu, bus, inst),
        0x4 => execute_block_transfer(cpu, bus, inst),
        0x5 => execute_branch(cpu, inst),
        0x6 => 1, // coprocessor data transfer: unimplemented on GBA, no-op
        0x7 => {
            if inst & 0x0f00_0000 == 0x0f00_0000 {
                cpu.enter_swi();
                swi::dispatch(cpu, bus);
                3
            } else {
                1 // coprocessor op / undefined: no-op
            }
        }
        _ => unreachable!(),
    }
}

fn operand2_shifted(cpu: &Cpu, inst: u32) -> (u32, bool) {
    if inst & (1 << 25) != 0 {
        let imm = inst & 0xff;
        let rotate = ((inst >> 8) & 0x0f) * 2;
        let value = imm.rotate_right(rotate);
        let carry = if rotate == 0 { cpu.flag_c() } else { value & 0x8000_0000 != 0 };
        (value, carry)
    } else {
        let rm = cpu.reg((inst & 0x0f) as usize);
        let shift_type = ((inst >> 5) & 0x03) as u8;
        let amount = if inst & (1 << 4) != 0 {
            cpu.reg(((inst >> 8) & 0x0f) as usize) & 0xff
        } else {
            (inst >> 7) & 0x1f
        };
        barrel_shift(rm, shift_type, amount, cpu.flag_c())
    }
}

fn execute_data_processing(cpu: &mut Cpu, inst: u32) -> u32 {
    let opcode = (inst >> 21) & 0x0f;
    let set_flags = inst & (1 << 20) != 0;
    let rn = ((inst >> 16) & 0x0f) as usize;
    let rd = ((inst >> 12) & 0x0f) as usize;
    let (operand2, shift_carry) = operand2_shifted(cpu, inst);
    let op1 = cpu.reg(rn);

    let (result, carry, overflow): (u32, bool, bool) = match opcode {
        0x0 => (op1 & operand2, shift_carry, cpu.flag_v()), // AND
        0x1 => (op1 ^ operand2, shift_carry, cpu.flag_v()), // EOR
        0x2 => sub_with_flags(op1, operand2),               // SUB
        0x3 => sub_with_flags(operand2, op1),               // RSB
        0x4 => add_with_flags(op1, operand2),               // ADD
        0x5 => adc_with_flags(op1, operand2, cpu.flag_c()), // ADC
        0x6 => sbc_with_flags(op1, operand2, cpu.flag_c()), // SBC
        0x7 => sbc_with_flags(operand2, op1, cpu.flag_c()), // RSC
        0x8 => (op1 & operand2, shift_carry, cpu.flag_v()), // TST
        0x9 => (op1 ^ operand2, shift_carry, cpu.flag_v()), // TEQ
        0xa => sub_with_flags(op1, operand2),               // CMP
        0xb => add_with_flags(op1, operand2),               // CMN
        0xc => (op1 | operand2, shift_carry, cpu.flag_v()), // ORR
        0xd => (operand2, shift_carry, cpu.flag_v()),       // MOV
        0xe => (op1 & !operand2, shift_carry, cpu.flag_v()), // BIC
        0xf => (!operand2, shift_carry, cpu.flag_v()),      // MVN
        _ => unreachable!(),
    };

    let is_test = matches!(opcode, 0x8 | 0x9 | 0xa | 0xb);
    if !is_test {
        cpu.set_reg(rd, result);
        if rd == 15 {
            if set_flags {
                let spsr = cpu.spsr();
                cpu.set_cpsr(spsr);
            }
            return 3;
        }
    }
    if set_flags {
        cpu.set_flags(result & 0x8000_0000 != 0, result == 0, carry, overflow);
    }
    1
}

fn add_with_flags(a: u32, b: u32) -> (u32, bool, bool) {
    let (result, carry) = a.overflowing_add(b);
    let overflow = ((a ^ result) & (b ^ result)) & 0x8000_0000 != 0;
    (result, carry, overflow)
}

fn adc_with_flags(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let (r1, c1) = a.overflowing_add(b);
    let (result, c2) = r1.overflowing_add(carry_in as u32);
    let overflow = ((a ^ result) & (b ^ result)) & 0x8000_0000 != 0;
    (result, c1 || c2, overflow)
}

fn sub_with_flags(a: u32, b: u32) -> (u32, bool, bool) {
    let (result, borrow) = a.overflowing_sub(b);
    let overflow = ((a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    (result, !borrow, overflow)
}

fn sbc_with_flags(a: u32, b: u32, carry_in: bool) -> (u32, bool, bool) {
    let borrow_in = !carry_in as u32;
    let (r1, b1) = a.overflowing_sub(b);
    let (result, b2) = r1.overflowing_sub(borrow_in);
    let overflow = ((a ^ b) & (a ^ result)) & 0x8000_0000 != 0;
    (result, !(b1 || b2), overflow)
}

fn execute_psr_transfer(cpu: &mut Cpu, inst: u32) -> u32 {
    let use_spsr = inst & (1 << 22) != 0;
    let is_msr = inst & (1 << 21) != 0;
    if !is_msr {
        // MRS
        let rd = ((inst >> 12) & 0x0f) as usize;
        let value = if use_spsr { cpu.spsr() } else { cpu.cpsr() };
        cpu.set_reg(rd, value);
    } else {
        // MSR
        let (operand, _) = operand2_shifted(cpu, inst);
        let flags_only = inst & (1 << 16) == 0;
        let mask = if flags_only { 0xf000_0000 } else { 0xffff_ffff };
        if use_spsr {
            let spsr = (cpu.spsr() & !mask) | (operand & mask);
            cpu.set_spsr(spsr);
        } else {
            let value = (cpu.cpsr() & !mask) | (operand & mask);
            cpu.set_cpsr(value);
        }
    }
    1
}

fn execute_multiply(cpu: &mut Cpu, inst: u32) -> u32 {
    let accumulate = inst & (1 << 21) != 0;
    let set_flags = inst & (1 << 20) != 0;
    let rd = ((inst >> 16) & 0x0f) as usize;
    let rn = ((inst >> 12) & 0x0f) as usize;
    let rs = ((inst >> 8) & 0x0f) as usize;
    let rm = (inst & 0x0f) as usize;

    let mut result = cpu.reg(rm).wrapping_mul(cpu.reg(rs));
    if accumulate {
        result = result.wrapping_add(cpu.reg(rn));
    }
    cpu.set_reg(rd, result);
    if set_flags {
        cpu.set_flags(result & 0x8000_0000 != 0, result == 0, cpu.flag_c(), cpu.flag_v());
    }
    if accumulate { 2 } else { 1 }
}

fn execute_swp(cpu: &mut Cpu, bus: &mut Bus, inst: u32) -> u32 {
    let byte = inst & (1 << 22) != 0;
    let rn = ((inst >> 16) & 0x0f) as usize;
    let rd = ((inst >> 12) & 0x0f) as usize;
    let rm = (inst & 0x0f) as usize;
    let addr = cpu.reg(rn);
    if byte {
        let old = bus.read8(addr);
        bus.write8(addr, cpu.reg(rm) as u8);
        cpu.set_reg(rd, old as u32);
    } else {
        let old = bus.read32_rotated(addr);
        bus.write32(addr, cpu.reg(rm));
        cpu.set_reg(rd, old);
    }
    4
}

fn execute_bx(cpu: &mut Cpu, inst: u32) -> u32 {
    let rm = (inst & 0x0f) as usize;
    let target = cpu.reg(rm);
    let thumb = target & 1 != 0;
    let cpsr = if thumb {
        cpu.cpsr() | FLAG_T
    } else {
        cpu.cpsr() & !FLAG_T
    };
    cpu.set_cpsr(cpsr);
    cpu.set_reg(15, target & !1);
    3
}

fn execute_single_transfer(cpu: &mut Cpu, bus: &mut Bus, inst: u32) -> u32 {
    let immediate_offset = inst & (1 << 25) == 0;
    let pre_index = inst & (1 << 24) != 0;
    let add = inst & (1 << 23) != 0;
    let byte = inst & (1 << 22) != 0;
    let write_back = inst & (1 << 21) != 0 || !pre_index;
    let load = inst & (1 << 20) != 0;
    let rn = ((inst >> 16) & 0x0f) as usize;
    let rd = ((inst >> 12) & 0x0f) as usize;

    let offset = if immediate_offset {
        inst & 0xfff
    } else {
        let rm = cpu.reg((inst & 0x0f) as usize);
        let shift_type = ((inst >> 5) & 0x03) as u8;
        let amount = (inst >> 7) & 0x1f;
        barrel_shift(rm, shift_type, amount, cpu.flag_c()).0
    };

    let base = cpu.reg(rn);
    let offset_addr = if add { base.wrapping_add(offset) } else { base.wrapping_sub(offset) };
    let transfer_addr = if pre_index { offset_addr } else { base };

    if load {
        let value = if byte {
            bus.read8(transfer_addr) as u32
        } else {
            bus.read32_rotated(transfer_addr)
        };
        cpu.set_reg(rd, value);
    } else {
        let value = cpu.reg(rd);
        if byte {
            bus.write8(transfer_addr, value as u8);
        } else {
            bus.write32(transfer_addr, value);
        }
    }

    if write_back && rn != rd {
        cpu.set_reg(rn, offset_addr);
    }
    if load { 3 } else { 2 }
}

fn execute_block_transfer(cpu: &mut Cpu, bus: &mut Bus, inst: u32) -> u32 {
    let pre_index = inst & (1 << 24) != 0;
    let add = inst & (1 << 23) != 0;
    let s_bit = inst & (1 << 22) != 0;
    let write_back = inst & (1 << 21) != 0;
    let load = inst & (1 << 20) != 0;
    let rn = ((inst >> 16) & 0x0f) as usize;
    let register_list = inst & 0xffff;

    let count = register_list.count_ones().max(1);
    let base = cpu.reg(rn);

    // Lowest address touched by the transfer, regardless of direction;
    // registers are always visited low-to-high against ascending addresses.
    let low_address = match (add, pre_index) {
        (true, false) => base,                           // IA
        (true, true) => base.wrapping_add(4),            // IB
        (false, false) => base.wrapping_sub(count * 4).wrapping_add(4), // DA
        (false, true) => base.wrapping_sub(count * 4),    // DB
    };

    let mut cycles = 1;
    let mut slot = 0u32;
    for reg in 0..16 {
        if register_list & (1 << reg) == 0 {
            continue;
        }
        let access_addr = low_address.wrapping_add(slot * 4);
        if load {
            let value = bus.read32_rotated(access_addr);
            cpu.set_reg(reg, value);
        } else {
            bus.write32(access_addr, cpu.reg(reg));
        }
        slot += 1;
        cycles += 1;
    }

    if write_back {
        let new_base = if add {
            base.wrapping_add(count * 4)
        } else {
            base.wrapping_sub(count * 4)
        };
        cpu.set_reg(rn, new_base);
    }

    // `LDM ...,{...,PC}^`: the documented exception-return idiom. Restore
    // CPSR from the (still current, pre-restore) mode's SPSR.
    if load && s_bit && register_list & 0x8000 != 0 && cpu.mode().is_privileged() {
        let spsr = cpu.spsr();
        cpu.set_cpsr(spsr);
    }
    cycles
}

fn execute_branch(cpu: &mut Cpu, inst: u32) -> u32 {
    let link = inst & (1 << 24) != 0;
    let offset = ((inst & 0x00ff_ffff) as i32) << 8 >> 8;
    // r15 already sits one instruction past the branch (set by `step`
    // before dispatch), which is exactly the return address BL needs.
    if link {
        cpu.set_reg(14, cpu.pc());
    }
    // `reg(15)` folds in the pipeline read offset, giving the base the
    // branch offset is documented to be relative to.
    let target = (cpu.reg(15) as i64 + offset as i64 * 4) as u32;
    cpu.set_reg(15, target);
    3
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;

    fn load_word(bus: &mut Bus, addr: u32, word: u32) {
        bus.write32(addr, word);
    }

    #[test]
    fn test_mov_immediate_sets_register() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        cpu.reset(0x0800_0000);
        // MOV R0, #5 (AL cond, I=1, opcode=MOV, S=0)
        load_word(&mut bus, 0x0800_0000, 0xe3a0_0005);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.reg(0), 5);
    }

    #[test]
    fn test_adds_sets_carry_on_overflow() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        cpu.reset(0x0800_0000);
        cpu.set_reg(0, 0xffff_ffff);
        cpu.set_reg(1, 0x0000_0002);
        // ADDS R2, R1, R0
        load_word(&mut bus, 0x0800_0000, 0xe091_2000);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.reg(2), 1);
        assert!(cpu.flag_c());
    }

    #[test]
    fn test_branch_with_link_sets_lr() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        cpu.reset(0x0800_0000);
        // BL #0: offset field is 0, target is PC+8 (the pipeline-read base)
        load_word(&mut bus, 0x0800_0000, 0xeb00_0000);
        step(&mut cpu, &mut bus);
        assert_eq!(cpu.reg(14), 0x0800_0004);
        assert_eq!(cpu.pc(), 0x0800_0008);
    }

    #[test]
    fn test_bx_switches_to_thumb() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        cpu.reset(0x0800_0000);
        cpu.set_reg(0, 0x0800_1001);
        // BX R0
        load_word(&mut bus, 0x0800_0000, 0xe12f_ff10);
        step(&mut cpu, &mut bus);
        assert!(cpu.is_thumb());
        assert_eq!(cpu.pc(), 0x0800_1000);
    }

    #[test]
    fn test_ldm_s_bit_with_pc_restores_cpsr_from_spsr() {
        let mut cpu = Cpu::new();
        let mut bus = Bus::new();
        cpu.reset(0x0300_0000);
        // Enter IRQ mode with an SPSR that points back at plain User mode.
        cpu.set_cpsr((cpu.cpsr() & !0x1f) | 0x12); // Mode::Irq
        cpu.set_spsr(0x10); // Mode::User, ARM state, flags clear

        cpu.set_reg(13, 0x0300_0000);
        load_word(&mut bus, 0x0300_0000, 0x0000_1234); // R0
        load_word(&mut bus, 0x0300_0004, 0x0800_2000); // PC
        // LDM R13!, {R0,R15}^ (P=0,U=1,S=1,W=1,L=1)
        load_word(&mut bus, 0x0300_0008, 0xe8fd_8001);
        cpu.set_reg(15, 0x0300_0008);

        step(&mut cpu, &mut bus);

        assert_eq!(cpu.reg(0), 0x0000_1234);
        assert_eq!(cpu.pc(), 0x0800_2000);
        assert_eq!(cpu.cpsr(), 0x10);
        assert_eq!(cpu.reg(13), 0x0300_0008);
    }
}
