//! Cross-module scenarios from the ARM/Thumb testable-properties list:
//! flag computation and the pipelined PC as observed by an executing
//! instruction.

use gba_core::bus::Bus;
use gba_core::cpu::Cpu;

const CODE_BASE: u32 = 0x0300_0000; // IWRAM, writable, used as a scratch execution site.

fn cpu_at(entry: u32) -> Cpu {
    let mut cpu = Cpu::new();
    cpu.reset(entry);
    cpu
}

#[test]
fn arm_adds_overflow_sets_all_four_flags() {
    let mut cpu = cpu_at(CODE_BASE);
    let mut bus = Bus::new();
    bus.write32(CODE_BASE, 0xe091_0002); // ADDS r0, r1, r2
    cpu.set_reg(1, 0x8000_0000);
    cpu.set_reg(2, 0x8000_0000);

    cpu.step(&mut bus);

    assert_eq!(cpu.reg(0), 0);
    assert!(!cpu.flag_n());
    assert!(cpu.flag_z());
    assert!(cpu.flag_c());
    assert!(cpu.flag_v());
}

#[test]
fn thumb_long_branch_link_pair_targets_pipeline_adjusted_pc() {
    let mut cpu = cpu_at(CODE_BASE);
    cpu.set_cpsr(cpu.cpsr() | gba_core::cpu::FLAG_T);

    let mut bus = Bus::new();
    // BL +0x04 as two Thumb halfwords at 0x08000100-equivalent (here CODE_BASE):
    // H1=0xF000 (high part, offset bits all zero), H2=0xF802 (low half, offset=0x04).
    bus.write16(CODE_BASE, 0xf000);
    bus.write16(CODE_BASE + 2, 0xf802);

    cpu.step(&mut bus); // first halfword: LR := PC(pipeline-adjusted) + 0
    cpu.step(&mut bus); // second halfword: PC := LR + offset*2, LR := return|1

    assert!(cpu.is_thumb());
    assert_eq!(cpu.reg(14) & 1, 1);
    assert_eq!(cpu.pc(), CODE_BASE + 8);
}

#[test]
fn memory_mirror_ewram_repeats_every_256kib() {
    let mut bus = Bus::new();
    bus.write32(0x0200_0000, 0xdead_beef);
    assert_eq!(bus.read32(0x0204_0000), 0xdead_beef);
    assert_eq!(bus.read32(0x02c0_0000), 0xdead_beef); // third 256 KiB mirror
}

#[test]
fn interrupt_flag_write_acknowledges_only_named_bits() {
    let mut bus = Bus::new();
    bus.interrupts.raise(gba_core::consts::IRQ_VBLANK | gba_core::consts::IRQ_TIMER0);
    bus.interrupts.write_if(gba_core::consts::IRQ_VBLANK);
    assert_eq!(bus.interrupts.iflags(), gba_core::consts::IRQ_TIMER0);
}
