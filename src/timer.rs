//! The four hardware timers, with prescaling and cascade chaining.

use crate::{
    consts::{IRQ_TIMER0, IRQ_TIMER1, IRQ_TIMER2, IRQ_TIMER3},
    interrupts::InterruptController,
    state::{StateComponent, StateFormat},
};
use gba_core_common::{
    data::{read_u16, read_u32, write_u16, write_u32},
    error::Error,
};
use std::io::Cursor;

const PRESCALER_TABLE: [u32; 4] = [1, 64, 256, 1024];
const IRQ_FLAGS: [u16; 4] = [IRQ_TIMER0, IRQ_TIMER1, IRQ_TIMER2, IRQ_TIMER3];

#[derive(Clone, Copy, Default)]
pub struct Timer {
    reload: u16,
    counter: u16,
    enabled: bool,
    irq_enabled: bool,
    cascade: bool,
    prescaler_select: u8,
    clock: u32,
}

impl Timer {
    fn prescaler(&self) -> u32 {
        PRESCALER_TABLE[self.prescaler_select as usize & 0x03]
    }

    fn control(&self) -> u16 {
        (self.prescaler_select as u16 & 0x03)
            | if self.cascade { 1 << 2 } else { 0 }
            | if self.irq_enabled { 1 << 6 } else { 0 }
            | if self.enabled { 1 << 7 } else { 0 }
    }

    fn set_control(&mut self, value: u16) {
        let was_enabled = self.enabled;
        self.prescaler_select = (value & 0x03) as u8;
        self.cascade = value & (1 << 2) != 0;
        self.irq_enabled = value & (1 << 6) != 0;
        self.enabled = value & (1 << 7) != 0;
        if self.enabled && !was_enabled {
            self.counter = self.reload;
            self.clock = 0;
        }
    }

    /// Advances this timer by one tick (used for cascade chaining), returns
    /// true if it overflowed.
    fn tick_one(&mut self) -> bool {
        let (next, overflow) = self.counter.overflowing_add(1);
        self.counter = if overflow { self.reload } else { next };
        overflow
    }
}

pub struct Timers {
    timers: [Timer; 4],
}

impl Timers {
    pub fn new() -> Self {
        Self {
            timers: [Timer::default(); 4],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn reload(&self, index: usize) -> u16 {
        self.timers[index].reload
    }

    pub fn set_reload(&mut self, index: usize, value: u16) {
        self.timers[index].reload = value;
    }

    pub fn control(&self, index: usize) -> u16 {
        self.timers[index].control()
    }

    pub fn set_control(&mut self, index: usize, value: u16) {
        self.timers[index].set_control(value);
    }

    /// Live counter value, matching the "reading the counter returns the
    /// accumulator-accurate value" contract (no separate latch needed
    /// since we tick in whole-cycle steps).
    pub fn counter(&self, index: usize) -> u16 {
        self.timers[index].counter
    }

    /// Advances all enabled, non-cascading timers by `cycles`, chaining
    /// overflows into cascade-mode successors and raising interrupts.
    pub fn step(&mut self, cycles: u32, interrupts: &mut InterruptController) {
        for index in 0..4 {
            if !self.timers[index].enabled || self.timers[index].cascade {
                continue;
            }
            self.advance(index, cycles, interrupts);
        }
    }

    fn advance(&mut self, index: usize, cycles: u32, interrupts: &mut InterruptController) {
        let prescaler = self.timers[index].prescaler();
        self.timers[index].clock += cycles;
        while self.timers[index].clock >= prescaler {
            self.timers[index].clock -= prescaler;
            if self.timers[index].tick_one() {
                if self.timers[index].irq_enabled {
                    interrupts.raise(IRQ_FLAGS[index]);
                }
                self.cascade_from(index, interrupts);
            }
        }
    }

    fn cascade_from(&mut self, index: usize, interrupts: &mut InterruptController) {
        let next = index + 1;
        if next >= 4 || !self.timers[next].enabled || !self.timers[next].cascade {
            return;
        }
        if self.timers[next].tick_one() {
            if self.timers[next].irq_enabled {
                interrupts.raise(IRQ_FLAGS[next]);
            }
            self.cascade_from(next, interrupts);
        }
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self::new()
    }
}

impl StateComponent for Timers {
    fn state(&self, _format: Option<StateFormat>) -> Result<Vec<u8>, Error> {
        let mut data = Vec::new();
        for timer in &self.timers {
            write_u16(&mut data, timer.reload)?;
            write_u16(&mut data, timer.counter)?;
            write_u16(&mut data, timer.control())?;
            write_u32(&mut data, timer.clock)?;
        }
        Ok(data)
    }

    fn set_state(&mut self, data: &[u8], _format: Option<StateFormat>) -> Result<(), Error> {
        let mut cursor = Cursor::new(data);
        for timer in &mut self.timers {
            timer.reload = read_u16(&mut cursor)?;
            timer.counter = read_u16(&mut cursor)?;
            let control = read_u16(&mut cursor)?;
            timer.prescaler_select = (control & 0x03) as u8;
            timer.cascade = control & (1 << 2) != 0;
            timer.irq_enabled = control & (1 << 6) != 0;
            timer.enabled = control & (1 << 7) != 0;
            timer.clock = read_u32(&mut cursor)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Timers;
    use crate::{consts::IRQ_TIMER1, interrupts::InterruptController};

    #[test]
    fn test_enable_latches_reload() {
        let mut timers = Timers::new();
        timers.set_reload(0, 0xfff0);
        timers.set_control(0, 1 << 7);
        assert_eq!(timers.counter(0), 0xfff0);
    }

    #[test]
    fn test_overflow_reloads_and_raises_irq() {
        let mut timers = Timers::new();
        let mut interrupts = InterruptController::new();
        interrupts.set_ie(crate::consts::IRQ_TIMER0);
        timers.set_reload(0, 0xfffe);
        timers.set_control(0, (1 << 7) | (1 << 6)); // enable + irq, prescaler=1
        timers.step(3, &mut interrupts); // 0xfffe -> 0xffff -> 0x0000(overflow->reload)
        assert_eq!(timers.counter(0), 0xffff);
        assert_ne!(interrupts.iflags() & crate::consts::IRQ_TIMER0, 0);
    }

    #[test]
    fn test_cascade_chain() {
        let mut timers = Timers::new();
        let mut interrupts = InterruptController::new();
        interrupts.set_ie(IRQ_TIMER1);

        timers.set_reload(0, 0xfffe);
        timers.set_control(0, (1 << 7) | (1 << 6)); // enable+irq, prescaler 1

        timers.set_reload(1, 0xffff);
        timers.set_control(1, (1 << 7) | (1 << 6) | (1 << 2)); // enable+irq+cascade

        // two ticks overflow timer 0 once, cascading timer 1 by one tick.
        timers.step(2, &mut interrupts);
        assert_eq!(timers.counter(1), 0x0000);
        assert_ne!(interrupts.iflags() & IRQ_TIMER1, 0);
    }
}
