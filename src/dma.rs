//! The four DMA channels: snapshot-on-enable, start-timing triggers.

use crate::{
    consts::{IRQ_DMA0, IRQ_DMA1, IRQ_DMA2, IRQ_DMA3},
    interrupts::InterruptController,
    state::{StateComponent, StateFormat},
};
use gba_core_common::{
    data::{read_u16, read_u32, write_u16, write_u32},
    error::Error,
};
use std::io::Cursor;

const IRQ_FLAGS: [u16; 4] = [IRQ_DMA0, IRQ_DMA1, IRQ_DMA2, IRQ_DMA3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTiming {
    Immediate,
    VBlank,
    HBlank,
    Special,
}

impl StartTiming {
    fn from_bits(bits: u16) -> Self {
        match bits & 0x03 {
            0 => StartTiming::Immediate,
            1 => StartTiming::VBlank,
            2 => StartTiming::HBlank,
            _ => StartTiming::Special,
        }
    }

    fn to_bits(self) -> u16 {
        match self {
            StartTiming::Immediate => 0,
            StartTiming::VBlank => 1,
            StartTiming::HBlank => 2,
            StartTiming::Special => 3,
        }
    }
}

/// A single completed (or pending) block transfer the bus must carry out.
pub struct Transfer {
    pub channel: usize,
    pub source: u32,
    pub dest: u32,
    pub count: u32,
    pub word_size_32: bool,
    pub source_step: i32,
    pub dest_step: i32,
}

#[derive(Default)]
struct Channel {
    source: u32,
    dest: u32,
    count: u16,

    enabled: bool,
    irq_enabled: bool,
    repeat: bool,
    word_size_32: bool,
    source_control: u8,
    dest_control: u8,
    start_timing: u8,

    snap_source: u32,
    snap_dest: u32,
    snap_count: u32,
}

impl Channel {
    fn max_count(&self, index: usize) -> u32 {
        if self.count == 0 {
            if index == 3 {
                0x1_0000
            } else {
                0x4000
            }
        } else {
            self.count as u32
        }
    }

    fn control(&self) -> u16 {
        (self.dest_control as u16) << 5
            | (self.source_control as u16) << 7
            | if self.repeat { 1 << 9 } else { 0 }
            | if self.word_size_32 { 1 << 10 } else { 0 }
            | (self.start_timing as u16) << 12
            | if self.irq_enabled { 1 << 14 } else { 0 }
            | if self.enabled { 1 << 15 } else { 0 }
    }

    fn step_for(control: u8, word_size_32: bool) -> i32 {
        let size = if word_size_32 { 4 } else { 2 };
        match control & 0x03 {
            0 => size,
            1 => -size,
            2 => 0,
            _ => size, // increment-with-reload; reload handled by caller
        }
    }
}

pub struct Dma {
    channels: [Channel; 4],
}

impl Dma {
    pub fn new() -> Self {
        Self {
            channels: Default::default(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn source(&self, index: usize) -> u32 {
        self.channels[index].source
    }

    pub fn set_source(&mut self, index: usize, value: u32) {
        self.channels[index].source = value;
    }

    pub fn dest(&self, index: usize) -> u32 {
        self.channels[index].dest
    }

    pub fn set_dest(&mut self, index: usize, value: u32) {
        self.channels[index].dest = value;
    }

    pub fn count(&self, index: usize) -> u16 {
        self.channels[index].count
    }

    pub fn set_count(&mut self, index: usize, value: u16) {
        self.channels[index].count = value;
    }

    pub fn control(&self, index: usize) -> u16 {
        self.channels[index].control()
    }

    /// Writes DMAxCNT_H. On a 0->1 ENABLE transition, snapshots
    /// source/dest/count and, for immediate start-timing, returns a
    /// [`Transfer`] ready to execute.
    pub fn set_control(&mut self, index: usize, value: u16) -> Option<Transfer> {
        let channel = &mut self.channels[index];
        let was_enabled = channel.enabled;

        channel.dest_control = ((value >> 5) & 0x03) as u8;
        channel.source_control = ((value >> 7) & 0x03) as u8;
        channel.repeat = value & (1 << 9) != 0;
        channel.word_size_32 = value & (1 << 10) != 0;
        channel.start_timing = ((value >> 12) & 0x03) as u8;
        channel.irq_enabled = value & (1 << 14) != 0;
        channel.enabled = value & (1 << 15) != 0;

        if channel.enabled && !was_enabled {
            self.snapshot(index);
            if self.start_timing(index) == StartTiming::Immediate {
                return Some(self.build_transfer(index));
            }
        }
        None
    }

    fn snapshot(&mut self, index: usize) {
        let channel = &mut self.channels[index];
        channel.snap_source = channel.source;
        channel.snap_dest = channel.dest;
        channel.snap_count = channel.max_count(index);
    }

    pub fn start_timing(&self, index: usize) -> StartTiming {
        StartTiming::from_bits(self.channels[index].start_timing as u16)
    }

    fn build_transfer(&self, index: usize) -> Transfer {
        let channel = &self.channels[index];
        Transfer {
            channel: index,
            source: channel.snap_source,
            dest: channel.snap_dest,
            count: channel.snap_count,
            word_size_32: channel.word_size_32,
            source_step: Channel::step_for(channel.source_control, channel.word_size_32),
            dest_step: Channel::step_for(channel.dest_control, channel.word_size_32),
        }
    }

    /// Called by the frame driver at VBlank/HBlank events; returns the
    /// transfers (by ascending channel, i.e. priority order) whose
    /// start-timing matches.
    pub fn trigger(&mut self, timing: StartTiming) -> Vec<Transfer> {
        let mut transfers = Vec::new();
        for index in 0..4 {
            if self.channels[index].enabled && self.start_timing(index) == timing {
                transfers.push(self.build_transfer(index));
            }
        }
        transfers
    }

    /// Called once a triggered transfer has completed; clears ENABLE
    /// unless repeat is set, raises IRQ if enabled, and re-snapshots
    /// dest when dest-control requests increment-with-reload.
    pub fn complete(&mut self, index: usize, interrupts: &mut InterruptController) {
        let channel = &mut self.channels[index];
        if channel.irq_enabled {
            interrupts.raise(IRQ_FLAGS[index]);
        }
        if channel.repeat {
            if channel.dest_control == 3 {
                channel.snap_dest = channel.dest;
            }
            channel.snap_count = channel.max_count(index);
        } else {
            channel.enabled = false;
        }
    }
}

impl Default for Dma {
    fn default() -> Self {
        Self::new()
    }
}

impl StateComponent for Dma {
    fn state(&self, _format: Option<StateFormat>) -> Result<Vec<u8>, Error> {
        let mut data = Vec::new();
        for channel in &self.channels {
            write_u32(&mut data, channel.source)?;
            write_u32(&mut data, channel.dest)?;
            write_u16(&mut data, channel.count)?;
            write_u16(&mut data, channel.control())?;
            write_u32(&mut data, channel.snap_source)?;
            write_u32(&mut data, channel.snap_dest)?;
            write_u32(&mut data, channel.snap_count)?;
        }
        Ok(data)
    }

    fn set_state(&mut self, data: &[u8], _format: Option<StateFormat>) -> Result<(), Error> {
        let mut cursor = Cursor::new(data);
        for index in 0..4 {
            let source = read_u32(&mut cursor)?;
            let dest = read_u32(&mut cursor)?;
            let count = read_u16(&mut cursor)?;
            let control = read_u16(&mut cursor)?;
            let snap_source = read_u32(&mut cursor)?;
            let snap_dest = read_u32(&mut cursor)?;
            let snap_count = read_u32(&mut cursor)?;

            let channel = &mut self.channels[index];
            channel.source = source;
            channel.dest = dest;
            channel.count = count;
            channel.dest_control = ((control >> 5) & 0x03) as u8;
            channel.source_control = ((control >> 7) & 0x03) as u8;
            channel.repeat = control & (1 << 9) != 0;
            channel.word_size_32 = control & (1 << 10) != 0;
            channel.start_timing = ((control >> 12) & 0x03) as u8;
            channel.irq_enabled = control & (1 << 14) != 0;
            channel.enabled = control & (1 << 15) != 0;
            channel.snap_source = snap_source;
            channel.snap_dest = snap_dest;
            channel.snap_count = snap_count;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Dma, StartTiming};

    #[test]
    fn test_count_zero_means_max() {
        let mut dma = Dma::new();
        dma.set_count(3, 0);
        dma.set_control(3, 1 << 15);
        assert_eq!(dma.channels[3].snap_count, 0x1_0000);

        dma.set_count(0, 0);
        dma.set_control(0, 1 << 15);
        assert_eq!(dma.channels[0].snap_count, 0x4000);
    }

    #[test]
    fn test_immediate_transfer_is_returned_on_enable() {
        let mut dma = Dma::new();
        dma.set_source(0, 0x0200_0000);
        dma.set_dest(0, 0x0600_0000);
        dma.set_count(0, 4);
        let transfer = dma.set_control(0, 1 << 15).unwrap();
        assert_eq!(transfer.source, 0x0200_0000);
        assert_eq!(transfer.dest, 0x0600_0000);
        assert_eq!(transfer.count, 4);
    }

    #[test]
    fn test_snapshot_is_immune_to_later_register_writes() {
        let mut dma = Dma::new();
        dma.set_source(1, 0x0800_0000);
        dma.set_dest(1, 0x0600_0000);
        dma.set_count(1, 2);
        dma.set_control(1, (1 << 15) | 1); // enable, VBlank start
        dma.set_source(1, 0x0800_1000); // modified after enable
        let transfers = dma.trigger(StartTiming::VBlank);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].source, 0x0800_0000);
    }
}
