//! Memory map base addresses/sizes and MMIO register offsets.

// Region base addresses, per the documented GBA memory map.
pub const BIOS_BASE: u32 = 0x0000_0000;
pub const EWRAM_BASE: u32 = 0x0200_0000;
pub const IWRAM_BASE: u32 = 0x0300_0000;
pub const MMIO_BASE: u32 = 0x0400_0000;
pub const PALETTE_BASE: u32 = 0x0500_0000;
pub const VRAM_BASE: u32 = 0x0600_0000;
pub const OAM_BASE: u32 = 0x0700_0000;
pub const ROM_BASE: u32 = 0x0800_0000;
pub const SRAM_BASE: u32 = 0x0E00_0000;

pub const BIOS_SIZE: u32 = 16 * 1024;
pub const EWRAM_SIZE: u32 = 256 * 1024;
pub const IWRAM_SIZE: u32 = 32 * 1024;
pub const MMIO_SIZE: u32 = 1024;
pub const PALETTE_SIZE: u32 = 1024;
pub const VRAM_SIZE: u32 = 96 * 1024;
pub const VRAM_SLOT_SIZE: u32 = 128 * 1024;
pub const OAM_SIZE: u32 = 1024;
pub const ROM_MAX_SIZE: u32 = 32 * 1024 * 1024;
pub const SRAM_SIZE: u32 = 128 * 1024;

/// Value returned by reads from any address outside the regions above.
pub const OPEN_BUS_VALUE: u8 = 0xff;

// Display / PPU MMIO offsets (relative to MMIO_BASE).
pub const DISPCNT_ADDR: u32 = 0x000;
pub const DISPSTAT_ADDR: u32 = 0x004;
pub const VCOUNT_ADDR: u32 = 0x006;
pub const BG0CNT_ADDR: u32 = 0x008;
pub const BG1CNT_ADDR: u32 = 0x00a;
pub const BG2CNT_ADDR: u32 = 0x00c;
pub const BG3CNT_ADDR: u32 = 0x00e;
pub const BG0HOFS_ADDR: u32 = 0x010;
pub const BG0VOFS_ADDR: u32 = 0x012;
pub const BG2PA_ADDR: u32 = 0x020;
pub const BG2PB_ADDR: u32 = 0x022;
pub const BG2PC_ADDR: u32 = 0x024;
pub const BG2PD_ADDR: u32 = 0x026;
pub const BG2X_ADDR: u32 = 0x028;
pub const BG2Y_ADDR: u32 = 0x02c;
pub const BG3PA_ADDR: u32 = 0x030;
pub const BG3X_ADDR: u32 = 0x038;
pub const BG3Y_ADDR: u32 = 0x03c;
pub const WIN0H_ADDR: u32 = 0x040;
pub const WIN1H_ADDR: u32 = 0x042;
pub const WIN0V_ADDR: u32 = 0x044;
pub const WIN1V_ADDR: u32 = 0x046;
pub const WININ_ADDR: u32 = 0x048;
pub const WINOUT_ADDR: u32 = 0x04a;
pub const BLDCNT_ADDR: u32 = 0x050;
pub const BLDALPHA_ADDR: u32 = 0x052;
pub const BLDY_ADDR: u32 = 0x054;

// Keypad.
pub const KEYINPUT_ADDR: u32 = 0x130;

// Interrupt / system control.
pub const IE_ADDR: u32 = 0x200;
pub const IF_ADDR: u32 = 0x202;
pub const WAITCNT_ADDR: u32 = 0x204;
pub const IME_ADDR: u32 = 0x208;
pub const POSTFLG_ADDR: u32 = 0x300;
pub const HALTCNT_ADDR: u32 = 0x301;

// Timers: 4 timers of 4 bytes each (counter/reload, control).
pub const TIMER_BASE: u32 = 0x100;
pub const TIMER_STRIDE: u32 = 4;

// DMA: 4 channels of 12 bytes each (source, dest, count/control).
pub const DMA_BASE: u32 = 0x0b0;
pub const DMA_STRIDE: u32 = 12;

// Cartridge GPIO overlay, inside the ROM region.
pub const GPIO_DATA_ADDR: u32 = ROM_BASE + 0x0000_00c4;
pub const GPIO_DIRECTION_ADDR: u32 = ROM_BASE + 0x0000_00c6;
pub const GPIO_CONTROL_ADDR: u32 = ROM_BASE + 0x0000_00c8;

// Interrupt flag bits.
pub const IRQ_VBLANK: u16 = 1 << 0;
pub const IRQ_HBLANK: u16 = 1 << 1;
pub const IRQ_VCOUNT: u16 = 1 << 2;
pub const IRQ_TIMER0: u16 = 1 << 3;
pub const IRQ_TIMER1: u16 = 1 << 4;
pub const IRQ_TIMER2: u16 = 1 << 5;
pub const IRQ_TIMER3: u16 = 1 << 6;
pub const IRQ_DMA0: u16 = 1 << 8;
pub const IRQ_DMA1: u16 = 1 << 9;
pub const IRQ_DMA2: u16 = 1 << 10;
pub const IRQ_DMA3: u16 = 1 << 11;
pub const IRQ_KEYPAD: u16 = 1 << 12;

// Display geometry.
pub const SCREEN_WIDTH: usize = 240;
pub const SCREEN_HEIGHT: usize = 160;
pub const SCANLINE_CYCLES: u32 = 1232;
pub const HDRAW_CYCLES: u32 = 960;
pub const TOTAL_SCANLINES: u16 = 228;
pub const VBLANK_LINE: u16 = 160;

// Cartridge header layout (all offsets relative to ROM start).
pub const HEADER_TITLE_OFFSET: usize = 0xa0;
pub const HEADER_TITLE_SIZE: usize = 12;
pub const HEADER_GAME_CODE_OFFSET: usize = 0xac;
pub const HEADER_MAKER_CODE_OFFSET: usize = 0xb0;
pub const HEADER_VERSION_OFFSET: usize = 0xbc;
pub const HEADER_CHECKSUM_OFFSET: usize = 0xbd;

// BIOS IRQ/SWI vectors in the HLE BIOS image.
pub const BIOS_VECTOR_SWI: u32 = 0x08;
pub const BIOS_VECTOR_IRQ: u32 = 0x18;
pub const IRQ_HANDLER_POINTER: u32 = 0x0300_7ffc;

pub const BIOS_CHECKSUM: u32 = 0xbaae_187f;
