//! Register map of the SmartWave UART bitstream.
//!
//! Addresses and field positions are fixed by the hardware revision and must
//! match it bit for bit. Anything channel-specific lives in [`CHANNELS`] so the
//! driver logic has a single code path for both engines.

use bitfield::bitfield;

/// Fabric clock feeding the UART baud generators.
pub const SYSTEM_CLOCK_HZ: u32 = 100_000_000;

/// Capacity of each record ring in device address units.
pub const BUFFER_SIZE: u32 = 0x2000;

/// Address units per record/stimulus memory word. One word holds one UART character.
pub const WORD_SIZE: u32 = 4;

/// Capacity of each stimulus memory in device address units.
pub const STIM_CAPACITY: u32 = 0x2000;

/// Largest value the 10-bit UART timeout field holds.
pub const TIMEOUT_MAX_TICKS: u32 = 0x3FF;

/// Microseconds per UART timeout tick.
pub const TIMEOUT_TICK_US: u32 = 10;

/// Trigger engine settings used for every transmission.
pub const CORE_SYNC_COUNT: u8 = 16;
pub const CORE_SUBCYCLE_COUNT: u8 = 8;

const MEM_BASE: u32 = 0x2_0000;

const fn mem_block(index: u32) -> u32 {
    MEM_BASE + (index << 13)
}

/// Trigger engine control register.
pub const CORE_CTRL: u32 = 0x1_0000;

const INTERCONNECT_BASE: u32 = 0x1_0100;
const PIN_OUTPUT_BASE: u32 = 0x1_0200;
const PIN_INPUT_BASE: u32 = 0x1_0300;

/// Interconnect source ids.
pub mod source {
    pub const STIM_MEM_0: u32 = 0x01;
    pub const STIM_MEM_1: u32 = 0x02;
    pub const DRIVE_UART_0: u32 = 0x03;
    pub const DRIVE_UART_1: u32 = 0x04;
}

/// Output pin multiplexer signal ids.
pub mod signal {
    pub const DRIVE_UART_0_TX: u32 = 0x01;
    pub const DRIVE_UART_1_TX: u32 = 0x02;
}

/// Physical header pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pin {
    A1 = 0,
    A2 = 1,
    A3 = 2,
    A4 = 3,
}

impl Pin {
    pub fn index(self) -> u32 {
        self as u32
    }

    /// Output multiplexer register selecting the signal driven onto this pin.
    pub fn output_select(self) -> u32 {
        PIN_OUTPUT_BASE + self.index() * 4
    }
}

/// Fixed addresses belonging to one UART channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelLayout {
    /// Hardware write pointer of the record ring (read-only).
    pub record_pointer: u32,
    pub record_control: u32,
    /// Start of the record ring data region.
    pub record_memory: u32,
    pub stim_control: u32,
    pub stim_config: u32,
    pub stim_memory: u32,
    pub uart_control: u32,
    pub uart_divisor: u32,
    /// Interconnect register choosing what feeds the UART engine's TX data.
    pub uart_select: u32,
    /// Interconnect register choosing what the record memory captures.
    pub record_select: u32,
    pub stim_source: u32,
    pub uart_source: u32,
    pub tx_pin: Pin,
    pub rx_pin: Pin,
    pub tx_signal: u32,
    /// Input multiplexer register choosing the pin sampled by the engine's RX.
    pub rx_input_select: u32,
}

pub static CHANNELS: [ChannelLayout; 2] = [
    ChannelLayout {
        record_pointer: 0x1_0604,
        record_control: 0x1_0600,
        record_memory: mem_block(4),
        stim_control: 0x1_0400,
        stim_config: 0x1_0404,
        stim_memory: mem_block(2),
        uart_control: 0x1_0800,
        uart_divisor: 0x1_0804,
        uart_select: INTERCONNECT_BASE,
        record_select: INTERCONNECT_BASE + 0x08,
        stim_source: source::STIM_MEM_0,
        uart_source: source::DRIVE_UART_0,
        tx_pin: Pin::A1,
        rx_pin: Pin::A2,
        tx_signal: signal::DRIVE_UART_0_TX,
        rx_input_select: PIN_INPUT_BASE,
    },
    ChannelLayout {
        record_pointer: 0x1_0704,
        record_control: 0x1_0700,
        record_memory: mem_block(5),
        stim_control: 0x1_0500,
        stim_config: 0x1_0504,
        stim_memory: mem_block(3),
        uart_control: 0x1_0900,
        uart_divisor: 0x1_0904,
        uart_select: INTERCONNECT_BASE + 0x04,
        record_select: INTERCONNECT_BASE + 0x0C,
        stim_source: source::STIM_MEM_1,
        uart_source: source::DRIVE_UART_1,
        tx_pin: Pin::A3,
        rx_pin: Pin::A4,
        tx_signal: signal::DRIVE_UART_1_TX,
        rx_input_select: PIN_INPUT_BASE + 0x04,
    },
];

bitfield! {
    /// UART engine control register.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct UartControl(u32);
    impl Debug;
    pub enable, set_enable: 0;
    pub u8, word_length, set_word_length: 4, 1;
    pub u8, parity, set_parity: 6, 5;
    pub u8, stop_bits, set_stop_bits: 8, 7;
    pub shift_msb_first, set_shift_msb_first: 9;
    pub u16, timeout, set_timeout: 19, 10;
}

bitfield! {
    /// Stimulus memory playback window, in address units.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct StimConfig(u32);
    impl Debug;
    pub u16, start_offset, set_start_offset: 15, 0;
    pub u16, trigger_count, set_trigger_count: 31, 16;
}

bitfield! {
    /// Shared trigger engine control register.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct CoreControl(u32);
    impl Debug;
    pub enable, set_enable: 0;
    pub u8, sync_count, set_sync_count: 15, 8;
    pub u8, subcycle_count, set_subcycle_count: 23, 16;
}

bitfield! {
    /// Enable register shared by the record and stimulus memories.
    #[derive(Clone, Copy, Default, PartialEq, Eq)]
    pub struct MemControl(u32);
    impl Debug;
    pub enable, set_enable: 0;
}

macro_rules! raw_register {
    ($($name:ident),*) => {
        $(
            impl $name {
                pub fn from_bits(bits: u32) -> Self {
                    $name(bits)
                }

                pub fn bits(&self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

raw_register!(UartControl, StimConfig, CoreControl, MemControl);

impl MemControl {
    pub fn enabled(enable: bool) -> Self {
        let mut reg = MemControl::default();
        reg.set_enable(enable);
        reg
    }
}

impl StimConfig {
    pub fn window(start_offset: u16, trigger_count: u16) -> Self {
        let mut reg = StimConfig::default();
        reg.set_start_offset(start_offset);
        reg.set_trigger_count(trigger_count);
        reg
    }
}
