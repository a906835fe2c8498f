//! UART Configuration Encoder
//! Maps human UART parameters onto the engine's register fields

use std::time::Duration;

use clap::ValueEnum;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::{Error, Result};
use crate::regs::{
    UartControl, BUFFER_SIZE, SYSTEM_CLOCK_HZ, TIMEOUT_MAX_TICKS, TIMEOUT_TICK_US, WORD_SIZE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, ValueEnum)]
#[repr(u8)]
pub enum Parity {
    None = 0,
    Odd = 1,
    Even = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, ValueEnum)]
#[repr(u8)]
pub enum StopBits {
    None = 0,
    One = 1,
    OneAndHalf = 2,
    Two = 3,
}

impl StopBits {
    fn half_bits(self) -> u32 {
        match self {
            StopBits::None => 0,
            StopBits::One => 2,
            StopBits::OneAndHalf => 3,
            StopBits::Two => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive, ValueEnum)]
#[repr(u8)]
pub enum ShiftDirection {
    LsbFirst = 0,
    MsbFirst = 1,
}

/// Widest character the 4-bit word length field can describe.
pub const MAX_WORD_LENGTH: u8 = 15;

/// Settings applied identically to both UART engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UartConfig {
    pub baud_rate: u32,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub shift_direction: ShiftDirection,
    /// Bits per transmitted character.
    pub word_length: u8,
    /// Receive timeout. Quantized to 10 µs ticks and saturated at 1023 ticks.
    pub timeout_us: u32,
}

impl Default for UartConfig {
    fn default() -> Self {
        UartConfig {
            baud_rate: 115_200,
            parity: Parity::None,
            stop_bits: StopBits::One,
            shift_direction: ShiftDirection::LsbFirst,
            word_length: 8,
            timeout_us: 10_230,
        }
    }
}

/// Register-ready form of a [`UartConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedUart {
    pub divisor: u32,
    pub timeout_ticks: u16,
    pub control: UartControl,
}

impl UartConfig {
    /// Build a config from the raw selector codes used on the wire.
    pub fn from_raw(
        baud_rate: u32,
        parity: u8,
        stop_bits: u8,
        shift_direction: u8,
        word_length: u8,
        timeout_us: u32,
    ) -> Result<Self> {
        let parity = Parity::try_from(parity)
            .map_err(|e| Error::invalid("parity", format!("unknown selector {}", e.number)))?;
        let stop_bits = StopBits::try_from(stop_bits)
            .map_err(|e| Error::invalid("stop_bits", format!("unknown selector {}", e.number)))?;
        let shift_direction = ShiftDirection::try_from(shift_direction).map_err(|e| {
            Error::invalid("shift_direction", format!("unknown selector {}", e.number))
        })?;

        let config = UartConfig {
            baud_rate,
            parity,
            stop_bits,
            shift_direction,
            word_length,
            timeout_us,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_parity(mut self, parity: Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_shift_direction(mut self, shift_direction: ShiftDirection) -> Self {
        self.shift_direction = shift_direction;
        self
    }

    pub fn with_word_length(mut self, word_length: u8) -> Self {
        self.word_length = word_length;
        self
    }

    pub fn with_timeout_us(mut self, timeout_us: u32) -> Self {
        self.timeout_us = timeout_us;
        self
    }

    pub fn validate(&self) -> Result<()> {
        baud_divisor(self.baud_rate)?;
        if self.word_length == 0 || self.word_length > MAX_WORD_LENGTH {
            return Err(Error::invalid(
                "word_length",
                format!("{} bits is outside 1..={}", self.word_length, MAX_WORD_LENGTH),
            ));
        }
        Ok(())
    }

    /// Compute every derived field and pack the control register
    pub fn encode(&self) -> Result<EncodedUart> {
        self.validate()?;
        let divisor = baud_divisor(self.baud_rate)?;
        let timeout_ticks = timeout_ticks(self.timeout_us);

        let mut control = UartControl::default();
        control.set_enable(true);
        control.set_word_length(self.word_length);
        control.set_parity(self.parity.into());
        control.set_stop_bits(self.stop_bits.into());
        control.set_shift_msb_first(self.shift_direction == ShiftDirection::MsbFirst);
        control.set_timeout(timeout_ticks);

        Ok(EncodedUart {
            divisor,
            timeout_ticks,
            control,
        })
    }

    /// Line time of one character in half-bit units.
    fn frame_half_bits(&self) -> u32 {
        let parity = if self.parity == Parity::None { 0 } else { 1 };
        2 * (1 + self.word_length as u32 + parity) + self.stop_bits.half_bits()
    }

    /// Bits on the line per character, start and stop bits included.
    pub fn frame_bits(&self) -> f64 {
        self.frame_half_bits() as f64 / 2.0
    }

    /// Longest gap between drains before a saturated line can lap the record ring.
    ///
    /// A lap cannot be detected by the host: the drained data silently skips
    /// whole rings. Poll well inside this bound.
    pub fn max_safe_poll_interval(&self) -> Duration {
        if self.baud_rate == 0 {
            return Duration::ZERO;
        }
        let words = (BUFFER_SIZE / WORD_SIZE) as u64;
        let nanos = words * self.frame_half_bits() as u64 * 1_000_000_000;
        Duration::from_nanos(nanos / (2 * self.baud_rate as u64))
    }
}

/// Baud generator divisor for the 100 MHz fabric clock.
pub fn baud_divisor(baud_rate: u32) -> Result<u32> {
    if baud_rate == 0 {
        return Err(Error::invalid("baud_rate", "must be greater than zero"));
    }
    let divisor = SYSTEM_CLOCK_HZ / baud_rate;
    if divisor == 0 {
        return Err(Error::invalid(
            "baud_rate",
            format!("{} exceeds the {} Hz fabric clock", baud_rate, SYSTEM_CLOCK_HZ),
        ));
    }
    Ok(divisor)
}

/// Quantize a timeout to 10 µs ticks, saturating at the 10-bit field maximum.
pub fn timeout_ticks(timeout_us: u32) -> u16 {
    (timeout_us / TIMEOUT_TICK_US).min(TIMEOUT_MAX_TICKS) as u16
}
