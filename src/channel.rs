//! UART Channel State
//! Tracks the host-side read cursor of each record ring

use std::fmt;

use crate::error::Error;
use crate::regs::{ChannelLayout, BUFFER_SIZE, CHANNELS};

/// One of the two UART engines on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Uart0 = 0,
    Uart1 = 1,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::Uart0, ChannelId::Uart1];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Fixed addresses of this channel's engine, memories and pins.
    pub fn layout(self) -> &'static ChannelLayout {
        &CHANNELS[self.index()]
    }

    /// The channel wired to receive what this one transmits.
    pub fn peer(self) -> ChannelId {
        match self {
            ChannelId::Uart0 => ChannelId::Uart1,
            ChannelId::Uart1 => ChannelId::Uart0,
        }
    }
}

impl TryFrom<u8> for ChannelId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ChannelId::Uart0),
            1 => Ok(ChannelId::Uart1),
            other => Err(Error::InvalidChannel(other)),
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UART{}", self.index())
    }
}

/// Last drained ring offset of each channel.
///
/// Every cursor stays in `[0, BUFFER_SIZE)`. Only the receive path moves a
/// cursor; configuration zeroes both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelState {
    cursors: [u32; 2],
}

impl ChannelState {
    pub fn new() -> Self {
        ChannelState { cursors: [0; 2] }
    }

    pub fn cursor(&self, channel: ChannelId) -> u32 {
        self.cursors[channel.index()]
    }

    /// Move the cursor to a write pointer value that has been fully drained
    pub(crate) fn advance(&mut self, channel: ChannelId, offset: u32) {
        debug_assert!(offset < BUFFER_SIZE);
        self.cursors[channel.index()] = offset;
    }

    /// Forget all drain history
    pub fn reset(&mut self) {
        self.cursors = [0; 2];
    }
}
