//! Error taxonomy for register access and the UART operations built on it.

use thiserror::Error;

use crate::channel::ChannelId;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected before any register write was issued.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid channel {0} (expected 0 or 1)")]
    InvalidChannel(u8),

    /// The write pointer kept moving for `passes` read passes.
    ///
    /// `drained` holds everything read before giving up. The cursor is moved
    /// past those bytes, so calling `drain` again continues where this call
    /// stopped.
    #[error("{channel} drain did not catch up after {passes} passes ({} bytes read)", .drained.len())]
    DrainTimeout {
        channel: ChannelId,
        passes: usize,
        drained: Vec<u8>,
    },

    /// The hardware reported a write pointer outside the ring or off a word boundary.
    #[error("{channel} write pointer {value:#06x} is outside the record ring")]
    PointerOutOfRange { channel: ChannelId, value: u32 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Failure of the link to the device. Always fatal to the current operation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("USB transfer failed: {0}")]
    Usb(#[from] nusb::transfer::TransferError),

    #[error("no USB device matching {vid:04x}:{pid:04x}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("malformed response frame: {0}")]
    Framing(&'static str),

    #[error("response checksum mismatch (expected {expected:#04x}, got {actual:#04x})")]
    Checksum { expected: u8, actual: u8 },

    #[error("device rejected {op} at {address:#07x} with status {status:#04x}")]
    Rejected {
        op: &'static str,
        address: u32,
        status: u8,
    },
}
