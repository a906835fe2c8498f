//! Host-side driver for the SmartWave FPGA UART engines.
//!
//! The device exposes two UART engines through a flat register interface.
//! This crate arms them, stages outbound frames into stimulus memory and
//! drains the hardware-managed record rings without loss or duplication.

pub mod channel;
pub mod config;
pub mod error;
pub mod link;
pub mod regs;
pub mod rx;
pub mod sim;
pub mod transport;
pub mod tx;
pub mod uart;

pub use channel::{ChannelId, ChannelState};
pub use config::{Parity, ShiftDirection, StopBits, UartConfig};
pub use error::{Error, Result, TransportError};
pub use rx::DrainPolicy;
pub use transport::{PinDirection, PinRequest, RegisterAccess};
pub use uart::{SharedUart, Uart};
