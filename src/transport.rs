//! Register access seam between the UART driver and whatever carries
//! register traffic to the device.

use crate::error::TransportError;
use crate::regs::Pin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Output = 0,
    Input = 1,
}

/// A GPIO reservation made once while configuring the UARTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinRequest {
    pub pin: Pin,
    pub direction: PinDirection,
    pub label: &'static str,
}

/// Synchronous, ordered access to 32-bit device registers.
///
/// Every call blocks until the device has acknowledged it. Callers that share
/// one link between threads must serialize whole operations, not single calls.
pub trait RegisterAccess {
    fn write_register(&mut self, address: u32, value: u32) -> Result<(), TransportError>;

    fn read_register(&mut self, address: u32) -> Result<u32, TransportError>;

    /// Reserve a physical pin for the FPGA fabric.
    fn create_pin(&mut self, request: PinRequest) -> Result<(), TransportError>;
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for &mut T {
    fn write_register(&mut self, address: u32, value: u32) -> Result<(), TransportError> {
        (**self).write_register(address, value)
    }

    fn read_register(&mut self, address: u32) -> Result<u32, TransportError> {
        (**self).read_register(address)
    }

    fn create_pin(&mut self, request: PinRequest) -> Result<(), TransportError> {
        (**self).create_pin(request)
    }
}

impl<T: RegisterAccess + ?Sized> RegisterAccess for Box<T> {
    fn write_register(&mut self, address: u32, value: u32) -> Result<(), TransportError> {
        (**self).write_register(address, value)
    }

    fn read_register(&mut self, address: u32) -> Result<u32, TransportError> {
        (**self).read_register(address)
    }

    fn create_pin(&mut self, request: PinRequest) -> Result<(), TransportError> {
        (**self).create_pin(request)
    }
}
