//! Framed register access over any byte stream, and its serial-port flavour.

use std::io::{Read, Write};
use std::time::Duration;

use log::{info, trace};
use serialport::SerialPort;

use super::frame::{Request, Response, RESPONSE_LEN};
use crate::error::TransportError;
use crate::transport::{PinRequest, RegisterAccess};

/// How long a register transaction may take before the port gives up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// One request frame out, one response frame back.
pub struct FramedLink<S> {
    stream: S,
}

impl<S: Read + Write> FramedLink<S> {
    pub fn new(stream: S) -> Self {
        FramedLink { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn transact(&mut self, request: Request) -> Result<u32, TransportError> {
        trace!(
            "-> {} {:#07x} {:#010x}",
            request.op.name(),
            request.address,
            request.value
        );
        self.stream.write_all(&request.encode())?;
        self.stream.flush()?;

        let mut frame = [0u8; RESPONSE_LEN];
        self.stream.read_exact(&mut frame)?;
        let value = Response::decode(&frame)?.into_result(&request)?;
        trace!("<- {:#010x}", value);
        Ok(value)
    }
}

impl<S: Read + Write> RegisterAccess for FramedLink<S> {
    fn write_register(&mut self, address: u32, value: u32) -> Result<(), TransportError> {
        self.transact(Request::write(address, value)).map(|_| ())
    }

    fn read_register(&mut self, address: u32) -> Result<u32, TransportError> {
        self.transact(Request::read(address))
    }

    fn create_pin(&mut self, request: PinRequest) -> Result<(), TransportError> {
        info!("reserving pin {:?} as {}", request.pin, request.label);
        self.transact(Request::create_pin(request)).map(|_| ())
    }
}

pub type SerialLink = FramedLink<Box<dyn SerialPort>>;

impl SerialLink {
    /// Open the controller's serial port. `baud_rate` is the link speed, not the UARTs'.
    pub fn open(path: &str, baud_rate: u32) -> Result<Self, TransportError> {
        let port = serialport::new(path, baud_rate)
            .timeout(DEFAULT_TIMEOUT)
            .open()?;
        info!("opened {} at {} baud", path, baud_rate);
        Ok(FramedLink::new(port))
    }
}
