//! Register frames over a pair of USB bulk endpoints.

use futures_lite::future::block_on;
use log::{info, trace};
use nusb::transfer::RequestBuffer;

use super::frame::{Request, Response, RESPONSE_LEN};
use crate::error::TransportError;
use crate::transport::{PinRequest, RegisterAccess};

const INTERFACE: u8 = 0;
const EP_OUT: u8 = 0x01;
const EP_IN: u8 = 0x81;
const MAX_PACKET: usize = 64;

pub struct UsbLink {
    interface: nusb::Interface,
}

impl UsbLink {
    /// Open the first attached device matching `vid:pid` and claim its control interface.
    pub fn open(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let info = nusb::list_devices()?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;
        info!(
            "opening {:04x}:{:04x} on bus {} address {}",
            vid,
            pid,
            info.bus_number(),
            info.device_address()
        );
        let device = info.open()?;
        let interface = device.claim_interface(INTERFACE)?;
        Ok(UsbLink { interface })
    }

    fn transact(&mut self, request: Request) -> Result<u32, TransportError> {
        trace!(
            "-> {} {:#07x} {:#010x}",
            request.op.name(),
            request.address,
            request.value
        );
        block_on(self.interface.bulk_out(EP_OUT, request.encode().to_vec())).into_result()?;

        let data = block_on(self.interface.bulk_in(EP_IN, RequestBuffer::new(MAX_PACKET)))
            .into_result()?;
        if data.len() < RESPONSE_LEN {
            return Err(TransportError::Framing("short USB response"));
        }
        let value = Response::decode(&data[..RESPONSE_LEN])?.into_result(&request)?;
        trace!("<- {:#010x}", value);
        Ok(value)
    }
}

impl RegisterAccess for UsbLink {
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
