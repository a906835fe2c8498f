//! Register Frame Codec
//! Request/response frames exchanged with the device controller
//!
//! Request:  `[0xA5] [op] [address: u32 LE] [value: u32 LE] [crc8]`
//! Response: `[0x5A] [status] [value: u32 LE] [crc8]`
//!
//! The CRC is CRC-8/SMBUS over every byte before it. Status 0 means success.

use crc::{Crc, CRC_8_SMBUS};
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::error::TransportError;
use crate::transport::PinRequest;

pub const REQUEST_SYNC: u8 = 0xA5;
pub const RESPONSE_SYNC: u8 = 0x5A;
pub const REQUEST_LEN: usize = 11;
pub const RESPONSE_LEN: usize = 7;
pub const STATUS_OK: u8 = 0x00;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Opcode {
    Write = 0x01,
    Read = 0x02,
    CreatePin = 0x03,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        match self {
            Opcode::Write => "write",
            Opcode::Read => "read",
            Opcode::CreatePin => "create_pin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub op: Opcode,
    pub address: u32,
    pub value: u32,
}

impl Request {
    pub fn write(address: u32, value: u32) -> Self {
        Request {
            op: Opcode::Write,
            address,
            value,
        }
    }

    pub fn read(address: u32) -> Self {
        Request {
            op: Opcode::Read,
            address,
            value: 0,
        }
    }

    pub fn create_pin(request: PinRequest) -> Self {
        Request {
            op: Opcode::CreatePin,
            address: request.pin.index(),
            value: request.direction as u32,
        }
    }

    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut frame = [0u8; REQUEST_LEN];
        frame[0] = REQUEST_SYNC;
        frame[1] = self.op.into();
        frame[2..6].copy_from_slice(&self.address.to_le_bytes());
        frame[6..10].copy_from_slice(&self.value.to_le_bytes());
        frame[10] = CRC8.checksum(&frame[..10]);
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self, TransportError> {
        let body = check_frame(frame, REQUEST_SYNC, REQUEST_LEN)?;
        let op = Opcode::try_from(body[1]).map_err(|_| TransportError::Framing("unknown opcode"))?;
        Ok(Request {
            op,
            address: le_u32(&body[2..6]),
            value: le_u32(&body[6..10]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Response {
    pub status: u8,
    pub value: u32,
}

impl Response {
    pub fn ok(value: u32) -> Self {
        Response {
            status: STATUS_OK,
            value,
        }
    }

    pub fn encode(&self) -> [u8; RESPONSE_LEN] {
        let mut frame = [0u8; RESPONSE_LEN];
        frame[0] = RESPONSE_SYNC;
        frame[1] = self.status;
        frame[2..6].copy_from_slice(&self.value.to_le_bytes());
        frame[6] = CRC8.checksum(&frame[..6]);
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self, TransportError> {
        let body = check_frame(frame, RESPONSE_SYNC, RESPONSE_LEN)?;
        Ok(Response {
            status: body[1],
            value: le_u32(&body[2..6]),
        })
    }

    /// The response value, or the device's refusal of `request`.
    pub fn into_result(self, request: &Request) -> Result<u32, TransportError> {
        if self.status != STATUS_OK {
            return Err(TransportError::Rejected {
                op: request.op.name(),
                address: request.address,
                status: self.status,
            });
        }
        Ok(self.value)
    }
}

fn check_frame(frame: &[u8], sync: u8, len: usize) -> Result<&[u8], TransportError> {
    if frame.len() != len {
        return Err(TransportError::Framing("wrong frame length"));
    }
    if frame[0] != sync {
        return Err(TransportError::Framing("bad sync byte"));
    }
    let expected = CRC8.checksum(&frame[..len - 1]);
    let actual = frame[len - 1];
    if expected != actual {
        return Err(TransportError::Checksum { expected, actual });
    }
    Ok(&frame[..len - 1])
}

fn le_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
