//! Transports carrying register traffic to a physical device.

pub mod frame;
pub mod serial;
pub mod usb;

pub use serial::{FramedLink, SerialLink};
pub use usb::UsbLink;
