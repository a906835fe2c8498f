//! In-memory stand-in for the device.
//!
//! Keeps a flat register file and models the parts of the bitstream the
//! driver depends on: one record ring per channel, stimulus playback looped
//! back into the peer channel's ring (TX0 wired to RX1, TX1 wired to RX0), and
//! record memories that restart at offset 0 when armed. Tests use the extra
//! hooks to move the write pointer, keep the engine producing while the host
//! drains, and fail a chosen register operation.

use std::collections::HashMap;

use log::trace;

use crate::channel::ChannelId;
use crate::error::TransportError;
use crate::regs::{MemControl, StimConfig, BUFFER_SIZE, WORD_SIZE};
use crate::transport::{PinRequest, RegisterAccess};

/// A register operation as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Write(u32, u32),
    Read(u32),
    CreatePin(PinRequest),
}

#[derive(Debug, Clone, Copy, Default)]
struct Burst {
    words: u32,
    reads_left: usize,
    next_value: u8,
}

#[derive(Debug, Default)]
pub struct SimulatedDevice {
    registers: HashMap<u32, u32>,
    ops: Vec<Op>,
    pins: Vec<PinRequest>,
    loopback: bool,
    bursts: [Burst; 2],
    fail_at: Option<usize>,
}

impl SimulatedDevice {
    pub fn new() -> Self {
        SimulatedDevice {
            loopback: true,
            ..Default::default()
        }
    }

    /// Disconnect the TX pins from the peer RX pins.
    pub fn without_loopback(mut self) -> Self {
        self.loopback = false;
        self
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    pub fn pins(&self) -> &[PinRequest] {
        &self.pins
    }

    /// Current value of a register without logging an operation.
    pub fn register(&self, address: u32) -> u32 {
        self.registers.get(&address).copied().unwrap_or(0)
    }

    pub fn write_pointer(&self, channel: ChannelId) -> u32 {
        self.register(channel.layout().record_pointer)
    }

    pub fn set_write_pointer(&mut self, channel: ChannelId, offset: u32) {
        self.registers.insert(channel.layout().record_pointer, offset);
    }

    pub fn set_record_word(&mut self, channel: ChannelId, offset: u32, word: u32) {
        self.registers
            .insert(channel.layout().record_memory + offset, word);
    }

    /// Record `bytes` as if they had arrived on the channel's RX pin.
    pub fn inject_rx(&mut self, channel: ChannelId, bytes: &[u8]) {
        let mut pointer = self.write_pointer(channel);
        for &b in bytes {
            self.set_record_word(channel, pointer, b as u32);
            pointer = (pointer + WORD_SIZE) % BUFFER_SIZE;
        }
        self.set_write_pointer(channel, pointer);
    }

    /// Make the engine record `words` more characters on each of the next
    /// `reads` write pointer reads of `channel`.
    pub fn set_producer_burst(&mut self, channel: ChannelId, words: u32, reads: usize) {
        self.bursts[channel.index()] = Burst {
            words,
            reads_left: reads,
            next_value: 0,
        };
    }

    /// Fail the operation that would become entry `index` of the op log.
    pub fn fail_at(&mut self, index: usize) {
        self.fail_at = Some(index);
    }

    fn check_fault(&mut self, op: &'static str, address: u32) -> Result<(), TransportError> {
        if self.fail_at == Some(self.ops.len()) {
            self.fail_at = None;
            return Err(TransportError::Rejected {
                op,
                address,
                status: 0xFF,
            });
        }
        Ok(())
    }

    fn run_burst(&mut self, channel: ChannelId) {
        let burst = &mut self.bursts[channel.index()];
        if burst.reads_left == 0 || burst.words == 0 {
            return;
        }
        burst.reads_left -= 1;
        let bytes: Vec<u8> = (0..burst.words)
            .map(|_| {
                let b = burst.next_value;
                burst.next_value = burst.next_value.wrapping_add(1);
                b
            })
            .collect();
        self.inject_rx(channel, &bytes);
    }

    fn on_write(&mut self, address: u32, value: u32) {
        for channel in ChannelId::ALL {
            let layout = channel.layout();
            if address == layout.record_control && MemControl::from_bits(value).enable() {
                self.set_write_pointer(channel, 0);
            }
            if address == layout.stim_control
                && MemControl::from_bits(value).enable()
                && self.loopback
            {
                self.play_stimulus(channel);
            }
        }
    }

    /// Replay the armed stimulus window of `channel` into its peer's ring.
    fn play_stimulus(&mut self, channel: ChannelId) {
        let layout = channel.layout();
        let window = StimConfig::from_bits(self.register(layout.stim_config));
        let start = window.start_offset() as u32;
        let end = start + window.trigger_count() as u32;
        let bytes: Vec<u8> = (start..end)
            .step_by(WORD_SIZE as usize)
            .map(|offset| (self.register(layout.stim_memory + offset) & 0xFF) as u8)
            .collect();
        trace!("sim: {} played {} bytes into {}", channel, bytes.len(), channel.peer());
        self.inject_rx(channel.peer(), &bytes);
    }
}

impl RegisterAccess for SimulatedDevice {
    fn write_register(&mut self, address: u32, value: u32) -> Result<(), TransportError> {
        self.check_fault("write", address)?;
        self.ops.push(Op::Write(address, value));
        self.registers.insert(address, value);
        self.on_write(address, value);
        Ok(())
    }

    fn read_register(&mut self, address: u32) -> Result<u32, TransportError> {
        self.check_fault("read", address)?;
        self.ops.push(Op::Read(address));
        for channel in ChannelId::ALL {
            if address == channel.layout().record_pointer {
                self.run_burst(channel);
            }
        }
        Ok(self.register(address))
    }

    fn create_pin(&mut self, request: PinRequest) -> Result<(), TransportError> {
        self.check_fault("create_pin", request.pin.index())?;
        self.ops.push(Op::CreatePin(request));
        self.pins.push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_wraps() {
        let mut device = SimulatedDevice::new();
        device.set_write_pointer(ChannelId::Uart0, BUFFER_SIZE - WORD_SIZE);
        device.inject_rx(ChannelId::Uart0, &[9, 8]);
        assert_eq!(device.write_pointer(ChannelId::Uart0), WORD_SIZE);
        let base = ChannelId::Uart0.layout().record_memory;
        assert_eq!(device.register(base + BUFFER_SIZE - WORD_SIZE), 9);
        assert_eq!(device.register(base), 8);
    }

    #[test]
    fn test_arming_record_memory_resets_pointer() {
        let mut device = SimulatedDevice::new();
        device.inject_rx(ChannelId::Uart1, &[1, 2, 3]);
        let layout = ChannelId::Uart1.layout();
        device
            .write_register(layout.record_control, MemControl::enabled(true).bits())
            .unwrap();
        assert_eq!(device.write_pointer(ChannelId::Uart1), 0);
    }

    #[test]
    fn test_fault_is_one_shot() {
        let mut device = SimulatedDevice::new();
        device.fail_at(1);
        assert!(device.read_register(0).is_ok());
        assert!(device.read_register(0).is_err());
        assert!(device.read_register(0).is_ok());
    }

    #[test]
    fn test_no_loopback() {
        let mut device = SimulatedDevice::new().without_loopback();
        let layout = ChannelId::Uart0.layout();
        device.write_register(layout.stim_memory, 0x42).unwrap();
        device
            .write_register(layout.stim_config, StimConfig::window(0, 4).bits())
            .unwrap();
        device
            .write_register(layout.stim_control, MemControl::enabled(true).bits())
            .unwrap();
        assert_eq!(device.write_pointer(ChannelId::Uart1), 0);
    }
}
