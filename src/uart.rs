//! UART Interface Module
//! Owns the link to the device and the per-channel receive state

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::info;

use crate::channel::{ChannelId, ChannelState};
use crate::config::UartConfig;
use crate::error::{Error, Result};
use crate::regs::{MemControl, StimConfig, CHANNELS};
use crate::rx::{self, DrainPolicy};
use crate::transport::{PinDirection, PinRequest, RegisterAccess};
use crate::tx;

/// Both UART engines of one device connection.
pub struct Uart<T> {
    link: T,
    channels: ChannelState,
    policy: DrainPolicy,
    config: Option<UartConfig>,
}

impl<T: RegisterAccess> Uart<T> {
    pub fn new(link: T) -> Self {
        Uart {
            link,
            channels: ChannelState::new(),
            policy: DrainPolicy::default(),
            config: None,
        }
    }

    pub fn with_drain_policy(mut self, policy: DrainPolicy) -> Result<Self> {
        if policy.max_passes == 0 {
            return Err(Error::invalid("max_passes", "must allow at least one pass"));
        }
        self.policy = policy;
        Ok(self)
    }

    /// Route, arm and enable both UART engines, then zero both receive cursors.
    ///
    /// Calling this again mid-stream discards the receive history: anything
    /// recorded but not yet drained is forgotten.
    pub fn configure(&mut self, config: &UartConfig) -> Result<()> {
        let encoded = config.encode()?;
        info!(
            "configuring UARTs: {} baud (divisor {}), {} bits, {:?} parity, {:?} stop, {:?}, timeout {} ticks",
            config.baud_rate,
            encoded.divisor,
            config.word_length,
            config.parity,
            config.stop_bits,
            config.shift_direction,
            encoded.timeout_ticks
        );

        for layout in &CHANNELS {
            self.link.create_pin(PinRequest {
                pin: layout.tx_pin,
                direction: PinDirection::Output,
                label: "TX",
            })?;
        }
        for layout in &CHANNELS {
            self.link.create_pin(PinRequest {
                pin: layout.rx_pin,
                direction: PinDirection::Input,
                label: "RX",
            })?;
        }

        // Stimulus memory feeds the engine, the engine feeds the record memory
        for layout in &CHANNELS {
            self.link.write_register(layout.uart_select, layout.stim_source)?;
        }
        for layout in &CHANNELS {
            self.link.write_register(layout.record_select, layout.uart_source)?;
        }

        for layout in &CHANNELS {
            self.link
                .write_register(layout.tx_pin.output_select(), layout.tx_signal)?;
        }
        for layout in &CHANNELS {
            self.link
                .write_register(layout.rx_input_select, layout.rx_pin.index())?;
        }

        for layout in &CHANNELS {
            self.link
                .write_register(layout.record_control, MemControl::enabled(true).bits())?;
        }

        for layout in &CHANNELS {
            self.link.write_register(layout.uart_divisor, encoded.divisor)?;
            self.link
                .write_register(layout.uart_control, encoded.control.bits())?;
        }

        for layout in &CHANNELS {
            self.link
                .write_register(layout.stim_config, StimConfig::window(0, 1).bits())?;
            self.link
                .write_register(layout.stim_control, MemControl::enabled(false).bits())?;
        }

        self.channels.reset();
        self.config = Some(config.clone());
        Ok(())
    }

    /// Queue `data` on `channel`. Does not wait for it to leave the pin.
    pub fn send(&mut self, channel: ChannelId, data: &[u8]) -> Result<()> {
        tx::send(&mut self.link, channel, data)
    }

    /// Cheap check for undrained characters: one register read, no ring access.
    pub fn poll_new_data(&mut self, channel: ChannelId) -> Result<bool> {
        rx::poll_new_data(&mut self.link, &self.channels, channel)
    }

    /// Everything received on `channel` since the previous drain, oldest first.
    pub fn drain(&mut self, channel: ChannelId) -> Result<Vec<u8>> {
        rx::drain(&mut self.link, &mut self.channels, channel, self.policy)
    }

    pub fn channel_state(&self) -> &ChannelState {
        &self.channels
    }

    /// The config most recently applied by [`Uart::configure`].
    pub fn config(&self) -> Option<&UartConfig> {
        self.config.as_ref()
    }

    pub fn link(&self) -> &T {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut T {
        &mut self.link
    }

    pub fn into_link(self) -> T {
        self.link
    }
}

/// A [`Uart`] shared between threads.
///
/// Each operation holds the lock from its first register access to its last,
/// so a drain never interleaves with a send or a half-applied configuration.
pub struct SharedUart<T> {
    inner: Arc<Mutex<Uart<T>>>,
}

impl<T> Clone for SharedUart<T> {
    fn clone(&self) -> Self {
        SharedUart {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: RegisterAccess> SharedUart<T> {
    pub fn new(uart: Uart<T>) -> Self {
        SharedUart {
            inner: Arc::new(Mutex::new(uart)),
        }
    }

    /// Exclusive access for a sequence of operations that must not interleave.
    pub fn lock(&self) -> MutexGuard<'_, Uart<T>> {
        // A panic mid-operation leaves device state the lock cannot repair
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn configure(&self, config: &UartConfig) -> Result<()> {
        self.lock().configure(config)
    }

    pub fn send(&self, channel: ChannelId, data: &[u8]) -> Result<()> {
        self.lock().send(channel, data)
    }

    pub fn poll_new_data(&self, channel: ChannelId) -> Result<bool> {
        self.lock().poll_new_data(channel)
    }

    pub fn drain(&self, channel: ChannelId) -> Result<Vec<u8>> {
        self.lock().drain(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Parity;
    use crate::regs::{Pin, UartControl};
    use crate::sim::{Op, SimulatedDevice};

    #[test]
    fn test_configure_programs_both_engines() {
        let mut uart = Uart::new(SimulatedDevice::new());
        let config = UartConfig::default().with_parity(Parity::Odd).with_timeout_us(9_990);
        uart.configure(&config).unwrap();

        for channel in ChannelId::ALL {
            let layout = channel.layout();
            let device = uart.link();
            assert_eq!(device.register(layout.uart_divisor), 868);
            let control = UartControl::from_bits(device.register(layout.uart_control));
            assert!(control.enable());
            assert_eq!(control.parity(), 1);
            assert_eq!(control.timeout(), 999);
            assert_eq!(device.register(layout.record_control), 1);
            assert_eq!(device.register(layout.stim_control), 0);
            assert_eq!(StimConfig::from_bits(device.register(layout.stim_config)).trigger_count(), 1);
            assert_eq!(device.register(layout.uart_select), layout.stim_source);
            assert_eq!(device.register(layout.record_select), layout.uart_source);
        }
        assert_eq!(uart.config(), Some(&config));
    }

    #[test]
    fn test_configure_order() {
        let mut uart = Uart::new(SimulatedDevice::new());
        uart.configure(&UartConfig::default()).unwrap();

        let device = uart.link();
        let pins: Vec<Pin> = device.pins().iter().map(|p| p.pin).collect();
        assert_eq!(pins, vec![Pin::A1, Pin::A3, Pin::A2, Pin::A4]);

        let position = |address: u32| {
            device
                .ops()
                .iter()
                .position(|op| matches!(op, Op::Write(a, _) if *a == address))
                .unwrap()
        };
        let layout = ChannelId::Uart0.layout();
        // Pins first, then interconnect, mux, record memory, engine, stimulus memory
        assert!(matches!(device.ops()[0], Op::CreatePin(_)));
        assert!(position(layout.uart_select) < position(layout.tx_pin.output_select()));
        assert!(position(layout.tx_pin.output_select()) < position(layout.record_control));
        assert!(position(layout.record_control) < position(layout.uart_control));
        assert!(position(layout.uart_control) < position(layout.stim_config));
    }

    #[test]
    fn test_invalid_config_writes_nothing() {
        let mut uart = Uart::new(SimulatedDevice::new());
        let err = uart
            .configure(&UartConfig::default().with_baud_rate(0))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "baud_rate", .. }));
        assert!(uart.link().ops().is_empty());
        assert!(uart.config().is_none());
    }

    #[test]
    fn test_reconfigure_resets_cursors() {
        let mut uart = Uart::new(SimulatedDevice::new());
        uart.configure(&UartConfig::default()).unwrap();
        uart.send(ChannelId::Uart1, &[1, 2, 3]).unwrap();
        uart.send(ChannelId::Uart0, &[4]).unwrap();
        uart.drain(ChannelId::Uart0).unwrap();
        uart.drain(ChannelId::Uart1).unwrap();
        assert_eq!(uart.channel_state().cursor(ChannelId::Uart0), 12);
        assert_eq!(uart.channel_state().cursor(ChannelId::Uart1), 4);

        uart.configure(&UartConfig::default()).unwrap();
        assert_eq!(uart.channel_state(), &ChannelState::new());
    }

    #[test]
    fn test_zero_pass_policy_rejected() {
        let uart = Uart::new(SimulatedDevice::new());
        assert!(uart.with_drain_policy(DrainPolicy { max_passes: 0 }).is_err());
    }

    #[test]
    fn test_configure_transport_failure_propagates() {
        let mut device = SimulatedDevice::new();
        device.fail_at(6);
        let mut uart = Uart::new(device);
        let err = uart.configure(&UartConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(uart.config().is_none());
    }
}
