//! Receive Cursor
//! Drains the hardware record ring of a channel into host memory
//!
//! The record memory is a ring of `BUFFER_SIZE` address units written by the
//! UART engine, one character per 4-unit word. The engine publishes the offset
//! of its next write in the record pointer register and never waits for the
//! host. The host keeps its own cursor in [`ChannelState`] and reads whatever
//! lies between the cursor and the pointer:
//!
//! - `cursor < pointer`: one span `[cursor, pointer)`.
//! - `cursor > pointer`: the pointer wrapped, so `[cursor, BUFFER_SIZE)` then `[0, pointer)`.
//!
//! The pointer is read again after every pass until it stops moving.
//!
//! # Overrun
//!
//! If the engine writes a full ring or more between two drains, the pointer
//! comparison cannot tell one lap from several. Those characters are lost
//! without any indication. [`UartConfig::max_safe_poll_interval`] gives the
//! drain interval below which this cannot happen on a saturated line.
//!
//! [`UartConfig::max_safe_poll_interval`]: crate::config::UartConfig::max_safe_poll_interval

use log::{debug, trace, warn};

use crate::channel::{ChannelId, ChannelState};
use crate::error::{Error, Result};
use crate::regs::{BUFFER_SIZE, WORD_SIZE};
use crate::transport::RegisterAccess;

/// Bounds the re-read loop of [`drain`] when the engine keeps producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Read passes allowed before giving up with [`Error::DrainTimeout`].
    pub max_passes: usize,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        DrainPolicy { max_passes: 64 }
    }
}

/// Read the engine's write pointer, rejecting values that cannot be a ring offset.
pub fn write_pointer<T: RegisterAccess>(link: &mut T, channel: ChannelId) -> Result<u32> {
    let value = link.read_register(channel.layout().record_pointer)?;
    if value >= BUFFER_SIZE || value % WORD_SIZE != 0 {
        return Err(Error::PointerOutOfRange { channel, value });
    }
    Ok(value)
}

/// Whether the ring holds characters not yet drained. One register read.
pub fn poll_new_data<T: RegisterAccess>(
    link: &mut T,
    state: &ChannelState,
    channel: ChannelId,
) -> Result<bool> {
    Ok(write_pointer(link, channel)? != state.cursor(channel))
}

/// Drain every character written since the last drain, oldest first.
///
/// The cursor only moves when the drained bytes are handed back, either as
/// `Ok` or inside [`Error::DrainTimeout`]. Any other error leaves it where it
/// was, so the next drain reads the same span again.
pub fn drain<T: RegisterAccess>(
    link: &mut T,
    state: &mut ChannelState,
    channel: ChannelId,
    policy: DrainPolicy,
) -> Result<Vec<u8>> {
    if policy.max_passes == 0 {
        return Err(Error::invalid("max_passes", "must allow at least one pass"));
    }

    let mut out = Vec::new();
    let mut passes = 0;
    let mut cursor = state.cursor(channel);
    let mut pointer = write_pointer(link, channel)?;

    while pointer != cursor {
        if passes >= policy.max_passes {
            warn!(
                "{} still moving after {} passes, returning {} bytes",
                channel,
                passes,
                out.len()
            );
            state.advance(channel, cursor);
            return Err(Error::DrainTimeout {
                channel,
                passes,
                drained: out,
            });
        }

        if cursor < pointer {
            read_span(link, channel, cursor, pointer, &mut out)?;
        } else {
            read_span(link, channel, cursor, BUFFER_SIZE, &mut out)?;
            read_span(link, channel, 0, pointer, &mut out)?;
        }
        cursor = pointer;
        passes += 1;

        pointer = write_pointer(link, channel)?;
    }

    state.advance(channel, cursor);
    if !out.is_empty() {
        debug!("{} drained {} bytes in {} passes", channel, out.len(), passes);
    }
    Ok(out)
}

/// Append the low byte of each word in `[start, end)` of the ring.
fn read_span<T: RegisterAccess>(
    link: &mut T,
    channel: ChannelId,
    start: u32,
    end: u32,
    out: &mut Vec<u8>,
) -> Result<()> {
    let base = channel.layout().record_memory;
    trace!("{} reading ring [{:#06x}, {:#06x})", channel, start, end);
    out.reserve(((end - start) / WORD_SIZE) as usize);
    for offset in (start..end).step_by(WORD_SIZE as usize) {
        let word = link.read_register(base + offset)?;
        out.push((word & 0xFF) as u8);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedDevice;

    fn fill_ring(device: &mut SimulatedDevice, channel: ChannelId, start: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            let offset = (start + i as u32 * WORD_SIZE) % BUFFER_SIZE;
            device.set_record_word(channel, offset, b as u32);
        }
    }

    #[test]
    fn test_no_new_data() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        assert!(!poll_new_data(&mut device, &state, ChannelId::Uart0).unwrap());
        let data = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap();
        assert!(data.is_empty());
    }

    #[test]
    fn test_linear_drain() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        state.advance(ChannelId::Uart0, 0x40);
        fill_ring(&mut device, ChannelId::Uart0, 0x40, &[10, 11, 12, 13, 14]);
        device.set_write_pointer(ChannelId::Uart0, 0x54);

        let data = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap();
        // (0x54 - 0x40) / 4 words
        assert_eq!(data, vec![10, 11, 12, 13, 14]);
        assert_eq!(state.cursor(ChannelId::Uart0), 0x54);
    }

    #[test]
    fn test_wraparound_drain() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        state.advance(ChannelId::Uart1, 0x1FF8);
        device.set_record_word(ChannelId::Uart1, 0x1FF8, 1);
        device.set_record_word(ChannelId::Uart1, 0x1FFC, 2);
        device.set_record_word(ChannelId::Uart1, 0x0, 3);
        device.set_record_word(ChannelId::Uart1, 0x4, 4);
        device.set_write_pointer(ChannelId::Uart1, 0x8);

        let data = drain(&mut device, &mut state, ChannelId::Uart1, DrainPolicy::default()).unwrap();
        assert_eq!(data, vec![1, 2, 3, 4]);
        assert_eq!(state.cursor(ChannelId::Uart1), 0x8);
    }

    #[test]
    fn test_wraparound_to_zero() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        state.advance(ChannelId::Uart0, 0x1FFC);
        device.set_record_word(ChannelId::Uart0, 0x1FFC, 0x7F);
        device.set_write_pointer(ChannelId::Uart0, 0);

        let data = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap();
        assert_eq!(data, vec![0x7F]);
        assert_eq!(state.cursor(ChannelId::Uart0), 0);
    }

    #[test]
    fn test_only_low_byte_of_word_is_kept() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.set_record_word(ChannelId::Uart0, 0, 0xDEAD_BE41);
        device.set_write_pointer(ChannelId::Uart0, 4);

        let data = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap();
        assert_eq!(data, vec![0x41]);
    }

    #[test]
    fn test_drain_twice_is_empty() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.inject_rx(ChannelId::Uart0, b"hello");

        let first = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap();
        let second = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap();
        assert_eq!(first, b"hello");
        assert!(second.is_empty());
    }

    #[test]
    fn test_poll_tracks_pointer() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.inject_rx(ChannelId::Uart1, &[1, 2]);
        assert!(poll_new_data(&mut device, &state, ChannelId::Uart1).unwrap());

        drain(&mut device, &mut state, ChannelId::Uart1, DrainPolicy::default()).unwrap();
        assert!(!poll_new_data(&mut device, &state, ChannelId::Uart1).unwrap());

        device.inject_rx(ChannelId::Uart1, &[3]);
        assert!(poll_new_data(&mut device, &state, ChannelId::Uart1).unwrap());
    }

    #[test]
    fn test_poll_does_not_touch_ring() {
        let mut device = SimulatedDevice::new();
        let state = ChannelState::new();
        device.inject_rx(ChannelId::Uart0, &[1, 2, 3]);
        device.clear_ops();

        poll_new_data(&mut device, &state, ChannelId::Uart0).unwrap();
        assert_eq!(device.ops().len(), 1);
    }

    #[test]
    fn test_drain_catches_up_with_moving_pointer() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.inject_rx(ChannelId::Uart0, &[0, 1, 2, 3]);
        // Two more characters land each time the pointer is read, for three reads
        device.set_producer_burst(ChannelId::Uart0, 2, 3);

        let data = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap();
        assert_eq!(data.len(), 4 + 2 * 3);
        assert_eq!(state.cursor(ChannelId::Uart0), device.write_pointer(ChannelId::Uart0));
    }

    #[test]
    fn test_drain_timeout_keeps_data() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.set_producer_burst(ChannelId::Uart1, 1, usize::MAX);

        let policy = DrainPolicy { max_passes: 5 };
        let err = drain(&mut device, &mut state, ChannelId::Uart1, policy).unwrap_err();
        match err {
            Error::DrainTimeout {
                channel,
                passes,
                drained,
            } => {
                assert_eq!(channel, ChannelId::Uart1);
                assert_eq!(passes, 5);
                assert_eq!(drained.len(), 5);
                assert_eq!(state.cursor(ChannelId::Uart1), 5 * WORD_SIZE);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_pointer_out_of_range() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.set_write_pointer(ChannelId::Uart0, BUFFER_SIZE);
        assert!(matches!(
            drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()),
            Err(Error::PointerOutOfRange { value: BUFFER_SIZE, .. })
        ));

        device.set_write_pointer(ChannelId::Uart0, 0x12);
        assert!(poll_new_data(&mut device, &state, ChannelId::Uart0).is_err());
        assert_eq!(state.cursor(ChannelId::Uart0), 0);
    }

    #[test]
    fn test_failed_pointer_reread_keeps_bytes_for_retry() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.inject_rx(ChannelId::Uart0, &[1, 2, 3]);
        device.clear_ops();
        // Pointer read, three ring reads, then the re-read of the pointer fails
        device.fail_at(4);

        let err = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(state.cursor(ChannelId::Uart0), 0);

        let retry = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap();
        assert_eq!(retry, vec![1, 2, 3]);
        assert_eq!(state.cursor(ChannelId::Uart0), 12);
    }

    #[test]
    fn test_failure_in_later_pass_rereads_earlier_passes() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.inject_rx(ChannelId::Uart1, &[7, 8]);
        // One more character lands on each of the first two pointer reads
        device.set_producer_burst(ChannelId::Uart1, 1, 2);
        device.clear_ops();
        // Pointer, three ring reads, pointer, then the second pass's ring read fails
        device.fail_at(5);

        let err = drain(&mut device, &mut state, ChannelId::Uart1, DrainPolicy::default()).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(state.cursor(ChannelId::Uart1), 0);

        let retry = drain(&mut device, &mut state, ChannelId::Uart1, DrainPolicy::default()).unwrap();
        assert_eq!(retry, vec![7, 8, 0, 1]);
        assert_eq!(state.cursor(ChannelId::Uart1), 16);
    }

    #[test]
    fn test_zero_pass_policy_rejected() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.inject_rx(ChannelId::Uart0, &[1]);
        device.clear_ops();

        let err = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy { max_passes: 0 }).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "max_passes", .. }));
        assert!(device.ops().is_empty());
        assert_eq!(state.cursor(ChannelId::Uart0), 0);
    }

    #[test]
    fn test_transport_failure_leaves_cursor() {
        let mut device = SimulatedDevice::new();
        let mut state = ChannelState::new();
        device.inject_rx(ChannelId::Uart0, &[1, 2, 3]);
        device.clear_ops();
        // Pointer read succeeds, second ring read fails
        device.fail_at(2);

        let err = drain(&mut device, &mut state, ChannelId::Uart0, DrainPolicy::default()).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(state.cursor(ChannelId::Uart0), 0);
    }
}
