//! Transmit Path
//! Stages an outbound frame in stimulus memory and triggers playback

use log::{debug, trace};

use crate::channel::ChannelId;
use crate::error::{Error, Result};
use crate::regs::{
    CoreControl, MemControl, StimConfig, CORE_CTRL, CORE_SUBCYCLE_COUNT, CORE_SYNC_COUNT,
    STIM_CAPACITY, WORD_SIZE,
};
use crate::transport::RegisterAccess;

/// Longest frame the stimulus memory can hold.
pub const MAX_FRAME_LEN: usize = (STIM_CAPACITY / WORD_SIZE) as usize;

/// Address units played back for a frame of `len` characters.
pub fn trigger_count(len: usize) -> Result<u16> {
    if len > MAX_FRAME_LEN {
        return Err(Error::invalid(
            "data",
            format!("{} bytes exceeds the {} byte stimulus memory", len, MAX_FRAME_LEN),
        ));
    }
    // STIM_CAPACITY fits the 16-bit field, so this cannot truncate
    Ok((len as u32 * WORD_SIZE) as u16)
}

/// Queue `data` for transmission on `channel`.
///
/// Returns once the trigger is armed; completion on the line is not observed.
/// An empty frame still arms the trigger with a zero count.
pub fn send<T: RegisterAccess>(link: &mut T, channel: ChannelId, data: &[u8]) -> Result<()> {
    let count = trigger_count(data.len())?;
    let layout = channel.layout();

    for (i, &byte) in data.iter().enumerate() {
        let address = layout.stim_memory + i as u32 * WORD_SIZE;
        trace!("{} stim[{:#06x}] <- {:#04x}", channel, address, byte);
        link.write_register(address, byte as u32)?;
    }

    let mut core = CoreControl::default();
    core.set_enable(true);
    core.set_sync_count(CORE_SYNC_COUNT);
    core.set_subcycle_count(CORE_SUBCYCLE_COUNT);
    link.write_register(CORE_CTRL, core.bits())?;

    rearm_stimulus(link, channel, 0, count)?;
    debug!("{} queued {} bytes (trigger count {})", channel, data.len(), count);
    Ok(())
}

/// Disable the stimulus memory, set its playback window and enable it again.
pub(crate) fn rearm_stimulus<T: RegisterAccess>(
    link: &mut T,
    channel: ChannelId,
    start_offset: u16,
    count: u16,
) -> Result<()> {
    let layout = channel.layout();
    link.write_register(layout.stim_control, MemControl::enabled(false).bits())?;
    link.write_register(layout.stim_config, StimConfig::window(start_offset, count).bits())?;
    link.write_register(layout.stim_control, MemControl::enabled(true).bits())?;
    Ok(())
}
