//! Virtual channel bindings and per-channel state flags.

use super::config::{ChannelMode, ImageFormat};
use crate::frame::SharedFrameManager;
use crate::internal::constants::CHANNEL_COUNT;

/// Per-channel runtime flags.
///
/// Mutated only inside the critical section that also holds the channel's
/// frame manager, so a flag and the queues it describes never disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct ChannelState {
    /// Buffer supply mode
    pub(crate) mode: ChannelMode,
    /// Own geometry, `None` inherits channel 0's
    pub(crate) format: Option<ImageFormat>,
    /// Taking part in the current stream
    pub(crate) started: bool,
    /// An error was reported; Processing buffers must be returned with error
    pub(crate) pending_error: bool,
    /// Internal ring slots are programmed into hardware
    pub(crate) ring_committed: bool,
    /// Stopped after a bookkeeping violation, until the next stream start
    pub(crate) faulted: bool,
    /// DMA output state seen by the last arm pass
    pub(crate) last_dma_enable: Option<bool>,
}

impl ChannelState {
    pub(crate) const fn new(mode: ChannelMode, format: Option<ImageFormat>) -> Self {
        Self {
            mode,
            format,
            started: false,
            pending_error: false,
            ring_committed: false,
            faulted: false,
            last_dma_enable: None,
        }
    }

    /// Whether frame-interval work should touch this channel
    #[inline]
    pub(crate) const fn is_active(&self) -> bool {
        self.started && !self.faulted
    }

    /// Reset the runtime flags for a new stream
    pub(crate) fn prepare_stream(&mut self) {
        self.started = true;
        self.pending_error = false;
        self.ring_committed = false;
        self.faulted = false;
        self.last_dma_enable = None;
    }
}

/// One virtual channel: an optional frame manager binding plus its flags.
pub(crate) struct ChannelSlot<'a, const N: usize> {
    pub(crate) frames: Option<&'a SharedFrameManager<N>>,
    pub(crate) state: ChannelState,
}

impl<const N: usize> ChannelSlot<'_, N> {
    pub(crate) const fn unbound() -> Self {
        Self {
            frames: None,
            state: ChannelState::new(ChannelMode::External, None),
        }
    }

    #[inline]
    pub(crate) const fn is_bound(&self) -> bool {
        self.frames.is_some()
    }

    pub(crate) fn unbind(&mut self) {
        *self = Self::unbound();
    }
}

/// All virtual channels of one receiver
pub(crate) type ChannelTable<'a, const N: usize> = [ChannelSlot<'a, N>; CHANNEL_COUNT];

pub(crate) const fn unbound_table<'a, const N: usize>() -> ChannelTable<'a, N> {
    [
        ChannelSlot::unbound(),
        ChannelSlot::unbound(),
        ChannelSlot::unbound(),
        ChannelSlot::unbound(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_slot_is_unbound_external() {
        let slot: ChannelSlot<'_, 4> = ChannelSlot::unbound();
        assert!(!slot.is_bound());
        assert_eq!(slot.state.mode, ChannelMode::External);
        assert!(!slot.state.is_active());
    }

    #[test]
    fn prepare_stream_clears_runtime_flags() {
        let mut state = ChannelState::new(ChannelMode::Internal, None);
        state.pending_error = true;
        state.ring_committed = true;
        state.faulted = true;
        state.last_dma_enable = Some(true);

        state.prepare_stream();
        assert!(state.is_active());
        assert!(!state.pending_error);
        assert!(!state.ring_committed);
        assert_eq!(state.last_dma_enable, None);
        assert_eq!(state.mode, ChannelMode::Internal);
    }

    #[test]
    fn faulted_channel_is_inactive() {
        let mut state = ChannelState::new(ChannelMode::External, None);
        state.prepare_stream();
        state.faulted = true;
        assert!(!state.is_active());
    }

    #[test]
    fn unbind_resets_slot() {
        static FRAMES: SharedFrameManager<2> = SharedFrameManager::new();
        let mut slot = ChannelSlot {
            frames: Some(&FRAMES),
            state: ChannelState::new(ChannelMode::Internal, None),
        };
        assert!(slot.is_bound());
        slot.unbind();
        assert!(!slot.is_bound());
        assert_eq!(slot.state.mode, ChannelMode::External);
    }
}
