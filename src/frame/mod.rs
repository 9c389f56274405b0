//! Frame buffers and their lifecycle bookkeeping.
//!
//! A [`Frame`] is one hardware-addressable buffer slot. Every frame lives in
//! exactly one of four FIFO queues owned by its [`FrameManager`]:
//!
//! ```text
//!   submit_buffer        arm pass           DMA done          consumer
//! Free ──────────> Requested ──────> Processing ──────> Complete ──────> Free
//!                                        ▲                  │
//!                                        └──────────────────┘
//!                                    ring overwrite (internal channels)
//! ```
//!
//! Internal ring channels skip `Requested`: their slots go straight from
//! `Free` to `Processing` when the ring is committed.

mod manager;
mod queue;

pub use manager::{FrameManager, SharedFrameManager};

use crate::internal::constants::MAX_PLANES;

/// Lifecycle state of a frame, one per queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameState {
    /// Owned by software, not queued for capture
    #[default]
    Free,
    /// Submitted by the producer, waiting to be armed
    Requested,
    /// Programmed into hardware, being (or about to be) written
    Processing,
    /// Written (or flushed), waiting for the consumer
    Complete,
}

impl FrameState {
    /// All states in queue order
    pub const ALL: [FrameState; 4] = [
        FrameState::Free,
        FrameState::Requested,
        FrameState::Processing,
        FrameState::Complete,
    ];

    #[inline]
    pub(crate) const fn queue_index(self) -> usize {
        match self {
            FrameState::Free => 0,
            FrameState::Requested => 1,
            FrameState::Processing => 2,
            FrameState::Complete => 3,
        }
    }
}

/// Outcome recorded on a frame when it reaches `Complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BufferStatus {
    /// Frame data is valid
    #[default]
    Done,
    /// Frame was returned without (trustworthy) data
    Error,
}

/// One buffer slot and its lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    index: usize,
    addresses: [u32; MAX_PLANES],
    planes: u8,
    state: FrameState,
    fcount: u32,
    status: BufferStatus,
}

impl Frame {
    pub(crate) const fn new(index: usize) -> Self {
        Self {
            index,
            addresses: [0; MAX_PLANES],
            planes: 0,
            state: FrameState::Free,
            fcount: 0,
            status: BufferStatus::Done,
        }
    }

    /// Slot index within the frame manager
    #[inline]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Current lifecycle state
    #[inline]
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// DMA address of the first plane (the one the receiver writes)
    #[inline]
    pub const fn address(&self) -> u32 {
        self.addresses[0]
    }

    /// DMA addresses of every registered plane
    pub fn plane_addresses(&self) -> &[u32] {
        &self.addresses[..self.planes as usize]
    }

    /// Frame counter value when the frame was armed
    #[inline]
    pub const fn fcount(&self) -> u32 {
        self.fcount
    }

    /// Completion status; meaningful once `Complete`
    #[inline]
    pub const fn status(&self) -> BufferStatus {
        self.status
    }

    pub(crate) fn set_planes(&mut self, addresses: &[u32]) {
        let planes = addresses.len().min(MAX_PLANES);
        self.addresses = [0; MAX_PLANES];
        self.addresses[..planes].copy_from_slice(&addresses[..planes]);
        self.planes = planes as u8;
    }

    pub(crate) fn set_state(&mut self, state: FrameState) {
        self.state = state;
    }

    pub(crate) fn set_fcount(&mut self, fcount: u32) {
        self.fcount = fcount;
    }

    pub(crate) fn set_status(&mut self, status: BufferStatus) {
        self.status = status;
    }
}

/// A frame handed upstream, with the channel it was captured on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CompletedFrame {
    /// Virtual channel index
    pub channel: usize,
    /// Frame slot index
    pub index: usize,
    /// Frame counter value when armed
    pub fcount: u32,
    /// Completion status
    pub status: BufferStatus,
}

impl CompletedFrame {
    pub(crate) const fn from_frame(channel: usize, frame: &Frame) -> Self {
        Self {
            channel,
            index: frame.index,
            fcount: frame.fcount,
            status: frame.status,
        }
    }
}
