//! Hardware and pipeline seams
//!
//! The receiver core drives the link through [`CsisHw`] and reports upward
//! through [`Pipeline`]. Both are implemented by the platform; the core never
//! touches a register directly.
//!
//! # Context
//!
//! Every method may be called from the interrupt top half, the deferred
//! worker, or the buffer-submission path, often inside a critical section.
//! Implementations must not block and must not re-enter the receiver.

use crate::driver::config::ImageFormat;
use crate::driver::interrupt::IrqSource;
use crate::frame::{BufferStatus, CompletedFrame};

/// Register-level access to one receiver instance.
///
/// Methods take `&self`: register writes are side effects on the device, not
/// on the Rust value.
pub trait CsisHw {
    /// Soft-reset the receiver
    fn reset(&self);

    /// Start receiving on the link
    fn enable(&self);

    /// Stop receiving on the link
    fn disable(&self);

    /// Program the link settle time
    fn set_settle(&self, settle: u32);

    /// Program lane count and link speed
    fn set_lanes(&self, lanes: u8, mipi_speed: u32);

    /// Program geometry and pixel code of virtual channel `vc`
    fn configure_channel(&self, vc: usize, format: &ImageFormat);

    /// Set the DMA target of `vc`'s buffer slot `slot`
    fn set_dma_address(&self, vc: usize, slot: usize, address: u32);

    /// Enable or disable write-to-memory output of `vc`
    fn enable_dma(&self, vc: usize, enable: bool);

    /// Whether write-to-memory output of `vc` is enabled
    fn dma_enabled(&self, vc: usize) -> bool;

    /// Move `vc`'s ring pointer to `slot`
    fn set_ring_pointer(&self, vc: usize, slot: usize);

    /// Slot `vc`'s ring pointer names (the last written slot)
    fn ring_pointer(&self, vc: usize) -> usize;

    /// Read and acknowledge the pending interrupt sources
    fn read_interrupt_source(&self) -> IrqSource;

    /// Unmask (`true`) or mask (`false`) receiver interrupts
    fn mask_interrupts(&self, enable: bool);

    /// Abort all outstanding DMA transfers
    fn abort_dma(&self);
}

/// Upstream consumer of receiver events.
///
/// Callbacks run in deferred-work context or, for [`on_error`] and flushes
/// triggered by a lost frame end, in the interrupt top half. Some run while
/// a frame manager lock is held; they must return quickly and must not call
/// back into the receiver or lock a frame manager.
///
/// [`on_error`]: Pipeline::on_error
pub trait Pipeline {
    /// A frame started; `fcount` is the new frame counter
    fn on_frame_start(&self, fcount: u32);

    /// A frame ended. `Some` when an externally-queued buffer completed on
    /// DMA-done; `None` for the frame-end edge itself.
    ///
    /// For the edge, `status` is [`BufferStatus::Error`] when any channel
    /// reported a receive error or flushed its buffers during the frame. For
    /// a completed buffer it is the buffer's own status.
    fn on_frame_end(&self, completed: Option<CompletedFrame>, status: BufferStatus);

    /// Error words per virtual channel, as read from the interrupt
    fn on_error(&self, errors: &[u32]);

    /// A buffer was returned outside the DMA-done path (flush)
    fn on_buffer_done(&self, frame: CompletedFrame) {
        let _ = frame;
    }
}
