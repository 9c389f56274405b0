//! Interrupt sources and error classification for the CSIS receiver.
//!
//! The platform's [`CsisHw`](crate::hal::CsisHw) translates its status
//! registers into an [`IrqSource`]; everything past that point is register
//! agnostic. Per-channel error words use the bit positions of [`ErrorKind`].

use core::sync::atomic::Ordering;

use super::csis::Csis;
use super::deferred::Event;
use crate::hal::{CsisHw, Pipeline};
use crate::internal::constants::CHANNEL_COUNT;
use crate::internal::diagnostics::{Diagnostics, should_log};
use crate::internal::fmt::csis_warn;

// =============================================================================
// Error Kinds
// =============================================================================

/// One receiver error condition; the discriminant is its bit position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ErrorKind {
    /// Unknown data identifier
    Id = 0,
    /// Payload CRC mismatch
    Crc = 1,
    /// Uncorrectable packet header ECC
    Ecc = 2,
    /// Data type does not match the programmed configuration
    WrongConfig = 3,
    /// Receive FIFO overflow
    Overflow = 4,
    /// Frame-end missing for a started frame
    LostFrameEnd = 5,
    /// Frame-start missing for an ending frame
    LostFrameStart = 6,
    /// Start-of-transmission error
    Sot = 7,
    /// On-the-fly output overlapped the next frame
    OtfOverlap = 8,
    /// DMA FIFO full
    DmaFifoFull = 9,
    /// DMA transfer FIFO full
    DmaTransferFifoFull = 10,
    /// Bus write response error
    DmaBusResponse = 11,
    /// Received line count differs from the configured height
    VerticalResolution = 12,
    /// Received line length differs from the configured width
    HorizontalResolution = 13,
    /// Invalid high-speed sync code
    InvalidCode = 14,
    /// High-speed start-of-transmission sync error
    SotSync = 15,
    /// Malformed packet CRC
    MalformedCrc = 16,
    /// A requested DMA abort completed
    DmaAbortDone = 17,
}

/// How the error handler reacts to an [`ErrorKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorCategory {
    /// Protocol error: flag the channel, flush on the next arm pass
    Link,
    /// Flag the channel and flush immediately
    LostFrameEnd,
    /// Log only
    Timing,
    /// Global DMA abort, then apply the saturation policy
    Saturation,
}

impl ErrorKind {
    /// All kinds in bit order
    pub const ALL: [ErrorKind; 18] = [
        ErrorKind::Id,
        ErrorKind::Crc,
        ErrorKind::Ecc,
        ErrorKind::WrongConfig,
        ErrorKind::Overflow,
        ErrorKind::LostFrameEnd,
        ErrorKind::LostFrameStart,
        ErrorKind::Sot,
        ErrorKind::OtfOverlap,
        ErrorKind::DmaFifoFull,
        ErrorKind::DmaTransferFifoFull,
        ErrorKind::DmaBusResponse,
        ErrorKind::VerticalResolution,
        ErrorKind::HorizontalResolution,
        ErrorKind::InvalidCode,
        ErrorKind::SotSync,
        ErrorKind::MalformedCrc,
        ErrorKind::DmaAbortDone,
    ];

    /// Bit mask of this kind within a channel error word
    #[inline(always)]
    pub const fn bit(self) -> u32 {
        1 << (self as u8)
    }

    /// Reaction class
    pub const fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::LostFrameEnd => ErrorCategory::LostFrameEnd,
            ErrorKind::LostFrameStart | ErrorKind::OtfOverlap | ErrorKind::DmaAbortDone => {
                ErrorCategory::Timing
            }
            ErrorKind::DmaFifoFull | ErrorKind::DmaTransferFifoFull | ErrorKind::DmaBusResponse => {
                ErrorCategory::Saturation
            }
            _ => ErrorCategory::Link,
        }
    }

    /// Short name for logs
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Id => "ID",
            ErrorKind::Crc => "CRC",
            ErrorKind::Ecc => "ECC",
            ErrorKind::WrongConfig => "WRONG_CFG",
            ErrorKind::Overflow => "OVERFLOW",
            ErrorKind::LostFrameEnd => "LOST_FE",
            ErrorKind::LostFrameStart => "LOST_FS",
            ErrorKind::Sot => "SOT",
            ErrorKind::OtfOverlap => "OTF_OVERLAP",
            ErrorKind::DmaFifoFull => "DMA_FIFO_FULL",
            ErrorKind::DmaTransferFifoFull => "DMA_TRXFIFO_FULL",
            ErrorKind::DmaBusResponse => "DMA_BRESP",
            ErrorKind::VerticalResolution => "VRESOL_MISMATCH",
            ErrorKind::HorizontalResolution => "HRESOL_MISMATCH",
            ErrorKind::InvalidCode => "INVALID_CODE_HS",
            ErrorKind::SotSync => "SOT_SYNC_HS",
            ErrorKind::MalformedCrc => "MAL_CRC",
            ErrorKind::DmaAbortDone => "DMA_ABORT_DONE",
        }
    }
}

/// Error word of one virtual channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelErrors(u32);

impl ChannelErrors {
    /// Wrap a raw error word
    #[inline(always)]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw error word
    #[inline(always)]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// No error bit set
    #[inline(always)]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether `kind` is set
    #[inline]
    pub const fn contains(self, kind: ErrorKind) -> bool {
        self.0 & kind.bit() != 0
    }

    /// Whether any set bit falls in `category`
    pub fn has_category(self, category: ErrorCategory) -> bool {
        self.kinds().any(|kind| kind.category() == category)
    }

    /// Iterate over the set kinds in bit order
    pub fn kinds(self) -> impl Iterator<Item = ErrorKind> {
        ErrorKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

// =============================================================================
// Interrupt Source
// =============================================================================

/// Decoded interrupt sources of one receiver interrupt.
///
/// # Example
///
/// ```ignore
/// let src = hw.read_interrupt_source();
/// if src.frame_start {
///     // schedule the arm pass
/// }
/// if src.has_error() {
///     // run the error handler
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct IrqSource {
    /// Frame start seen on virtual channel 0
    pub frame_start: bool,
    /// Frame end seen on virtual channel 0
    pub frame_end: bool,
    /// Bit `n` set when DMA of virtual channel `n` finished a frame
    pub dma_done: u8,
    /// Error word per virtual channel, bits per [`ErrorKind`]
    pub errors: [u32; CHANNEL_COUNT],
}

impl IrqSource {
    /// No source pending
    pub const fn new() -> Self {
        Self {
            frame_start: false,
            frame_end: false,
            dma_done: 0,
            errors: [0; CHANNEL_COUNT],
        }
    }

    /// Mark frame start
    #[must_use]
    pub const fn with_frame_start(mut self) -> Self {
        self.frame_start = true;
        self
    }

    /// Mark frame end
    #[must_use]
    pub const fn with_frame_end(mut self) -> Self {
        self.frame_end = true;
        self
    }

    /// Mark DMA done on `vc`
    #[must_use]
    pub const fn with_dma_done(mut self, vc: usize) -> Self {
        if vc < CHANNEL_COUNT {
            self.dma_done |= 1 << vc;
        }
        self
    }

    /// Add error bits on `vc`
    #[must_use]
    pub const fn with_error(mut self, vc: usize, kind: ErrorKind) -> Self {
        if vc < CHANNEL_COUNT {
            self.errors[vc] |= kind.bit();
        }
        self
    }

    /// Whether DMA finished on `vc`
    #[inline]
    pub const fn dma_done_on(&self, vc: usize) -> bool {
        vc < CHANNEL_COUNT && self.dma_done & (1 << vc) != 0
    }

    /// Error word of `vc`
    #[inline]
    pub fn channel_errors(&self, vc: usize) -> ChannelErrors {
        ChannelErrors::from_bits(self.errors.get(vc).copied().unwrap_or(0))
    }

    /// Check if any channel reported an error
    #[inline]
    pub fn has_error(&self) -> bool {
        self.errors.iter().any(|bits| *bits != 0)
    }

    /// Check if any source is pending
    #[inline]
    pub fn any(&self) -> bool {
        self.frame_start || self.frame_end || self.dma_done != 0 || self.has_error()
    }
}

/// Which frame edge the top half expects next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum FrameEdge {
    #[default]
    Start,
    End,
}

// =============================================================================
// Top Half
// =============================================================================

impl<H: CsisHw, P: Pipeline, const N: usize> Csis<'_, H, P, N> {
    /// Interrupt top half.
    ///
    /// Call from the receiver's interrupt handler. Reads and acknowledges the
    /// pending sources, applies receiver errors, and queues the rest for
    /// [`run_deferred`](Self::run_deferred). Never blocks.
    ///
    /// Returns `false` when the receiver does not own its interrupt (not
    /// streaming, or no DMA capability) or nothing was pending.
    ///
    /// # Example
    ///
    /// ```ignore
    /// #[interrupt]
    /// fn CSIS0() {
    ///     if CSIS.handle_interrupt() {
    ///         WORKER_SIGNAL.signal(());
    ///     }
    /// }
    /// ```
    pub fn handle_interrupt(&self) -> bool {
        if !self.lifecycle.with_ref(|lc| lc.irq_owned) {
            return false;
        }

        let src = self.hw.read_interrupt_source();
        if !src.any() {
            return false;
        }

        for vc in 0..CHANNEL_COUNT {
            if src.dma_done_on(vc) && (vc == 0 || self.channel_bound(vc)) {
                self.worker.schedule(Event::DmaDone(vc), &self.diag);
            }
        }

        for event in self.accept_edges(&src).into_iter().flatten() {
            self.worker.schedule(event, &self.diag);
        }

        if src.has_error() {
            let fcount = self.fcount.load(Ordering::Relaxed);
            self.handle_errors(&src, fcount);
            self.pipeline.on_error(&src.errors);
        }

        true
    }

    /// Run the frame-edge checker over one interrupt's start/end bits.
    ///
    /// Both edges together are taken in the order the checker expects. A
    /// lone edge the checker does not expect means its partner interrupt was
    /// lost; the frame counter still advances but no event is queued.
    fn accept_edges(&self, src: &IrqSource) -> [Option<Event>; 2] {
        self.lifecycle.with(|lc| {
            let mut events = [None, None];
            let order = match (src.frame_start, src.frame_end, lc.edge) {
                (true, true, FrameEdge::Start) => [FrameEdge::Start, FrameEdge::End],
                (true, true, FrameEdge::End) => [FrameEdge::End, FrameEdge::Start],
                (true, false, FrameEdge::Start) => {
                    events[0] = Some(self.accept_start());
                    lc.edge = FrameEdge::End;
                    return events;
                }
                (false, true, FrameEdge::End) => {
                    events[0] = Some(self.accept_end());
                    lc.edge = FrameEdge::Start;
                    return events;
                }
                (true, false, FrameEdge::End) => {
                    self.fcount.fetch_add(1, Ordering::Relaxed);
                    let lost = Diagnostics::bump(&self.diag.lost_frame_end_irqs);
                    if should_log(lost) {
                        csis_warn!("frame start while expecting end, end irq lost");
                    }
                    return events;
                }
                (false, true, FrameEdge::Start) => {
                    self.fcount.fetch_add(1, Ordering::Relaxed);
                    let lost = Diagnostics::bump(&self.diag.lost_frame_start_irqs);
                    if should_log(lost) {
                        csis_warn!("frame end while expecting start, start irq lost");
                    }
                    return events;
                }
                (false, false, _) => return events,
            };

            for (slot, edge) in events.iter_mut().zip(order) {
                *slot = Some(match edge {
                    FrameEdge::Start => self.accept_start(),
                    FrameEdge::End => self.accept_end(),
                });
                lc.edge = match edge {
                    FrameEdge::Start => FrameEdge::End,
                    FrameEdge::End => FrameEdge::Start,
                };
            }
            events
        })
    }

    fn accept_start(&self) -> Event {
        let fcount = self.fcount.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        Event::FrameStart(fcount)
    }

    fn accept_end(&self) -> Event {
        Event::FrameEnd(self.fcount.load(Ordering::Relaxed))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
