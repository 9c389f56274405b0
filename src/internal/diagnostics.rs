//! Diagnostic counters shared between the interrupt and caller contexts.
//!
//! Counters are plain relaxed atomics: they are observability only and never
//! gate a scheduling decision.

use core::sync::atomic::{AtomicU32, Ordering};

use super::constants::LOG_INTERVAL_OF_DROPS;

/// Decide whether the `count`-th occurrence of a repeating condition is logged.
///
/// The first [`LOG_INTERVAL_OF_DROPS`] occurrences are always logged, after
/// that only every interval-th one.
#[inline]
pub(crate) const fn should_log(count: u32) -> bool {
    count <= LOG_INTERVAL_OF_DROPS || count % LOG_INTERVAL_OF_DROPS == 0
}

/// Point-in-time copy of the receiver's diagnostic counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiagnosticsSnapshot {
    /// Arm passes that found two buffers still processing
    pub overruns: u32,
    /// Undrained ring slots handed back to hardware (dropped data)
    pub ring_overwrites: u32,
    /// Ring pointer forced forward past a flushed slot
    pub ring_skips: u32,
    /// DMA-done on a ring slot that was not processing
    pub ring_inconsistencies: u32,
    /// Channels force-stopped on a frame bookkeeping violation
    pub internal_faults: u32,
    /// Global DMA aborts issued
    pub dma_aborts: u32,
    /// Frame-start interrupts seen while a frame-end was expected
    pub lost_frame_end_irqs: u32,
    /// Frame-end interrupts seen while a frame-start was expected
    pub lost_frame_start_irqs: u32,
    /// Deferred events discarded because the queue was full
    pub dropped_events: u32,
    /// Observed DMA output on/off transitions
    pub dma_transitions: u32,
    /// Per-channel error words reported by the receiver
    pub link_errors: u32,
}

#[derive(Default)]
pub(crate) struct Diagnostics {
    pub(crate) overruns: AtomicU32,
    pub(crate) ring_overwrites: AtomicU32,
    pub(crate) ring_skips: AtomicU32,
    pub(crate) ring_inconsistencies: AtomicU32,
    pub(crate) internal_faults: AtomicU32,
    pub(crate) dma_aborts: AtomicU32,
    pub(crate) lost_frame_end_irqs: AtomicU32,
    pub(crate) lost_frame_start_irqs: AtomicU32,
    pub(crate) dropped_events: AtomicU32,
    pub(crate) dma_transitions: AtomicU32,
    pub(crate) link_errors: AtomicU32,
}

impl Diagnostics {
    pub(crate) const fn new() -> Self {
        Self {
            overruns: AtomicU32::new(0),
            ring_overwrites: AtomicU32::new(0),
            ring_skips: AtomicU32::new(0),
            ring_inconsistencies: AtomicU32::new(0),
            internal_faults: AtomicU32::new(0),
            dma_aborts: AtomicU32::new(0),
            lost_frame_end_irqs: AtomicU32::new(0),
            lost_frame_start_irqs: AtomicU32::new(0),
            dropped_events: AtomicU32::new(0),
            dma_transitions: AtomicU32::new(0),
            link_errors: AtomicU32::new(0),
        }
    }

    /// Increment a counter and return its new value.
    #[inline]
    pub(crate) fn bump(counter: &AtomicU32) -> u32 {
        counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
    }

    pub(crate) fn snapshot(&self) -> DiagnosticsSnapshot {
        let load = |c: &AtomicU32| c.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            overruns: load(&self.overruns),
            ring_overwrites: load(&self.ring_overwrites),
            ring_skips: load(&self.ring_skips),
            ring_inconsistencies: load(&self.ring_inconsistencies),
            internal_faults: load(&self.internal_faults),
            dma_aborts: load(&self.dma_aborts),
            lost_frame_end_irqs: load(&self.lost_frame_end_irqs),
            lost_frame_start_irqs: load(&self.lost_frame_start_irqs),
            dropped_events: load(&self.dropped_events),
            dma_transitions: load(&self.dma_transitions),
            link_errors: load(&self.link_errors),
        }
    }
}
