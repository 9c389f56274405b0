//! Error handling, forced channel stops and stream teardown.
//!
//! This module extends [`Csis`] with the paths that return buffers outside
//! the normal DMA-done flow:
//!
//! - Receiver error interrupts ([`Csis::handle_errors`])
//! - Bookkeeping violations that stop a single channel
//! - DMA fabric saturation under [`SaturationPolicy::Escalate`]
//! - Runs of corrupted frames past [`CsisConfig::error_frame_limit`]
//! - Stream-stop teardown
//!
//! [`CsisConfig::error_frame_limit`]: super::config::CsisConfig::error_frame_limit

use core::sync::atomic::Ordering;

use super::channel::ChannelState;
use super::config::{ChannelMode, SaturationPolicy};
use super::csis::Csis;
use super::dma;
use super::error::{FrameError, FrameResult};
use super::interrupt::{ErrorCategory, ErrorKind, IrqSource};
use super::ring;
use crate::frame::{BufferStatus, FrameManager, FrameState};
use crate::hal::{CsisHw, Pipeline};
use crate::internal::constants::CHANNEL_COUNT;
use crate::internal::diagnostics::{Diagnostics, should_log};
use crate::internal::fmt::{csis_debug, csis_error, csis_warn};

/// Receiver-wide hard fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fault {
    /// DMA fabric saturation escalated by [`SaturationPolicy::Escalate`]
    FabricSaturated,
    /// Too many corrupted frames in a row
    ConsecutiveErrorFrames,
}

impl Fault {
    /// Returns a human-readable description of the fault
    pub const fn as_str(&self) -> &'static str {
        match self {
            Fault::FabricSaturated => "DMA fabric saturated",
            Fault::ConsecutiveErrorFrames => "consecutive corrupted frames",
        }
    }
}

/// Hand every buffer of a channel back: external channels return Requested
/// then Processing frames with error status, internal rings are reset.
fn release_buffers<P: Pipeline + ?Sized, const N: usize>(
    pipeline: &P,
    vc: usize,
    fm: &mut FrameManager<N>,
    state: &mut ChannelState,
) -> FrameResult<()> {
    match state.mode {
        ChannelMode::External => {
            dma::flush(pipeline, vc, fm, FrameState::Requested, BufferStatus::Error)?;
            dma::flush(pipeline, vc, fm, FrameState::Processing, BufferStatus::Error)
        }
        ChannelMode::Internal => ring::reset(fm, state),
    }
}

impl<H: CsisHw, P: Pipeline, const N: usize> Csis<'_, H, P, N> {
    // =========================================================================
    // Channel Faults
    // =========================================================================

    /// Stop `vc` after its frame bookkeeping failed.
    ///
    /// Output is disabled and every buffer the manager still tracks is
    /// released. The channel stays stopped until the next stream start.
    pub(super) fn fault_channel(
        &self,
        vc: usize,
        state: &mut ChannelState,
        fm: &mut FrameManager<N>,
        err: FrameError,
    ) {
        let faults = Diagnostics::bump(&self.diag.internal_faults);
        csis_error!("[VC{}] {}, channel stopped (fault #{})", vc, err.as_str(), faults);

        state.faulted = true;
        state.pending_error = false;
        self.hw.enable_dma(vc, false);
        state.last_dma_enable = Some(false);
        self.clear_errors(vc);
        self.mark_corrupted(vc);

        if let Err(e) = release_buffers(&self.pipeline, vc, fm, state) {
            csis_error!("[VC{}] buffer release failed: {}, frames reset", vc, e.as_str());
            fm.reset();
            state.ring_committed = false;
        }
    }

    /// Return a channel to its idle state at stream stop.
    pub(super) fn teardown_channel(
        &self,
        vc: usize,
        state: &mut ChannelState,
        fm: &mut FrameManager<N>,
    ) {
        if let Err(e) = release_buffers(&self.pipeline, vc, fm, state) {
            csis_error!("[VC{}] teardown flush failed: {}", vc, e.as_str());
        }
        state.started = false;
        state.pending_error = false;
        state.ring_committed = false;
        state.last_dma_enable = None;
        self.clear_errors(vc);
    }

    // =========================================================================
    // Receiver Errors
    // =========================================================================

    /// Apply the per-channel error words of one interrupt.
    ///
    /// Runs in the top half. A lost frame end flushes the channel on the
    /// spot; other link errors leave the flush to the next frame pass.
    pub(super) fn handle_errors(&self, src: &IrqSource, fcount: u32) {
        let mut aborted = false;

        for vc in 0..CHANNEL_COUNT {
            let errors = src.channel_errors(vc);
            if errors.is_empty() {
                continue;
            }

            if !aborted && errors.has_category(ErrorCategory::Saturation) {
                self.hw.abort_dma();
                Diagnostics::bump(&self.diag.dma_aborts);
                aborted = true;
            }

            let count = Diagnostics::bump(&self.diag.link_errors);
            if should_log(count) {
                for kind in errors.kinds() {
                    csis_warn!("[VC{}][F{}] {} error", vc, fcount, kind.as_str());
                }
            }

            let flag = errors.kinds().any(|kind| kind.category() != ErrorCategory::Timing);
            let lost_end = errors.contains(ErrorKind::LostFrameEnd);

            let bound = self.with_channel(vc, |state, fm| {
                self.record_errors(vc, errors.bits());
                if !flag {
                    return;
                }
                state.pending_error = true;
                if !(lost_end && state.is_active()) {
                    return;
                }

                let flushed = match state.mode {
                    ChannelMode::External => dma::flush(
                        &self.pipeline,
                        vc,
                        fm,
                        FrameState::Processing,
                        BufferStatus::Error,
                    ),
                    ChannelMode::Internal => ring::reset(fm, state),
                };
                match flushed {
                    Ok(()) => {
                        csis_error!("[VC{}][F{}] frame end lost, flushed", vc, fcount);
                        state.pending_error = false;
                        self.clear_errors(vc);
                    }
                    Err(err) => self.fault_channel(vc, state, fm, err),
                }
            });
            if bound.is_none() {
                self.record_errors(vc, errors.bits());
            }
        }

        if aborted && self.config.saturation_policy == SaturationPolicy::Escalate {
            self.escalate(Fault::FabricSaturated);
        }
    }

    // =========================================================================
    // Error Words
    // =========================================================================

    /// Accumulate `bits` into `vc`'s error word and mark the current frame
    /// corrupted.
    pub(super) fn record_errors(&self, vc: usize, bits: u32) {
        if let Some(word) = self.error_ids.get(vc) {
            word.fetch_or(bits, Ordering::Relaxed);
        }
        self.mark_corrupted(vc);
    }

    /// Forget `vc`'s error word once its buffers were returned.
    pub(super) fn clear_errors(&self, vc: usize) {
        if let Some(word) = self.error_ids.get(vc) {
            word.store(0, Ordering::Relaxed);
        }
    }

    fn mark_corrupted(&self, vc: usize) {
        self.corrupted.fetch_or(1 << vc, Ordering::Relaxed);
    }

    /// Close one frame interval at its frame-end edge.
    ///
    /// Returns the status reported with the edge: `Error` when any channel
    /// recorded an error or flushed its buffers since the previous frame end.
    /// A run of `error_frame_limit` such frames stops the receiver; a clean
    /// frame end restarts the count.
    pub(super) fn end_frame(&self, fcount: u32) -> BufferStatus {
        let channels = self.corrupted.swap(0, Ordering::Relaxed);
        if channels == 0 {
            self.error_frames.store(0, Ordering::Relaxed);
            return BufferStatus::Done;
        }

        let run = self.error_frames.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        csis_debug!("[F{}] corrupted frame end, channels {:#x}, run {}", fcount, channels, run);

        let limit = self.config.error_frame_limit;
        if limit != 0 && run >= limit && self.fault().is_none() {
            csis_error!("[F{}] {} corrupted frames in a row", fcount, run);
            self.escalate(Fault::ConsecutiveErrorFrames);
        }
        BufferStatus::Error
    }

    /// Stop the receiver and latch `fault` until the next stream start.
    fn escalate(&self, fault: Fault) {
        self.hw.mask_interrupts(false);
        self.hw.disable();
        self.lifecycle.with(|lc| lc.fault = Some(fault));
        csis_error!("{}, receiver stopped", fault.as_str());
    }
}
