//! DMA arming and completion for externally-queued channels.
//!
//! Each frame interval the arm pass looks at the depth the previous interval
//! left behind. With fewer than two buffers processing it arms the oldest
//! requested buffer (or turns output off when none is waiting); with two it
//! reports an overrun. A buffer armed now is written during the next frame,
//! so completion always trails arming by one interval.
//!
//! All functions run with the channel's frame manager locked.

use super::channel::ChannelState;
use crate::driver::error::{FrameError, FrameResult};
use crate::frame::{BufferStatus, CompletedFrame, Frame, FrameManager, FrameState};
use crate::hal::{CsisHw, Pipeline};
use crate::internal::constants::MAX_PROCESSING_DEPTH;
use crate::internal::diagnostics::{Diagnostics, should_log};
use crate::internal::fmt::{csis_error, csis_info, csis_warn};

/// Program the oldest `Requested` frame and move it to `Processing`.
///
/// Returns `false` when nothing was waiting.
pub(crate) fn arm_next<H: CsisHw + ?Sized, const N: usize>(
    hw: &H,
    vc: usize,
    fm: &mut FrameManager<N>,
    fcount: u32,
) -> FrameResult<bool> {
    let Some(frame) = fm.peek(FrameState::Requested) else {
        return Ok(false);
    };
    let index = frame.index();

    hw.set_dma_address(vc, 0, frame.address());
    hw.enable_dma(vc, true);
    fm.frame_mut(index)?.set_fcount(fcount);
    fm.transition(index, FrameState::Processing)?;
    Ok(true)
}

/// Per-frame arm pass for one external channel.
pub(crate) fn arm_pass<H, P, const N: usize>(
    hw: &H,
    pipeline: &P,
    vc: usize,
    fm: &mut FrameManager<N>,
    state: &mut ChannelState,
    fcount: u32,
    diag: &Diagnostics,
) -> FrameResult<()>
where
    H: CsisHw + ?Sized,
    P: Pipeline + ?Sized,
{
    if state.pending_error {
        flush(pipeline, vc, fm, FrameState::Processing, BufferStatus::Error)?;
        csis_error!("[VC{}][F{}] frame was done with error", vc, fcount);
        state.pending_error = false;
    }

    if fm.count(FrameState::Processing) < MAX_PROCESSING_DEPTH {
        if !arm_next(hw, vc, fm, fcount)? && hw.dma_enabled(vc) {
            hw.enable_dma(vc, false);
        }
    } else {
        let overruns = Diagnostics::bump(&diag.overruns);
        if should_log(overruns) {
            csis_warn!(
                "[VC{}][F{}] process count is too many ({}/{}/{})",
                vc,
                fcount,
                fm.count(FrameState::Requested),
                fm.count(FrameState::Processing),
                fm.count(FrameState::Complete)
            );
        }
    }

    let enabled = hw.dma_enabled(vc);
    if state.last_dma_enable != Some(enabled) {
        Diagnostics::bump(&diag.dma_transitions);
        csis_info!(
            "[VC{}][F{}] DMA {} ({}/{}/{})",
            vc,
            fcount,
            if enabled { "on" } else { "off" },
            fm.count(FrameState::Requested),
            fm.count(FrameState::Processing),
            fm.count(FrameState::Complete)
        );
        state.last_dma_enable = Some(enabled);
    }

    Ok(())
}

/// Complete a frame on DMA-done.
///
/// With output enabled the older of two processing frames has finished;
/// with a single processing frame the newer one is still in flight and
/// nothing completes. With output disabled the oldest processing frame is
/// the last one written.
///
/// # Errors
/// - `Inconsistent` - depth is two but no processing frame is queued
pub(crate) fn complete_on_dma_done<H: CsisHw + ?Sized, const N: usize>(
    hw: &H,
    vc: usize,
    fm: &mut FrameManager<N>,
) -> FrameResult<Option<Frame>> {
    if hw.dma_enabled(vc) && fm.count(FrameState::Processing) != MAX_PROCESSING_DEPTH {
        return Ok(None);
    }

    let Some(frame) = fm.peek(FrameState::Processing).copied() else {
        if hw.dma_enabled(vc) {
            csis_error!("[VC{}] processing queue empty at depth {}", vc, MAX_PROCESSING_DEPTH);
            return Err(FrameError::Inconsistent);
        }
        return Ok(None);
    };

    fm.transition(frame.index(), FrameState::Complete)?;
    Ok(fm.frame(frame.index()).ok().copied())
}

/// Return every frame in `from` to `Complete` with `status`, oldest first,
/// reporting each through [`Pipeline::on_buffer_done`].
pub(crate) fn flush<P: Pipeline + ?Sized, const N: usize>(
    pipeline: &P,
    vc: usize,
    fm: &mut FrameManager<N>,
    from: FrameState,
    status: BufferStatus,
) -> FrameResult<()> {
    while let Some(index) = fm.peek(from).map(Frame::index) {
        fm.frame_mut(index)?.set_status(status);
        fm.transition(index, FrameState::Complete)?;
        pipeline.on_buffer_done(CompletedFrame::from_frame(vc, fm.frame(index)?));
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
