//! Multi-buffer ring for internal-use channels.
//!
//! Every slot of the channel's frame manager is committed to hardware once
//! per stream. Hardware then writes the slots autonomously, advancing its ring
//! pointer; software only observes which slot was written last and keeps the
//! queues in step.
//!
//! ```text
//!  DMA done on slot p:   slot p      Processing -> Complete
//!                        slot p+1    Complete   -> Processing  (overwrite, data dropped)
//!                                    Free       -> pointer := p+2  (skip)
//! ```

use super::channel::ChannelState;
use crate::driver::error::FrameResult;
use crate::frame::{FrameManager, FrameState};
use crate::hal::CsisHw;
use crate::internal::diagnostics::{Diagnostics, should_log};
use crate::internal::fmt::{csis_debug, csis_warn};

/// Slot following `slot` in a ring of `len` slots
#[inline]
pub(crate) const fn next_slot(slot: usize, len: usize) -> usize {
    (slot + 1) % len
}

/// Program every slot and hand the `Free` ones to hardware.
pub(crate) fn commit<H: CsisHw + ?Sized, const N: usize>(
    hw: &H,
    vc: usize,
    fm: &mut FrameManager<N>,
    state: &mut ChannelState,
    fcount: u32,
) -> FrameResult<()> {
    for index in 0..N {
        let frame = fm.frame(index)?;
        hw.set_dma_address(vc, index, frame.address());
        if frame.state() == FrameState::Free {
            fm.frame_mut(index)?.set_fcount(fcount);
            fm.transition(index, FrameState::Processing)?;
        }
    }
    hw.enable_dma(vc, N > 0);
    state.ring_committed = true;
    csis_debug!("[VC{}] ring of {} slots committed", vc, N);
    Ok(())
}

/// Return every `Processing` or `Complete` slot to `Free` and mark the ring
/// uncommitted.
pub(crate) fn reset<const N: usize>(
    fm: &mut FrameManager<N>,
    state: &mut ChannelState,
) -> FrameResult<()> {
    state.ring_committed = false;
    for index in 0..N {
        if matches!(
            fm.frame(index)?.state(),
            FrameState::Processing | FrameState::Complete
        ) {
            fm.transition(index, FrameState::Free)?;
        }
    }
    Ok(())
}

/// Per-frame ring pass: drop slots of a channel that reported an error, then
/// re-commit a ring that is not in hardware.
pub(crate) fn refresh<H: CsisHw + ?Sized, const N: usize>(
    hw: &H,
    vc: usize,
    fm: &mut FrameManager<N>,
    state: &mut ChannelState,
    fcount: u32,
) -> FrameResult<()> {
    if state.pending_error {
        reset(fm, state)?;
        csis_warn!("[VC{}][F{}] ring flushed after error", vc, fcount);
        state.pending_error = false;
    }
    if !state.ring_committed {
        commit(hw, vc, fm, state, fcount)?;
    }
    Ok(())
}

/// Advance the ring after hardware finished writing a slot.
pub(crate) fn on_dma_done<H: CsisHw + ?Sized, const N: usize>(
    hw: &H,
    vc: usize,
    fm: &mut FrameManager<N>,
    diag: &Diagnostics,
) -> FrameResult<()> {
    if N == 0 {
        return Ok(());
    }

    let written = hw.ring_pointer(vc);
    if written >= N {
        let count = Diagnostics::bump(&diag.ring_inconsistencies);
        if should_log(count) {
            csis_warn!("[VC{}] ring pointer {} out of range", vc, written);
        }
        return Ok(());
    }

    if fm.frame(written)?.state() == FrameState::Processing {
        fm.transition(written, FrameState::Complete)?;
    } else {
        let count = Diagnostics::bump(&diag.ring_inconsistencies);
        if should_log(count) {
            csis_warn!(
                "[VC{}] slot {} done in state {}",
                vc,
                written,
                fm.frame(written)?.state()
            );
        }
    }

    let next = next_slot(written, N);
    match fm.frame(next)?.state() {
        FrameState::Complete => {
            fm.transition(next, FrameState::Processing)?;
            let count = Diagnostics::bump(&diag.ring_overwrites);
            if should_log(count) {
                csis_warn!("[VC{}] slot {} not drained, overwriting", vc, next);
            }
        }
        FrameState::Free => {
            hw.set_ring_pointer(vc, next_slot(next, N));
            let count = Diagnostics::bump(&diag.ring_skips);
            if should_log(count) {
                csis_warn!("[VC{}] slot {} unavailable, skipping", vc, next);
            }
        }
        FrameState::Requested | FrameState::Processing => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::driver::config::ChannelMode;
    use crate::testing::{HwWrite, MockHw, manager_with_frames};

    fn committed_ring<const N: usize>(hw: &MockHw) -> (FrameManager<N>, ChannelState) {
        let mut fm = manager_with_frames::<N>();
        let mut state = ChannelState::new(ChannelMode::Internal, None);
        state.prepare_stream();
        commit(hw, 1, &mut fm, &mut state, 0).unwrap();
        (fm, state)
    }

    #[test]
    fn next_slot_wraps() {
        assert_eq!(next_slot(0, 4), 1);
        assert_eq!(next_slot(3, 4), 0);
    }

    #[test]
    fn commit_programs_all_slots() {
        let hw = MockHw::new();
        let (fm, state) = committed_ring::<3>(&hw);

        assert!(state.ring_committed);
        assert_eq!(fm.count(FrameState::Processing), 3);
        let writes = hw.writes();
        for index in 0..3 {
            assert!(writes.contains(&HwWrite::DmaAddress(
                1,
                index,
                fm.frame(index).unwrap().address()
            )));
        }
        assert_eq!(writes.last(), Some(&HwWrite::EnableDma(1, true)));
    }

    #[test]
    fn dma_done_completes_written_slot() {
        let hw = MockHw::new();
        let diag = Diagnostics::new();
        let (mut fm, _) = committed_ring::<4>(&hw);

        hw.set_ring_pointer_value(1, 0);
        on_dma_done(&hw, 1, &mut fm, &diag).unwrap();

        assert_eq!(fm.frame(0).unwrap().state(), FrameState::Complete);
        assert_eq!(fm.count(FrameState::Processing), 3);
        assert_eq!(diag.snapshot(), Default::default());
    }

    #[test]
    fn undrained_slot_is_overwritten_once_per_wrap() {
        let hw = MockHw::new();
        let diag = Diagnostics::new();
        let (mut fm, _) = committed_ring::<4>(&hw);

        for slot in 0..3 {
            hw.set_ring_pointer_value(1, slot);
            on_dma_done(&hw, 1, &mut fm, &diag).unwrap();
            assert_eq!(diag.snapshot().ring_overwrites, 0);
        }

        hw.set_ring_pointer_value(1, 3);
        on_dma_done(&hw, 1, &mut fm, &diag).unwrap();

        assert_eq!(diag.snapshot().ring_overwrites, 1);
        assert_eq!(fm.frame(0).unwrap().state(), FrameState::Processing);
        assert_eq!(fm.count(FrameState::Complete), 3);
        fm.check_invariants().unwrap();
    }

    #[test]
    fn free_next_slot_forces_pointer_forward() {
        let hw = MockHw::new();
        let diag = Diagnostics::new();
        let (mut fm, _) = committed_ring::<4>(&hw);
        fm.transition(2, FrameState::Free).unwrap();
        hw.clear_writes();

        hw.set_ring_pointer_value(1, 1);
        on_dma_done(&hw, 1, &mut fm, &diag).unwrap();

        assert_eq!(hw.writes(), [HwWrite::RingPointer(1, 3)]);
        assert_eq!(diag.snapshot().ring_skips, 1);
    }

    #[test]
    fn done_on_non_processing_slot_is_counted() {
        let hw = MockHw::new();
        let diag = Diagnostics::new();
        let (mut fm, _) = committed_ring::<4>(&hw);

        hw.set_ring_pointer_value(1, 0);
        on_dma_done(&hw, 1, &mut fm, &diag).unwrap();
        on_dma_done(&hw, 1, &mut fm, &diag).unwrap();

        assert_eq!(diag.snapshot().ring_inconsistencies, 1);
        assert_eq!(fm.frame(0).unwrap().state(), FrameState::Complete);
    }

    #[test]
    fn reset_returns_slots_to_free() {
        let hw = MockHw::new();
        let diag = Diagnostics::new();
        let (mut fm, mut state) = committed_ring::<4>(&hw);
        hw.set_ring_pointer_value(1, 0);
        on_dma_done(&hw, 1, &mut fm, &diag).unwrap();

        reset(&mut fm, &mut state).unwrap();
        assert!(!state.ring_committed);
        assert_eq!(fm.count(FrameState::Free), 4);
        fm.check_invariants().unwrap();
    }

    #[test]
    fn refresh_recommits_after_error() {
        let hw = MockHw::new();
        let (mut fm, mut state) = committed_ring::<2>(&hw);
        fm.transition(0, FrameState::Complete).unwrap();
        state.pending_error = true;

        refresh(&hw, 1, &mut fm, &mut state, 7).unwrap();

        assert!(!state.pending_error);
        assert!(state.ring_committed);
        assert_eq!(fm.count(FrameState::Processing), 2);
        assert_eq!(fm.frame(0).unwrap().fcount(), 7);
    }
}
