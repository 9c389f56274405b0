//! Frame manager: a fixed set of frames partitioned into four state queues.

use core::cell::RefMut;

use critical_section::CriticalSection;

use super::queue::IndexQueue;
use super::{BufferStatus, Frame, FrameState};
use crate::driver::error::{FrameError, FrameResult};
use crate::sync::CriticalSectionCell;

/// Owns `N` frames and the four FIFO queues that partition them.
///
/// Invariant: every frame is resident in exactly the queue matching its
/// state, so the four queue depths always sum to `N`.
///
/// All mutation happens through `&mut self`; share a manager between the
/// interrupt path and the buffer-submission path with [`SharedFrameManager`].
pub struct FrameManager<const N: usize> {
    frames: [Frame; N],
    queues: [IndexQueue<N>; 4],
}

impl<const N: usize> FrameManager<N> {
    /// Create a manager with every frame `Free` (const, suitable for statics).
    pub const fn new() -> Self {
        let mut frames = [Frame::new(0); N];
        let mut free = IndexQueue::new();
        let mut i = 0;
        while i < N {
            frames[i] = Frame::new(i);
            i += 1;
        }
        free.fill_in_order();
        Self {
            frames,
            queues: [
                free,
                IndexQueue::new(),
                IndexQueue::new(),
                IndexQueue::new(),
            ],
        }
    }

    /// Number of frames owned by this manager
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of frames currently in `state`
    #[inline]
    pub fn count(&self, state: FrameState) -> usize {
        self.queues[state.queue_index()].len()
    }

    /// Oldest frame in `state`, without removing it.
    pub fn peek(&self, state: FrameState) -> Option<&Frame> {
        self.queues[state.queue_index()]
            .front()
            .map(|index| &self.frames[index])
    }

    /// Frame at `index`
    pub fn frame(&self, index: usize) -> FrameResult<&Frame> {
        self.frames.get(index).ok_or(FrameError::InvalidIndex)
    }

    /// Iterate over all frames in index order
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Frame indices currently in `state`, oldest first
    pub fn queued(&self, state: FrameState) -> impl Iterator<Item = usize> + '_ {
        self.queues[state.queue_index()].iter()
    }

    /// Register the DMA addresses (one per plane) of a `Free` frame.
    ///
    /// # Errors
    /// - `InvalidIndex` - index out of range
    /// - `InvalidState` - frame is not `Free`
    pub fn register(&mut self, index: usize, addresses: &[u32]) -> FrameResult<()> {
        let frame = self.frames.get_mut(index).ok_or(FrameError::InvalidIndex)?;
        if frame.state() != FrameState::Free {
            return Err(FrameError::InvalidState);
        }
        frame.set_planes(addresses);
        Ok(())
    }

    /// Move frame `index` from whichever queue holds it into `to`'s queue.
    ///
    /// Moving a frame into the state it already has re-queues it at the tail.
    ///
    /// # Errors
    /// - `InvalidIndex` - index out of range
    /// - `NotResident` - the frame is not in the queue its state names
    /// - `Inconsistent` - the destination queue is full (a frame is counted twice)
    pub fn transition(&mut self, index: usize, to: FrameState) -> FrameResult<()> {
        let from = self.frame(index)?.state();
        if !self.queues[from.queue_index()].remove(index) {
            return Err(FrameError::NotResident);
        }
        if !self.queues[to.queue_index()].push_back(index) {
            return Err(FrameError::Inconsistent);
        }
        self.frames[index].set_state(to);
        Ok(())
    }

    /// Submit a `Free` frame for capture (`Free` → `Requested`).
    ///
    /// # Errors
    /// - `InvalidIndex` - index out of range
    /// - `InvalidState` - frame is not `Free`
    pub fn queue_request(&mut self, index: usize) -> FrameResult<()> {
        if self.frame(index)?.state() != FrameState::Free {
            return Err(FrameError::InvalidState);
        }
        self.frames[index].set_status(BufferStatus::Done);
        self.transition(index, FrameState::Requested)
    }

    /// Hand the oldest `Complete` frame back to software (`Complete` → `Free`).
    ///
    /// Returns a copy of the frame as it was when completed.
    pub fn take_complete(&mut self) -> Option<Frame> {
        let index = self.queues[FrameState::Complete.queue_index()].front()?;
        let done = self.frames[index];
        self.transition(index, FrameState::Free).ok()?;
        Some(done)
    }

    /// Return every frame to `Free`, keeping registered addresses.
    pub fn reset(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
        self.queues[FrameState::Free.queue_index()].fill_in_order();
        for frame in &mut self.frames {
            frame.set_state(FrameState::Free);
            frame.set_status(BufferStatus::Done);
            frame.set_fcount(0);
        }
    }

    /// Verify the partition invariant.
    ///
    /// # Errors
    /// - `Inconsistent` - queue depths do not sum to `N`
    /// - `NotResident` - a frame is missing from its state's queue, or queued twice
    pub fn check_invariants(&self) -> FrameResult<()> {
        let total: usize = self.queues.iter().map(IndexQueue::len).sum();
        if total != N {
            return Err(FrameError::Inconsistent);
        }
        for frame in &self.frames {
            let resident = FrameState::ALL
                .iter()
                .filter(|state| self.queues[state.queue_index()].contains(frame.index()))
                .count();
            if resident != 1 || !self.queues[frame.state().queue_index()].contains(frame.index()) {
                return Err(FrameError::NotResident);
            }
        }
        Ok(())
    }

    pub(crate) fn frame_mut(&mut self, index: usize) -> FrameResult<&mut Frame> {
        self.frames.get_mut(index).ok_or(FrameError::InvalidIndex)
    }
}

impl<const N: usize> Default for FrameManager<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame manager behind an interrupt-safe lock.
///
/// The same manager is touched from the interrupt top half, the deferred
/// worker and the buffer-submission path. Every access runs inside a critical
/// section, so a non-interrupt caller cannot be preempted by the interrupt
/// while it holds the manager.
///
/// # Example
///
/// ```ignore
/// static VC0_FRAMES: SharedFrameManager<8> = SharedFrameManager::new();
///
/// VC0_FRAMES.with_lock(|fm| fm.register(0, &[0x8000_0000]))?;
/// ```
pub struct SharedFrameManager<const N: usize> {
    inner: CriticalSectionCell<FrameManager<N>>,
}

impl<const N: usize> SharedFrameManager<N> {
    /// Create a shared manager (const, suitable for static initialization).
    pub const fn new() -> Self {
        Self {
            inner: CriticalSectionCell::new(FrameManager::new()),
        }
    }

    /// Execute a closure with exclusive access to the manager.
    ///
    /// Interrupts are disabled for the duration of the closure.
    #[inline]
    pub fn with_lock<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut FrameManager<N>) -> R,
    {
        self.inner.with(f)
    }

    /// Try to execute a closure, returning `None` if the manager is already borrowed.
    #[inline]
    pub fn try_with_lock<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut FrameManager<N>) -> R,
    {
        self.inner.try_with(f)
    }

    /// Borrow inside a critical section the caller already holds.
    #[inline]
    pub(crate) fn borrow_mut<'cs>(&'cs self, cs: CriticalSection<'cs>) -> RefMut<'cs, FrameManager<N>> {
        self.inner.borrow_mut(cs)
    }
}

impl<const N: usize> Default for SharedFrameManager<N> {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use super::*;

    fn manager_with_addresses<const N: usize>() -> FrameManager<N> {
        let mut fm = FrameManager::new();
        for i in 0..N {
            fm.register(i, &[0x1000_0000 + (i as u32) * 0x1000]).unwrap();
        }
        fm
    }

    #[test]
    fn new_manager_all_free() {
        let fm: FrameManager<4> = FrameManager::new();
        assert_eq!(fm.capacity(), 4);
        assert_eq!(fm.count(FrameState::Free), 4);
        assert_eq!(fm.count(FrameState::Requested), 0);
        assert_eq!(fm.peek(FrameState::Free).unwrap().index(), 0);
        fm.check_invariants().unwrap();
    }

    #[test]
    fn transition_moves_between_queues() {
        let mut fm = manager_with_addresses::<4>();
        fm.queue_request(2).unwrap();
        assert_eq!(fm.count(FrameState::Free), 3);
        assert_eq!(fm.count(FrameState::Requested), 1);
        assert_eq!(fm.frame(2).unwrap().state(), FrameState::Requested);

        fm.transition(2, FrameState::Processing).unwrap();
        assert_eq!(fm.count(FrameState::Requested), 0);
        assert_eq!(fm.peek(FrameState::Processing).unwrap().index(), 2);
        fm.check_invariants().unwrap();
    }

    #[test]
    fn counts_sum_to_capacity_after_every_operation() {
        let mut fm = manager_with_addresses::<6>();
        let ops: [(usize, FrameState); 8] = [
            (0, FrameState::Requested),
            (1, FrameState::Requested),
            (0, FrameState::Processing),
            (5, FrameState::Processing),
            (0, FrameState::Complete),
            (1, FrameState::Processing),
            (5, FrameState::Complete),
            (0, FrameState::Free),
        ];
        for (index, to) in ops {
            fm.transition(index, to).unwrap();
            let total: usize = FrameState::ALL.iter().map(|s| fm.count(*s)).sum();
            assert_eq!(total, 6);
            fm.check_invariants().unwrap();
        }
    }

    #[test]
    fn peek_order_is_fifo_per_state() {
        let mut fm = manager_with_addresses::<5>();
        for index in [3, 0, 4, 1] {
            fm.queue_request(index).unwrap();
        }

        let mut order = Vec::new();
        while let Some(frame) = fm.peek(FrameState::Requested) {
            let index = frame.index();
            order.push(index);
            fm.transition(index, FrameState::Processing).unwrap();
        }
        assert_eq!(order, [3, 0, 4, 1]);
        assert_eq!(fm.queued(FrameState::Processing).collect::<Vec<_>>(), [3, 0, 4, 1]);
    }

    #[test]
    fn peek_empty_queue_is_none() {
        let fm: FrameManager<2> = FrameManager::new();
        assert!(fm.peek(FrameState::Complete).is_none());
    }

    #[test]
    fn queue_request_rejects_non_free() {
        let mut fm = manager_with_addresses::<2>();
        fm.queue_request(0).unwrap();
        assert_eq!(fm.queue_request(0), Err(FrameError::InvalidState));
        assert_eq!(fm.queue_request(7), Err(FrameError::InvalidIndex));
    }

    #[test]
    fn register_rejects_busy_frame() {
        let mut fm = manager_with_addresses::<2>();
        fm.queue_request(1).unwrap();
        assert_eq!(fm.register(1, &[0xdead_0000]), Err(FrameError::InvalidState));
        assert_eq!(fm.register(9, &[0xdead_0000]), Err(FrameError::InvalidIndex));
    }

    #[test]
    fn transition_out_of_range_is_invalid_index() {
        let mut fm: FrameManager<2> = FrameManager::new();
        assert_eq!(
            fm.transition(2, FrameState::Processing),
            Err(FrameError::InvalidIndex)
        );
        fm.check_invariants().unwrap();
    }

    #[test]
    fn transition_detects_missing_residency() {
        let mut fm = manager_with_addresses::<3>();
        // Corrupt the record: claim Processing without being queued there.
        fm.frame_mut(1).unwrap().set_state(FrameState::Processing);
        assert_eq!(fm.check_invariants(), Err(FrameError::NotResident));
        assert_eq!(
            fm.transition(1, FrameState::Complete),
            Err(FrameError::NotResident)
        );
    }

    #[test]
    fn take_complete_returns_oldest_and_frees_it() {
        let mut fm = manager_with_addresses::<3>();
        fm.transition(2, FrameState::Complete).unwrap();
        fm.transition(0, FrameState::Complete).unwrap();

        let done = fm.take_complete().unwrap();
        assert_eq!(done.index(), 2);
        assert_eq!(done.state(), FrameState::Complete);
        assert_eq!(fm.frame(2).unwrap().state(), FrameState::Free);
        assert_eq!(fm.take_complete().unwrap().index(), 0);
        assert!(fm.take_complete().is_none());
        fm.check_invariants().unwrap();
    }

    #[test]
    fn reset_returns_everything_to_free() {
        let mut fm = manager_with_addresses::<3>();
        fm.queue_request(0).unwrap();
        fm.transition(1, FrameState::Processing).unwrap();
        fm.transition(2, FrameState::Complete).unwrap();

        fm.reset();
        assert_eq!(fm.count(FrameState::Free), 3);
        assert_eq!(fm.frame(1).unwrap().address(), 0x1000_1000);
        fm.check_invariants().unwrap();
    }

    #[test]
    fn shared_manager_with_lock() {
        let shared: SharedFrameManager<2> = SharedFrameManager::new();
        shared.with_lock(|fm| fm.register(0, &[0x4000]).unwrap());
        let addr = shared.with_lock(|fm| fm.frame(0).unwrap().address());
        assert_eq!(addr, 0x4000);

        let nested = shared.with_lock(|_| shared.try_with_lock(|_| ()));
        assert!(nested.is_none());
    }
}
