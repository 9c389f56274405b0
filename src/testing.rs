//! Testing utilities and mock implementations
//!
//! Host-side stand-ins for the receiver hardware and the upstream pipeline,
//! so the scheduling logic can be exercised without a device.
//!
//! Only available when running `cargo test`.

// Note: The #[cfg(test)] attribute is applied in lib.rs where this module is declared
#![allow(missing_docs)]
#![allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]

extern crate std;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::vec::Vec;

use crate::driver::config::ImageFormat;
use crate::driver::interrupt::IrqSource;
use crate::frame::{BufferStatus, CompletedFrame, FrameManager, SharedFrameManager};
use crate::hal::{CsisHw, Pipeline};
use crate::internal::constants::CHANNEL_COUNT;

// =============================================================================
// Mock Receiver Hardware
// =============================================================================

/// One side effect issued through [`CsisHw`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwWrite {
    Reset,
    Enable,
    Disable,
    Settle(u32),
    Lanes(u8, u32),
    ConfigureChannel(usize, ImageFormat),
    DmaAddress(usize, usize, u32),
    EnableDma(usize, bool),
    RingPointer(usize, usize),
    MaskInterrupts(bool),
    AbortDma,
}

#[derive(Debug, Default)]
struct MockHwState {
    writes: Vec<HwWrite>,
    dma_enabled: [bool; CHANNEL_COUNT],
    ring_pointer: [usize; CHANNEL_COUNT],
    irq_sources: VecDeque<IrqSource>,
}

/// Mock receiver for testing without hardware
///
/// Records every write, tracks per-channel DMA output and ring pointer, and
/// replays scripted interrupt sources.
///
/// # Example
///
/// ```ignore
/// let hw = MockHw::new();
/// hw.push_irq(IrqSource::new().with_frame_start());
/// assert!(csis.handle_interrupt());
/// assert!(hw.writes().contains(&HwWrite::EnableDma(0, true)));
/// ```
#[derive(Debug, Default)]
pub struct MockHw {
    state: Mutex<MockHwState>,
}

impl MockHw {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockHwState> {
        self.state.lock().unwrap()
    }

    fn record(&self, write: HwWrite) {
        self.lock().writes.push(write);
    }

    /// Get all writes that have been made
    pub fn writes(&self) -> Vec<HwWrite> {
        self.lock().writes.clone()
    }

    /// Clear the write log
    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }

    /// Count writes matching `pred`
    pub fn count_writes(&self, pred: impl Fn(&HwWrite) -> bool) -> usize {
        self.lock().writes.iter().filter(|w| pred(w)).count()
    }

    /// Force the DMA output state of `vc` without logging a write
    pub fn set_dma_enabled(&self, vc: usize, enabled: bool) {
        self.lock().dma_enabled[vc] = enabled;
    }

    /// Simulate hardware moving the ring pointer of `vc`
    pub fn set_ring_pointer_value(&self, vc: usize, slot: usize) {
        self.lock().ring_pointer[vc] = slot;
    }

    /// Queue an interrupt source for the next `read_interrupt_source`
    pub fn push_irq(&self, src: IrqSource) {
        self.lock().irq_sources.push_back(src);
    }
}

impl CsisHw for MockHw {
    fn reset(&self) {
        let mut state = self.lock();
        state.dma_enabled = [false; CHANNEL_COUNT];
        state.ring_pointer = [0; CHANNEL_COUNT];
        state.writes.push(HwWrite::Reset);
    }

    fn enable(&self) {
        self.record(HwWrite::Enable);
    }

    fn disable(&self) {
        self.record(HwWrite::Disable);
    }

    fn set_settle(&self, settle: u32) {
        self.record(HwWrite::Settle(settle));
    }

    fn set_lanes(&self, lanes: u8, mipi_speed: u32) {
        self.record(HwWrite::Lanes(lanes, mipi_speed));
    }

    fn configure_channel(&self, vc: usize, format: &ImageFormat) {
        self.record(HwWrite::ConfigureChannel(vc, *format));
    }

    fn set_dma_address(&self, vc: usize, slot: usize, address: u32) {
        self.record(HwWrite::DmaAddress(vc, slot, address));
    }

    fn enable_dma(&self, vc: usize, enable: bool) {
        let mut state = self.lock();
        state.dma_enabled[vc] = enable;
        state.writes.push(HwWrite::EnableDma(vc, enable));
    }

    fn dma_enabled(&self, vc: usize) -> bool {
        self.lock().dma_enabled[vc]
    }

    fn set_ring_pointer(&self, vc: usize, slot: usize) {
        let mut state = self.lock();
        state.ring_pointer[vc] = slot;
        state.writes.push(HwWrite::RingPointer(vc, slot));
    }

    fn ring_pointer(&self, vc: usize) -> usize {
        self.lock().ring_pointer[vc]
    }

    fn read_interrupt_source(&self) -> IrqSource {
        self.lock().irq_sources.pop_front().unwrap_or_default()
    }

    fn mask_interrupts(&self, enable: bool) {
        self.record(HwWrite::MaskInterrupts(enable));
    }

    fn abort_dma(&self) {
        self.record(HwWrite::AbortDma);
    }
}

// =============================================================================
// Recording Pipeline
// =============================================================================

#[derive(Debug, Default)]
struct Recorded {
    frame_starts: Vec<u32>,
    frame_ends: Vec<Option<CompletedFrame>>,
    frame_end_statuses: Vec<BufferStatus>,
    errors: Vec<Vec<u32>>,
    buffers_done: Vec<CompletedFrame>,
}

/// Pipeline that records every notification
#[derive(Debug, Default)]
pub struct RecordingPipeline {
    recorded: Mutex<Recorded>,
}

impl RecordingPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame_starts(&self) -> Vec<u32> {
        self.recorded.lock().unwrap().frame_starts.clone()
    }

    pub fn frame_ends(&self) -> Vec<Option<CompletedFrame>> {
        self.recorded.lock().unwrap().frame_ends.clone()
    }

    pub fn frame_end_statuses(&self) -> Vec<BufferStatus> {
        self.recorded.lock().unwrap().frame_end_statuses.clone()
    }

    pub fn errors(&self) -> Vec<Vec<u32>> {
        self.recorded.lock().unwrap().errors.clone()
    }

    pub fn buffers_done(&self) -> Vec<CompletedFrame> {
        self.recorded.lock().unwrap().buffers_done.clone()
    }
}

impl Pipeline for RecordingPipeline {
    fn on_frame_start(&self, fcount: u32) {
        self.recorded.lock().unwrap().frame_starts.push(fcount);
    }

    fn on_frame_end(&self, completed: Option<CompletedFrame>, status: BufferStatus) {
        let mut recorded = self.recorded.lock().unwrap();
        recorded.frame_ends.push(completed);
        recorded.frame_end_statuses.push(status);
    }

    fn on_error(&self, errors: &[u32]) {
        self.recorded.lock().unwrap().errors.push(errors.to_vec());
    }

    fn on_buffer_done(&self, frame: CompletedFrame) {
        self.recorded.lock().unwrap().buffers_done.push(frame);
    }
}

// =============================================================================
// Mock Delay
// =============================================================================

/// Mock delay that records requested time and yields the thread
#[derive(Debug, Default)]
pub struct MockDelay {
    total_ns: AtomicU64,
}

impl MockDelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get total nanoseconds that were "delayed"
    pub fn total_ns(&self) -> u64 {
        self.total_ns.load(Ordering::Relaxed)
    }
}

impl embedded_hal::delay::DelayNs for MockDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ns.fetch_add(u64::from(ns), Ordering::Relaxed);
        std::thread::yield_now();
    }
}

// =============================================================================
// Frame Helpers
// =============================================================================

/// DMA address given to frame `index` by the helpers below
pub const fn frame_address(index: usize) -> u32 {
    0x8000_0000 + (index as u32) * 0x0010_0000
}

/// Frame manager with every frame registered at [`frame_address`]
pub fn manager_with_frames<const N: usize>() -> FrameManager<N> {
    let mut fm = FrameManager::new();
    for index in 0..N {
        fm.register(index, &[frame_address(index)]).unwrap();
    }
    fm
}

/// Register every frame of a shared manager at [`frame_address`]
pub fn register_frames<const N: usize>(shared: &SharedFrameManager<N>) {
    shared.with_lock(|fm| {
        for index in 0..N {
            fm.register(index, &[frame_address(index)]).unwrap();
        }
    });
}
