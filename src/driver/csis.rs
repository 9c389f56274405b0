//! Core CSIS receiver implementation.
//!
//! This module contains the main [`Csis`] structure and its caller-facing
//! operations:
//!
//! - Open/close and virtual channel binding
//! - Format and frame rate configuration
//! - Stream start/stop
//! - Buffer submission
//! - State and diagnostics queries
//!
//! The interrupt top half lives in [`interrupt`](super::interrupt), the
//! deferred worker in [`deferred`](super::deferred), and error recovery in
//! [`recovery`](super::recovery).

use core::sync::atomic::{AtomicU32, Ordering};

use embedded_hal::delay::DelayNs;

use super::channel::{ChannelState, ChannelTable, unbound_table};
use super::config::{
    ChannelConfig, ChannelMode, CsisConfig, FrameRate, ImageFormat, State, StreamParams,
};
use super::deferred::Worker;
use super::dma;
use super::error::{ConfigError, ConfigResult, Result, StreamError};
use super::interrupt::FrameEdge;
use super::recovery::Fault;
use super::ring;
use super::settle::lookup_settle;
use crate::frame::{FrameManager, FrameState, SharedFrameManager};
use crate::hal::{CsisHw, Pipeline};
use crate::internal::constants::{CHANNEL_COUNT, MAX_PROCESSING_DEPTH};
use crate::internal::diagnostics::{Diagnostics, DiagnosticsSnapshot};
use crate::internal::fmt::{csis_debug, csis_info};
use crate::sync::CriticalSectionCell;

/// Receiver-wide state guarded by one critical-section cell
pub(super) struct Lifecycle {
    pub(super) state: State,
    pub(super) params: StreamParams,
    /// The top half may service the interrupt line
    pub(super) irq_owned: bool,
    pub(super) edge: FrameEdge,
    pub(super) fault: Option<Fault>,
}

impl Lifecycle {
    const fn new() -> Self {
        Self {
            state: State::Closed,
            params: StreamParams::new(),
            irq_owned: false,
            edge: FrameEdge::Start,
            fault: None,
        }
    }
}

// =============================================================================
// CSIS Receiver
// =============================================================================

/// MIPI-CSIS virtual-channel receiver
///
/// Owns the per-channel buffer scheduling of one receive link. Every method
/// takes `&self`, so a single instance can be shared between the caller,
/// the interrupt handler and the deferred worker.
///
/// # Type Parameters
/// * `H` - Register access, see [`CsisHw`]
/// * `P` - Upstream consumer, see [`Pipeline`]
/// * `N` - Frames per channel frame manager
///
/// # Example
/// ```ignore
/// static VC0_FRAMES: SharedFrameManager<8> = SharedFrameManager::new();
///
/// let csis = Csis::new(hw, isp, CsisConfig::new().with_settle_table(&SETTLE));
/// csis.open(&VC0_FRAMES)?;
/// csis.set_format(ImageFormat::new(1920, 1080, RAW10))?;
/// for index in 0..8 {
///     csis.submit_buffer(0, index)?;
/// }
/// csis.stream(true, &mut delay)?;
/// ```
///
/// # Module Organization
///
/// - Caller operations (this module)
/// - [`interrupt`](super::interrupt): top half and frame-edge checker
/// - [`deferred`](super::deferred): event queue and worker body
/// - [`recovery`](super::recovery): receiver errors and channel faults
pub struct Csis<'a, H, P, const N: usize> {
    pub(super) hw: H,
    pub(super) pipeline: P,
    pub(super) config: CsisConfig,
    pub(super) lifecycle: CriticalSectionCell<Lifecycle>,
    pub(super) channels: CriticalSectionCell<ChannelTable<'a, N>>,
    /// Accepted frame starts since stream start
    pub(super) fcount: AtomicU32,
    /// Error bits per channel not yet consumed by a flush
    pub(super) error_ids: [AtomicU32; CHANNEL_COUNT],
    /// Bit `n` set when channel `n` erred or flushed since the last frame end
    pub(super) corrupted: AtomicU32,
    /// Corrupted frame ends in a row
    pub(super) error_frames: AtomicU32,
    pub(super) worker: Worker,
    pub(super) diag: Diagnostics,
}

impl<'a, H, P, const N: usize> Csis<'a, H, P, N> {
    /// Create a closed receiver
    ///
    /// This is a const function suitable for static initialization.
    pub const fn new(hw: H, pipeline: P, config: CsisConfig) -> Self {
        Self {
            hw,
            pipeline,
            config,
            lifecycle: CriticalSectionCell::new(Lifecycle::new()),
            channels: CriticalSectionCell::new(unbound_table()),
            fcount: AtomicU32::new(0),
            error_ids: [const { AtomicU32::new(0) }; CHANNEL_COUNT],
            corrupted: AtomicU32::new(0),
            error_frames: AtomicU32::new(0),
            worker: Worker::new(),
            diag: Diagnostics::new(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Hardware access
    #[inline(always)]
    pub fn hw(&self) -> &H {
        &self.hw
    }

    /// Upstream consumer
    #[inline(always)]
    pub fn pipeline(&self) -> &P {
        &self.pipeline
    }

    /// Static configuration
    #[inline(always)]
    pub fn config(&self) -> &CsisConfig {
        &self.config
    }

    /// Current lifecycle state
    pub fn state(&self) -> State {
        self.lifecycle.with_ref(|lc| lc.state)
    }

    /// Whether the receiver is streaming
    pub fn is_streaming(&self) -> bool {
        self.state() == State::Streaming
    }

    /// Latched receiver fault, cleared at the next stream start
    pub fn fault(&self) -> Option<Fault> {
        self.lifecycle.with_ref(|lc| lc.fault)
    }

    /// Channel 0 format used at the next stream start
    pub fn format(&self) -> ImageFormat {
        self.lifecycle.with_ref(|lc| lc.params.format)
    }

    /// Frame rate used for the settle lookup, in frames per second
    pub fn framerate(&self) -> u32 {
        self.lifecycle.with_ref(|lc| lc.params.framerate)
    }

    /// OR of the per-channel error words not yet consumed by a flush.
    ///
    /// A channel's word clears once its buffers were returned for the error
    /// (the next arm pass or ring refresh, a lost frame end flush, a channel
    /// fault) and at every stream start and stop.
    pub fn error_code(&self) -> u32 {
        self.error_ids
            .iter()
            .fold(0, |code, word| code | word.load(Ordering::Relaxed))
    }

    /// Frame starts accepted since stream start
    pub fn frame_count(&self) -> u32 {
        self.fcount.load(Ordering::Relaxed)
    }

    /// Snapshot of the diagnostic counters
    pub fn diagnostics(&self) -> DiagnosticsSnapshot {
        self.diag.snapshot()
    }

    /// Events queued for the deferred worker
    pub fn pending_events(&self) -> usize {
        self.worker.pending()
    }

    /// Whether `vc` was stopped by a bookkeeping fault
    pub fn channel_faulted(&self, vc: usize) -> bool {
        self.channels
            .with_ref(|table| table.get(vc).is_some_and(|slot| slot.state.faulted))
    }

    pub(super) fn channel_bound(&self, vc: usize) -> bool {
        self.channels
            .with_ref(|table| table.get(vc).is_some_and(|slot| slot.is_bound()))
    }

    /// Run `f` on a bound channel's flags and frame manager under one
    /// critical section. `None` when `vc` is out of range or unbound.
    pub(super) fn with_channel<R>(
        &self,
        vc: usize,
        f: impl FnOnce(&mut ChannelState, &mut FrameManager<N>) -> R,
    ) -> Option<R> {
        critical_section::with(|cs| -> Option<R> {
            let mut table = self.channels.borrow_mut(cs);
            let slot = table.get_mut(vc)?;
            let frames = slot.frames?;
            let mut fm = frames.borrow_mut(cs);
            Some(f(&mut slot.state, &mut *fm))
        })
    }
}

impl<'a, H: CsisHw, P: Pipeline, const N: usize> Csis<'a, H, P, N> {
    // =========================================================================
    // Open / Close
    // =========================================================================

    /// Open the receiver and bind channel 0 to `frames`.
    ///
    /// Resets the stream parameters, the frame counter and the error code.
    ///
    /// # Errors
    /// - `AlreadyOpen` - receiver is not closed
    pub fn open(&self, frames: &'a SharedFrameManager<N>) -> Result<()> {
        critical_section::with(|cs| {
            let mut lc = self.lifecycle.borrow_mut(cs);
            if lc.state != State::Closed {
                return Err(StreamError::AlreadyOpen);
            }

            let mut table = self.channels.borrow_mut(cs);
            for slot in table.iter_mut() {
                slot.unbind();
            }
            table[0].frames = Some(frames);

            *lc = Lifecycle::new();
            lc.state = State::Configured;
            Ok(())
        })?;

        self.fcount.store(0, Ordering::Relaxed);
        self.reset_error_tracking();
        csis_info!("receiver opened, {} frames per channel", N);
        Ok(())
    }

    /// Release every binding and close the receiver.
    ///
    /// # Errors
    /// - `NotOpen` - receiver is closed
    /// - `StillStreaming` - stop the stream first
    pub fn close(&self) -> Result<()> {
        critical_section::with(|cs| {
            let mut lc = self.lifecycle.borrow_mut(cs);
            match lc.state {
                State::Closed => return Err(StreamError::NotOpen),
                State::Streaming => return Err(StreamError::StillStreaming),
                State::Starting | State::Stopping => return Err(StreamError::Busy),
                State::Configured => {}
            }
            for slot in self.channels.borrow_mut(cs).iter_mut() {
                slot.unbind();
            }
            lc.state = State::Closed;
            Ok(())
        })?;
        csis_info!("receiver closed");
        Ok(())
    }

    /// Bind virtual channel `vc` (1-3) to its own frame manager.
    ///
    /// Internal channels run a ring over every frame of `frames`; external
    /// ones are fed through [`submit_buffer`](Self::submit_buffer). A channel
    /// without its own format inherits channel 0's.
    ///
    /// # Errors
    /// - `ChannelZeroInternal` - channel 0 cannot be internal
    /// - `InvalidChannel` - `vc` is 0 (bound by `open`) or out of range
    /// - `InvalidFormat` - the channel format has no size
    /// - `NotOpen` - receiver is closed
    /// - `BindingLocked` - receiver is streaming
    pub fn attach_channel(
        &self,
        vc: usize,
        frames: &'a SharedFrameManager<N>,
        config: ChannelConfig,
    ) -> Result<()> {
        if vc == 0 {
            return Err(match config.mode {
                ChannelMode::Internal => ConfigError::ChannelZeroInternal,
                ChannelMode::External => ConfigError::InvalidChannel,
            }
            .into());
        }
        if vc >= CHANNEL_COUNT {
            return Err(ConfigError::InvalidChannel.into());
        }
        if config.format.is_some_and(|format| !format.has_size()) {
            return Err(ConfigError::InvalidFormat.into());
        }

        critical_section::with(|cs| -> Result<()> {
            self.check_bindings_unlocked(self.lifecycle.borrow_mut(cs).state)?;
            let mut table = self.channels.borrow_mut(cs);
            let slot = table.get_mut(vc).ok_or(ConfigError::InvalidChannel)?;
            slot.frames = Some(frames);
            slot.state = ChannelState::new(config.mode, config.format);
            Ok(())
        })?;
        csis_debug!("[VC{}] attached, mode {}", vc, config.mode);
        Ok(())
    }

    /// Unbind virtual channel `vc` (1-3).
    ///
    /// # Errors
    /// - `InvalidChannel` - `vc` is 0 or out of range
    /// - `NotOpen` - receiver is closed
    /// - `BindingLocked` - receiver is streaming
    pub fn detach_channel(&self, vc: usize) -> Result<()> {
        if vc == 0 || vc >= CHANNEL_COUNT {
            return Err(ConfigError::InvalidChannel.into());
        }
        critical_section::with(|cs| -> Result<()> {
            self.check_bindings_unlocked(self.lifecycle.borrow_mut(cs).state)?;
            if let Some(slot) = self.channels.borrow_mut(cs).get_mut(vc) {
                slot.unbind();
            }
            Ok(())
        })
    }

    fn check_bindings_unlocked(&self, state: State) -> Result<()> {
        match state {
            State::Closed => Err(StreamError::NotOpen.into()),
            State::Starting | State::Streaming | State::Stopping => {
                Err(ConfigError::BindingLocked.into())
            }
            State::Configured => Ok(()),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Set channel 0's format, applied at the next stream start.
    ///
    /// # Errors
    /// - `InvalidFormat` - zero width or height
    /// - `NotOpen` - receiver is closed
    pub fn set_format(&self, format: ImageFormat) -> Result<()> {
        if !format.has_size() {
            return Err(ConfigError::InvalidFormat.into());
        }
        self.update_params(|params| params.format = format)
    }

    /// Set the frame rate from a time-per-frame fraction
    /// (`numerator / denominator` seconds).
    ///
    /// # Errors
    /// - `InvalidFrameRate` - zero numerator
    /// - `NotOpen` - receiver is closed
    pub fn set_framerate(&self, numerator: u32, denominator: u32) -> Result<()> {
        let fps = FrameRate::new(numerator, denominator)
            .fps()
            .ok_or(ConfigError::InvalidFrameRate)?;
        self.update_params(|params| params.framerate = fps)
    }

    fn update_params(&self, f: impl FnOnce(&mut StreamParams)) -> Result<()> {
        self.lifecycle.with(|lc| -> Result<()> {
            if lc.state == State::Closed {
                return Err(StreamError::NotOpen.into());
            }
            f(&mut lc.params);
            Ok(())
        })
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    /// Start (`true`) or stop (`false`) the stream.
    ///
    /// A dummy receiver accepts both without touching hardware or state.
    ///
    /// # Errors
    /// - `NotOpen` - receiver is closed
    /// - `AlreadyStarted` / `AlreadyStopped` - nothing to do
    /// - `Busy` - another start or stop has not finished
    pub fn stream<D: DelayNs>(&self, enable: bool, delay: &mut D) -> Result<()> {
        if self.config.dummy {
            csis_debug!("dummy receiver, stream {} ignored", enable);
            return Ok(());
        }
        if enable {
            self.stream_on()
        } else {
            self.stream_off(delay)
        }
    }

    fn stream_on(&self) -> Result<()> {
        let params = self.lifecycle.with(|lc| {
            match lc.state {
                State::Closed => return Err(StreamError::NotOpen),
                State::Starting | State::Streaming => return Err(StreamError::AlreadyStarted),
                State::Stopping => return Err(StreamError::Busy),
                State::Configured => {}
            }
            lc.state = State::Starting;
            Ok(lc.params)
        })?;

        self.hw.reset();
        let format = params.format;
        let settle = lookup_settle(
            self.config.settle_table,
            format.width,
            format.height,
            params.framerate,
        );
        self.hw.set_settle(settle);
        self.hw.set_lanes(self.config.lanes, self.config.mipi_speed);

        self.fcount.store(0, Ordering::Relaxed);
        self.reset_error_tracking();
        let dma_capable = self.config.dma_capable;
        for vc in 0..CHANNEL_COUNT {
            self.with_channel(vc, |state, fm| {
                let channel_format = state.format.unwrap_or(format);
                self.hw.configure_channel(vc, &channel_format);
                state.prepare_stream();
                if dma_capable {
                    self.frame_pass(vc, state, fm, 0);
                }
            });
        }

        if dma_capable {
            self.worker.start();
        }
        self.lifecycle.with(|lc| {
            lc.edge = FrameEdge::Start;
            lc.fault = None;
            lc.irq_owned = dma_capable;
        });
        if dma_capable {
            self.hw.mask_interrupts(true);
        }
        self.hw.enable();
        self.lifecycle.with(|lc| lc.state = State::Streaming);

        csis_info!(
            "stream on: {}x{}@{}fps, {} lanes, settle {}",
            format.width,
            format.height,
            params.framerate,
            self.config.lanes,
            settle
        );
        Ok(())
    }

    fn stream_off<D: DelayNs>(&self, delay: &mut D) -> Result<()> {
        self.lifecycle.with(|lc| {
            match lc.state {
                State::Closed => return Err(StreamError::NotOpen),
                State::Configured => return Err(StreamError::AlreadyStopped),
                State::Starting | State::Stopping => return Err(StreamError::Busy),
                State::Streaming => {}
            }
            lc.state = State::Stopping;
            Ok(())
        })?;

        self.hw.mask_interrupts(false);
        self.hw.disable();

        let discarded = self.worker.cancel();
        self.worker.join(delay);

        for vc in 0..CHANNEL_COUNT {
            self.with_channel(vc, |state, fm| self.teardown_channel(vc, state, fm));
        }

        self.lifecycle.with(|lc| {
            lc.irq_owned = false;
            lc.edge = FrameEdge::Start;
            lc.state = State::Configured;
        });
        csis_info!("stream off, {} deferred events discarded", discarded);
        Ok(())
    }

    /// Per-frame pass of one channel: arm pass for external channels, ring
    /// refresh for internal ones.
    ///
    /// The channel's error word is cleared once no flush is pending.
    pub(super) fn frame_pass(
        &self,
        vc: usize,
        state: &mut ChannelState,
        fm: &mut FrameManager<N>,
        fcount: u32,
    ) {
        if state.is_active() {
            let result = match state.mode {
                ChannelMode::External => {
                    dma::arm_pass(&self.hw, &self.pipeline, vc, fm, state, fcount, &self.diag)
                }
                ChannelMode::Internal => ring::refresh(&self.hw, vc, fm, state, fcount),
            };
            if let Err(err) = result {
                self.fault_channel(vc, state, fm, err);
            }
        }
        if !state.pending_error {
            self.clear_errors(vc);
        }
    }

    fn reset_error_tracking(&self) {
        for word in &self.error_ids {
            word.store(0, Ordering::Relaxed);
        }
        self.corrupted.store(0, Ordering::Relaxed);
        self.error_frames.store(0, Ordering::Relaxed);
    }

    // =========================================================================
    // Buffers
    // =========================================================================

    /// Submit frame `index` of channel `vc` for capture.
    ///
    /// The frame moves `Free` → `Requested`. While streaming, if the
    /// channel's output is off and fewer than two frames are processing, it
    /// is armed right away instead of at the next frame start. Without DMA
    /// capability this is a no-op.
    ///
    /// # Errors
    /// - `NotOpen` - receiver is closed
    /// - `Faulted` - receiver or channel stopped by a fault
    /// - `InvalidChannel` - `vc` out of range
    /// - `NotBound` - no frame manager bound to `vc`
    /// - `InternalChannel` - `vc` runs an internal ring
    /// - `InvalidIndex` / `InvalidState` - frame is not a `Free` frame
    pub fn submit_buffer(&self, vc: usize, index: usize) -> Result<()> {
        let (state, fault) = self.lifecycle.with_ref(|lc| (lc.state, lc.fault));
        if state == State::Closed {
            return Err(StreamError::NotOpen.into());
        }
        if fault.is_some() {
            return Err(StreamError::Faulted.into());
        }
        if vc >= CHANNEL_COUNT {
            return Err(ConfigError::InvalidChannel.into());
        }
        if !self.config.dma_capable {
            return Ok(());
        }

        critical_section::with(|cs| -> Result<()> {
            let mut table = self.channels.borrow_mut(cs);
            let slot = table.get_mut(vc).ok_or(ConfigError::InvalidChannel)?;
            let frames = slot.frames.ok_or(ConfigError::NotBound)?;
            let state = &mut slot.state;
            if state.mode == ChannelMode::Internal {
                return Err(ConfigError::InternalChannel.into());
            }
            if state.faulted {
                return Err(StreamError::Faulted.into());
            }

            let mut guard = frames.borrow_mut(cs);
            let fm = &mut *guard;
            fm.queue_request(index)?;

            if state.is_active()
                && !self.hw.dma_enabled(vc)
                && fm.count(FrameState::Processing) < MAX_PROCESSING_DEPTH
            {
                let fcount = self.fcount.load(Ordering::Relaxed);
                if let Err(err) = dma::arm_next(&self.hw, vc, fm, fcount) {
                    self.fault_channel(vc, state, fm, err);
                    return Err(err.into());
                }
                csis_debug!("[VC{}][F{}] frame {} armed on submit", vc, fcount, index);
            }
            Ok(())
        })
    }

    /// Slot the hardware ring pointer of internal channel `vc` names.
    ///
    /// # Errors
    /// - `InvalidChannel` - `vc` out of range or not an internal channel
    /// - `NotBound` - no frame manager bound to `vc`
    pub fn ring_pointer(&self, vc: usize) -> Result<usize> {
        let mode = self.channels.with_ref(|table| -> ConfigResult<ChannelMode> {
            let slot = table.get(vc).ok_or(ConfigError::InvalidChannel)?;
            if !slot.is_bound() {
                return Err(ConfigError::NotBound);
            }
            Ok(slot.state.mode)
        })?;
        if mode != ChannelMode::Internal {
            return Err(ConfigError::InvalidChannel.into());
        }
        Ok(self.hw.ring_pointer(vc))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
