//! MIPI-CSIS Receiver Core
//!
//! A `no_std`, `no_alloc` frame-buffer scheduler for a MIPI-CSI style camera
//! receiver that multiplexes up to four virtual channels onto one link.
//!
//! Every hardware frame interval the core decides which buffer gets written,
//! which buffer is now complete, and how to recover when the link or the DMA
//! fabric reports an error, without ever blocking in interrupt context.
//!
//! # Architecture
//!
//! The crate is organized into three layers:
//!
//! 1. **Receiver** ([`driver::csis`]): lifecycle, buffer submission, the
//!    interrupt top half and the deferred worker
//! 2. **Frame bookkeeping** ([`frame`]): per-channel frame managers with one
//!    FIFO queue per buffer state
//! 3. **Seams** ([`hal`]): [`CsisHw`] for register access and [`Pipeline`]
//!    for upstream notifications, both implemented by the platform
//!
//! ## Channel Modes
//!
//! - **External**: buffers are submitted one at a time and armed at most two
//!   deep, one frame interval ahead of completion
//! - **Internal**: a closed ring over every frame is committed once per
//!   stream and advanced by hardware
//!
//! # Features
//!
//! - `defmt`: Enable defmt logging and formatting for public types
//! - `async`: Enable `Csis::run_worker`, woken from the interrupt top half
//!
//! # Example
//!
//! ```ignore
//! use csis_rx::{ChannelConfig, Csis, CsisConfig, ImageFormat, SharedFrameManager};
//!
//! static VC0: SharedFrameManager<4> = SharedFrameManager::new();
//! static VC1_RING: SharedFrameManager<4> = SharedFrameManager::new();
//!
//! for (index, addr) in buffers.iter().enumerate() {
//!     VC0.with_lock(|fm| fm.register(index, &[*addr]))?;
//! }
//!
//! let csis = Csis::new(hw, isp, CsisConfig::new().with_settle_table(&SETTLE));
//! csis.open(&VC0)?;
//! csis.attach_channel(1, &VC1_RING, ChannelConfig::internal())?;
//! csis.set_format(ImageFormat::new(1920, 1080, RAW10))?;
//! csis.submit_buffer(0, 0)?;
//! csis.stream(true, &mut delay)?;
//!
//! // interrupt handler
//! csis.handle_interrupt();
//!
//! // worker thread / task
//! csis.run_deferred();
//! ```
//!
//! # Concurrency
//!
//! All receiver state sits behind `critical-section` cells or atomics, so one
//! instance is shared by reference between the caller, the interrupt handler
//! and the worker. Instances never share state with each other.

#![no_std]
#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(unsafe_op_in_unsafe_fn)]
// Clippy lint levels live here and in the [lints] table of Cargo.toml.
#![deny(clippy::correctness)]
#![warn(
    clippy::suspicious,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::cloned_instead_of_copied,
    clippy::explicit_iter_loop,
    clippy::implicit_clone,
    clippy::inconsistent_struct_constructor,
    clippy::manual_assert,
    clippy::manual_let_else,
    clippy::match_same_arms,
    clippy::needless_pass_by_value,
    clippy::semicolon_if_nothing_returned,
    clippy::uninlined_format_args,
    clippy::unnested_or_patterns,
    clippy::std_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::alloc_instead_of_core
)]
#![allow(
    clippy::mod_module_files,
    clippy::self_named_module_files,
    clippy::similar_names,
    clippy::too_many_arguments,
    clippy::struct_excessive_bools,
    clippy::fn_params_excessive_bools,
    clippy::type_complexity,
    clippy::must_use_candidate,
    clippy::assertions_on_constants,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::panic_in_result_fn,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::items_after_statements,
    clippy::let_underscore_future
)]

// =============================================================================
// Modules
// =============================================================================

pub mod driver;
pub mod frame;
pub mod hal;
pub mod sync;

// Internal implementation details (pub(crate) only)
mod internal;

// Test utilities (only available during testing)
#[cfg(test)]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use driver::config::{
    ChannelConfig, ChannelMode, CsisConfig, FrameRate, ImageFormat, SaturationPolicy, SettleEntry,
    State,
};
pub use driver::csis::Csis;
pub use driver::deferred::Event;
pub use driver::error::{
    ConfigError, ConfigResult, Error, FrameError, FrameResult, Result, StreamError,
};
pub use driver::interrupt::{ChannelErrors, ErrorCategory, ErrorKind, IrqSource};
pub use driver::recovery::Fault;
pub use driver::settle::lookup_settle;
pub use frame::{BufferStatus, CompletedFrame, Frame, FrameManager, FrameState, SharedFrameManager};
pub use hal::{CsisHw, Pipeline};
pub use internal::diagnostics::DiagnosticsSnapshot;

/// Shared receiver constants.
///
/// These are grouped into a dedicated module to keep the top-level facade
/// focused on receiver types.
pub mod constants {
    pub use crate::internal::constants::{
        // Channel layout
        CHANNEL_COUNT,
        // Defaults
        DEFAULT_ERROR_FRAME_LIMIT,
        DEFAULT_FRAMERATE,
        DEFAULT_LANES,
        DEFAULT_MIPI_SPEED,
        // Scheduling
        EVENT_QUEUE_DEPTH,
        // Diagnostics
        LOG_INTERVAL_OF_DROPS,
        MAX_PLANES,
        MAX_PROCESSING_DEPTH,
        WORKER_JOIN_POLL_US,
    };
}

// =============================================================================
// Macro Helpers
// =============================================================================

/// Declare a static, interrupt-safe frame manager.
///
/// Expands to a `SharedFrameManager` static with the given frame count
/// (4 by default). Addresses are registered at runtime through
/// [`SharedFrameManager::with_lock`].
///
/// # Examples
///
/// ```ignore
/// csis_rx::frame_manager_static!(VC0_FRAMES, 8);
///
/// VC0_FRAMES.with_lock(|fm| fm.register(0, &[0x8000_0000]))?;
/// ```
#[macro_export]
macro_rules! frame_manager_static {
    ($name:ident) => {
        $crate::frame_manager_static!($name, 4);
    };
    ($name:ident, $frames:expr) => {
        static $name: $crate::SharedFrameManager<{ $frames }> = $crate::SharedFrameManager::new();
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    frame_manager_static!(DEFAULT_FRAMES);
    frame_manager_static!(EIGHT_FRAMES, 8);

    #[test]
    fn frame_manager_static_capacity() {
        assert_eq!(DEFAULT_FRAMES.with_lock(|fm| fm.capacity()), 4);
        assert_eq!(EIGHT_FRAMES.with_lock(|fm| fm.count(FrameState::Free)), 8);
    }
}
