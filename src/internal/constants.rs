//! Centralized Constants
//!
//! Single source of truth for the magic numbers used by the receiver core.
//!
//! # Organization
//!
//! - **Channel layout**: virtual channel count, image planes
//! - **Scheduling**: DMA depth, deferred event queue sizing
//! - **Defaults**: frame rate, lanes, error frame limit
//! - **Diagnostics**: log rate limiting
//!
//! Hardware register layouts are owned by the platform's [`CsisHw`]
//! implementation and are intentionally absent here.
//!
//! [`CsisHw`]: crate::hal::CsisHw

// =============================================================================
// Channel Layout
// =============================================================================

/// Number of virtual channels multiplexed on one receive link
pub const CHANNEL_COUNT: usize = 4;

/// Maximum number of image planes per frame buffer
pub const MAX_PLANES: usize = 4;

// =============================================================================
// Scheduling
// =============================================================================

/// Processing depth at which the arm pass stops arming new buffers.
///
/// One buffer is being written by hardware, the other is latched for the
/// next frame. Reaching this depth means a completion is overdue.
pub const MAX_PROCESSING_DEPTH: usize = 2;

/// Capacity of the deferred event queue between top half and worker
pub const EVENT_QUEUE_DEPTH: usize = 16;

/// Back-off between in-flight polls while joining the deferred worker (µs)
pub const WORKER_JOIN_POLL_US: u32 = 50;

// =============================================================================
// Defaults
// =============================================================================

/// Frame rate assumed until the caller sets one (frames per second)
pub const DEFAULT_FRAMERATE: u32 = 30;

/// Default number of data lanes
pub const DEFAULT_LANES: u8 = 4;

/// Default per-lane MIPI speed in Mbps (0 = let the platform decide)
pub const DEFAULT_MIPI_SPEED: u32 = 0;

/// Consecutive corrupted frame ends that stop the receiver (0 = never)
pub const DEFAULT_ERROR_FRAME_LIMIT: u32 = 10;

// =============================================================================
// Diagnostics
// =============================================================================

/// Repeating conditions log the first N occurrences, then every Nth
pub const LOG_INTERVAL_OF_DROPS: u32 = 30;
