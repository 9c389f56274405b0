//! Configuration types for the CSIS receiver

use crate::internal::constants::{
    DEFAULT_ERROR_FRAME_LIMIT, DEFAULT_FRAMERATE, DEFAULT_LANES, DEFAULT_MIPI_SPEED,
};

/// How a virtual channel gets its buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelMode {
    /// Buffers are submitted one at a time and armed every frame
    #[default]
    External,
    /// A closed ring of slots is committed to hardware at stream start
    Internal,
}

/// What to do when the DMA fabric reports saturation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SaturationPolicy {
    /// Abort outstanding DMA, log, keep streaming
    #[default]
    LogAndContinue,
    /// Abort outstanding DMA, then stop the receiver and latch a fault
    Escalate,
}

/// Image geometry and pixel code of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ImageFormat {
    /// Width in pixels
    pub width: u32,
    /// Height in lines
    pub height: u32,
    /// Bus pixel code, passed through to the hardware unchanged
    pub pixel_format: u32,
}

impl ImageFormat {
    /// Create a format
    #[must_use]
    pub const fn new(width: u32, height: u32, pixel_format: u32) -> Self {
        Self {
            width,
            height,
            pixel_format,
        }
    }

    /// Whether both dimensions are non-zero
    #[inline]
    pub const fn has_size(&self) -> bool {
        self.width != 0 && self.height != 0
    }
}

/// Time per frame as a fraction of a second (`numerator / denominator` s)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FrameRate {
    /// Seconds numerator
    pub numerator: u32,
    /// Seconds denominator
    pub denominator: u32,
}

impl FrameRate {
    /// Create a time-per-frame value
    #[must_use]
    pub const fn new(numerator: u32, denominator: u32) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Whole frames per second, `None` for a zero numerator
    pub const fn fps(&self) -> Option<u32> {
        if self.numerator == 0 {
            None
        } else {
            Some(self.denominator / self.numerator)
        }
    }
}

/// Per-channel binding parameters for channels 1-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelConfig {
    /// Buffer supply mode
    pub mode: ChannelMode,
    /// Own geometry; `None` inherits channel 0's
    pub format: Option<ImageFormat>,
}

impl ChannelConfig {
    /// Externally-queued channel inheriting channel 0's geometry
    #[must_use]
    pub const fn external() -> Self {
        Self {
            mode: ChannelMode::External,
            format: None,
        }
    }

    /// Internal ring channel inheriting channel 0's geometry
    #[must_use]
    pub const fn internal() -> Self {
        Self {
            mode: ChannelMode::Internal,
            format: None,
        }
    }

    /// Give the channel its own geometry
    #[must_use]
    pub const fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = Some(format);
        self
    }
}

/// One row of the sensor's settle-time table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SettleEntry {
    /// Width in pixels
    pub width: u32,
    /// Height in lines
    pub height: u32,
    /// Frames per second
    pub framerate: u32,
    /// Settle value to program
    pub settle: u32,
}

impl SettleEntry {
    /// Create a table row
    pub const fn new(width: u32, height: u32, framerate: u32, settle: u32) -> Self {
        Self {
            width,
            height,
            framerate,
            settle,
        }
    }
}

/// Complete receiver configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CsisConfig {
    /// Number of active data lanes
    pub lanes: u8,
    /// Link speed selector handed to `set_lanes`
    pub mipi_speed: u32,
    /// Settle-time table of the attached sensor
    pub settle_table: &'static [SettleEntry],
    /// DMA-fabric saturation handling
    pub saturation_policy: SaturationPolicy,
    /// Accept stream requests without touching hardware
    pub dummy: bool,
    /// Whether this receiver writes frames to memory
    pub dma_capable: bool,
    /// Consecutive corrupted frame ends before the receiver is stopped.
    /// 0 disables the check.
    pub error_frame_limit: u32,
}

impl Default for CsisConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CsisConfig {
    /// Create a new configuration with defaults
    #[must_use]
    pub const fn new() -> Self {
        Self {
            lanes: DEFAULT_LANES,
            mipi_speed: DEFAULT_MIPI_SPEED,
            settle_table: &[],
            saturation_policy: SaturationPolicy::LogAndContinue,
            dummy: false,
            dma_capable: true,
            error_frame_limit: DEFAULT_ERROR_FRAME_LIMIT,
        }
    }

    // =========================================================================
    // Builder Methods
    // =========================================================================

    /// Set the number of data lanes
    #[must_use]
    pub const fn with_lanes(mut self, lanes: u8) -> Self {
        self.lanes = lanes;
        self
    }

    /// Set the link speed selector
    #[must_use]
    pub const fn with_mipi_speed(mut self, mipi_speed: u32) -> Self {
        self.mipi_speed = mipi_speed;
        self
    }

    /// Set the settle-time table
    #[must_use]
    pub const fn with_settle_table(mut self, table: &'static [SettleEntry]) -> Self {
        self.settle_table = table;
        self
    }

    /// Set the DMA-fabric saturation policy
    #[must_use]
    pub const fn with_saturation_policy(mut self, policy: SaturationPolicy) -> Self {
        self.saturation_policy = policy;
        self
    }

    /// Make this a dummy receiver
    #[must_use]
    pub const fn with_dummy(mut self, dummy: bool) -> Self {
        self.dummy = dummy;
        self
    }

    /// Enable or disable write-to-memory support
    #[must_use]
    pub const fn with_dma(mut self, enabled: bool) -> Self {
        self.dma_capable = enabled;
        self
    }

    /// Set how many corrupted frames in a row stop the receiver (0 = never)
    #[must_use]
    pub const fn with_error_frame_limit(mut self, limit: u32) -> Self {
        self.error_frame_limit = limit;
        self
    }
}

/// Stream parameters changed by `set_format`/`set_framerate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) struct StreamParams {
    pub(crate) format: ImageFormat,
    pub(crate) framerate: u32,
}

impl StreamParams {
    pub(crate) const fn new() -> Self {
        Self {
            format: ImageFormat::new(0, 0, 0),
            framerate: DEFAULT_FRAMERATE,
        }
    }
}

/// Receiver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum State {
    /// No frame manager bound
    #[default]
    Closed,
    /// Open, hardware idle
    Configured,
    /// Stream start in progress
    Starting,
    /// Hardware receiving
    Streaming,
    /// Stream stop in progress
    Stopping,
}

// =============================================================================
// Unit Tests
// =============================================================================
