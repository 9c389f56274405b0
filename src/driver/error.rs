//! Error types for the CSIS receiver core
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Channel binding and format configuration failures
//! - [`FrameError`]: Frame manager contract violations
//! - [`StreamError`]: Stream lifecycle misuse
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by most driver methods.

// =============================================================================
// Configuration Errors
// =============================================================================

/// Channel binding and configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Virtual channel index out of range
    InvalidChannel,
    /// Zero width/height or unsupported geometry
    InvalidFormat,
    /// Time-per-frame numerator of zero
    InvalidFrameRate,
    /// Operation requires an externally-queued channel
    InternalChannel,
    /// Bindings cannot change while streaming
    BindingLocked,
    /// Channel has no frame manager bound
    NotBound,
    /// Virtual channel 0 is always externally queued
    ChannelZeroInternal,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::InvalidChannel => "invalid virtual channel",
            ConfigError::InvalidFormat => "invalid image format",
            ConfigError::InvalidFrameRate => "invalid frame rate",
            ConfigError::InternalChannel => "channel is internally ring-buffered",
            ConfigError::BindingLocked => "channel binding locked while streaming",
            ConfigError::NotBound => "channel not bound",
            ConfigError::ChannelZeroInternal => "virtual channel 0 cannot be internal",
        }
    }
}

// =============================================================================
// Frame Errors
// =============================================================================

/// Frame manager errors
///
/// `NotResident` and `Inconsistent` mean the buffer bookkeeping can no longer
/// be trusted; the driver converts them into a controlled stop of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Frame index outside the manager's capacity
    InvalidIndex,
    /// Frame is not in the queue its state claims
    NotResident,
    /// Frame is in the wrong state for the requested operation
    InvalidState,
    /// Queue depth and queue contents disagree
    Inconsistent,
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FrameError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FrameError::InvalidIndex => "frame index out of range",
            FrameError::NotResident => "frame not resident in its queue",
            FrameError::InvalidState => "frame in wrong state",
            FrameError::Inconsistent => "frame bookkeeping inconsistent",
        }
    }

    /// Whether the error means the manager's state can no longer be trusted
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, FrameError::NotResident | FrameError::Inconsistent)
    }
}

// =============================================================================
// Stream Errors
// =============================================================================

/// Stream lifecycle errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError {
    /// Receiver has not been opened
    NotOpen,
    /// Receiver is already open
    AlreadyOpen,
    /// Stream is already started
    AlreadyStarted,
    /// Stream is already stopped
    AlreadyStopped,
    /// Operation not allowed while streaming
    StillStreaming,
    /// Receiver was stopped by a hard fault
    Faulted,
    /// Another start or stop is in progress
    Busy,
}

impl core::fmt::Display for StreamError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StreamError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StreamError::NotOpen => "not open",
            StreamError::AlreadyOpen => "already open",
            StreamError::AlreadyStarted => "already started",
            StreamError::AlreadyStopped => "already stopped",
            StreamError::StillStreaming => "still streaming",
            StreamError::Faulted => "receiver faulted",
            StreamError::Busy => "stream transition in progress",
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// ```ignore
/// match csis.stream(true) {
///     Err(Error::Stream(StreamError::AlreadyStarted)) => { /* ... */ }
///     Err(Error::Frame(e)) if e.is_fatal() => { /* ... */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// Frame manager error
    Frame(FrameError),
    /// Stream lifecycle error
    Stream(StreamError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::Frame(e) => write!(f, "frame: {}", e.as_str()),
            Error::Stream(e) => write!(f, "stream: {}", e.as_str()),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<FrameError> for Error {
    fn from(e: FrameError) -> Self {
        Error::Frame(e)
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        Error::Stream(e)
    }
}

/// Result type alias for receiver operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for frame manager operations
pub type FrameResult<T> = core::result::Result<T, FrameError>;

// =============================================================================
// Unit Tests
// =============================================================================
