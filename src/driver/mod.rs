//! Core driver components for the CSIS receiver.
//!
//! This module contains the building blocks for scheduling frame buffers on
//! a multi-channel receive link:
//!
//! - [`config`] - Configuration types and builder patterns
//! - [`error`] - Error types and result aliases
//! - [`csis`] - The main receiver and its caller-facing operations
//! - [`interrupt`] - Interrupt sources, error classification, top half
//! - [`deferred`] - Deferred work queue and worker body
//! - [`recovery`] - Receiver error handling and channel faults
//! - [`settle`] - Settle-time lookup
//!
//! # Example
//!
//! ```ignore
//! use csis_rx::driver::{CsisConfig, SaturationPolicy};
//!
//! let config = CsisConfig::new()
//!     .with_lanes(2)
//!     .with_saturation_policy(SaturationPolicy::Escalate);
//! ```

// Submodules
pub mod config;
pub mod csis;
pub mod deferred;
pub mod error;
pub mod interrupt;
pub mod recovery;
pub mod settle;

mod channel;
mod dma;
mod ring;

// Re-exports for convenience
pub use config::{
    ChannelConfig, ChannelMode, CsisConfig, FrameRate, ImageFormat, SaturationPolicy, SettleEntry,
    State,
};
pub use csis::Csis;
pub use deferred::Event;
pub use error::{
    ConfigError, ConfigResult, Error, FrameError, FrameResult, Result, StreamError,
};
pub use interrupt::{ChannelErrors, ErrorCategory, ErrorKind, IrqSource};
pub use recovery::Fault;
pub use settle::lookup_settle;
