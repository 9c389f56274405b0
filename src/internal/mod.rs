//! Internal Implementation Details
//!
//! This module contains implementation details that are not part of the public API.
//!
//! # Contents
//!
//! - [`constants`]: Channel layout, scheduling and diagnostic constants
//! - [`diagnostics`]: Relaxed-atomic counters and log rate limiting
//! - `fmt`: `defmt`-backed logging macros
//!
//! # Stability
//!
//! **WARNING:** This module is `pub(crate)` only. Items re-exported from the
//! crate root are the supported surface.

pub(crate) mod constants;
pub(crate) mod diagnostics;
pub(crate) mod fmt;
