//! Interrupt-safe synchronization primitives.
//!
//! - [`CriticalSectionCell`]: `critical_section::Mutex<RefCell<T>>` wrapper used
//!   for every frame manager, the channel state table and the event queue
//! - [`AtomicWaker`] (`async` feature): wakes the deferred-work future from the
//!   interrupt top half
//!
//! The interrupt path and the buffer-submission path both take the same
//! critical section, so neither can observe the other's half-finished update.

mod primitives;

#[cfg(feature = "async")]
pub use primitives::AtomicWaker;
pub use primitives::CriticalSectionCell;
