//! Critical-section cell and async waker storage.

use core::cell::{RefCell, RefMut};
#[cfg(feature = "async")]
use core::task::Waker;

use critical_section::{CriticalSection, Mutex};

/// Cell providing interior mutability with critical section protection.
///
/// Combines `critical_section::Mutex` with `RefCell` so the same value can be
/// mutated from thread context and from the interrupt handler.
pub struct CriticalSectionCell<T> {
    inner: Mutex<RefCell<T>>,
}

impl<T> CriticalSectionCell<T> {
    /// Create a new cell (const, suitable for static initialization).
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(value)),
        }
    }

    /// Execute a closure with exclusive mutable access.
    ///
    /// Interrupts are disabled for the duration of the closure.
    #[inline]
    pub fn with<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            let mut value = self.inner.borrow_ref_mut(cs);
            f(&mut value)
        })
    }

    /// Try to execute a closure, returning `None` if already borrowed.
    #[inline]
    pub fn try_with<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce(&mut T) -> R,
    {
        critical_section::with(|cs| {
            self.inner
                .borrow(cs)
                .try_borrow_mut()
                .ok()
                .map(|mut value| f(&mut value))
        })
    }

    /// Execute a closure with shared access.
    #[inline]
    pub fn with_ref<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        critical_section::with(|cs| {
            let value = self.inner.borrow_ref(cs);
            f(&value)
        })
    }

    /// Borrow mutably inside a critical section the caller already holds.
    ///
    /// Lets several cells be updated atomically under one critical section.
    #[inline]
    pub fn borrow_mut<'cs>(&'cs self, cs: CriticalSection<'cs>) -> RefMut<'cs, T> {
        self.inner.borrow_ref_mut(cs)
    }
}

// SAFETY: every access to the inner value goes through a critical section.
unsafe impl<T: Send> Sync for CriticalSectionCell<T> {}

/// Interrupt-safe waker slot.
///
/// The worker future registers its waker while polling; the interrupt top half
/// (and stream-stop cancellation) wake it.
#[cfg(feature = "async")]
pub struct AtomicWaker {
    waker: CriticalSectionCell<Option<Waker>>,
}

#[cfg(feature = "async")]
impl AtomicWaker {
    /// Create an empty slot (const, suitable for static initialization).
    pub const fn new() -> Self {
        Self {
            waker: CriticalSectionCell::new(None),
        }
    }

    /// Store `waker`, replacing any waker that would not wake the same task.
    pub fn register(&self, waker: &Waker) {
        self.waker.with(|slot| match slot {
            Some(existing) if existing.will_wake(waker) => {}
            _ => *slot = Some(waker.clone()),
        });
    }

    /// Wake and clear the stored waker, if any.
    #[inline]
    pub fn wake(&self) {
        if let Some(waker) = self.waker.with(Option::take) {
            waker.wake();
        }
    }

    /// Whether a waker is currently stored
    pub fn is_registered(&self) -> bool {
        self.waker.with_ref(Option::is_some)
    }
}

#[cfg(feature = "async")]
impl Default for AtomicWaker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::std_instead_of_core, clippy::std_instead_of_alloc)]
mod tests {
    extern crate std;

    use super::*;

    #[test]
    fn with_mutates_and_returns() {
        let cell: CriticalSectionCell<u32> = CriticalSectionCell::new(5);
        let doubled = cell.with(|v| {
            *v += 1;
            *v * 2
        });
        assert_eq!(doubled, 12);
        assert_eq!(cell.with_ref(|v| *v), 6);
    }

    #[test]
    fn try_with_fails_while_borrowed() {
        let cell: CriticalSectionCell<u32> = CriticalSectionCell::new(1);
        let nested = cell.with(|_| cell.try_with(|v| *v));
        assert_eq!(nested, None);
        assert_eq!(cell.try_with(|v| *v), Some(1));
    }

    #[test]
    fn borrow_mut_updates_two_cells_in_one_section() {
        let a: CriticalSectionCell<u32> = CriticalSectionCell::new(0);
        let b: CriticalSectionCell<u32> = CriticalSectionCell::new(0);
        critical_section::with(|cs| {
            let mut a = a.borrow_mut(cs);
            let mut b = b.borrow_mut(cs);
            *a = 3;
            *b = *a + 1;
        });
        assert_eq!(a.with_ref(|v| *v), 3);
        assert_eq!(b.with_ref(|v| *v), 4);
    }

    #[test]
    fn static_cell_usage() {
        static CELL: CriticalSectionCell<[u8; 4]> = CriticalSectionCell::new([0; 4]);
        CELL.with(|v| v[2] = 9);
        assert_eq!(CELL.with_ref(|v| v[2]), 9);
    }

    #[cfg(feature = "async")]
    mod waker {
        extern crate std;
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::task::Wake;

        use super::super::*;

        struct WakeCounter(AtomicUsize);

        impl Wake for WakeCounter {
            fn wake(self: Arc<Self>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn counting_waker() -> (Arc<WakeCounter>, Waker) {
            let counter = Arc::new(WakeCounter(AtomicUsize::new(0)));
            let waker = Waker::from(counter.clone());
            (counter, waker)
        }

        #[test]
        fn new_is_empty() {
            assert!(!AtomicWaker::new().is_registered());
        }

        #[test]
        fn wake_calls_and_clears() {
            let slot = AtomicWaker::new();
            let (counter, waker) = counting_waker();
            slot.register(&waker);
            assert!(slot.is_registered());

            slot.wake();
            slot.wake();
            assert_eq!(counter.0.load(Ordering::SeqCst), 1);
            assert!(!slot.is_registered());
        }

        #[test]
        fn register_replaces_other_task() {
            let slot = AtomicWaker::new();
            let (first, w1) = counting_waker();
            let (second, w2) = counting_waker();
            slot.register(&w1);
            slot.register(&w2);
            slot.wake();
            assert_eq!(first.0.load(Ordering::SeqCst), 0);
            assert_eq!(second.0.load(Ordering::SeqCst), 1);
        }
    }
}
