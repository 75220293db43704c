//! Critical section protected cell
//!
//! Zero-overhead wrapper for data that must only be touched while a
//! critical section is held.

use core::cell::UnsafeCell;

use crate::critical::CriticalSection;

/// A cell whose contents can only be reached with a critical section token.
pub struct CsCell<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    /// Create a new CsCell
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Get a mutable reference to the inner value
    ///
    /// The reference lives no longer than the critical section. Callers must
    /// not nest two borrows of the same cell inside one section.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub fn borrow_mut<'cs>(&'cs self, _cs: CriticalSection<'cs>) -> &'cs mut T {
        unsafe { &mut *self.0.get() }
    }
}
