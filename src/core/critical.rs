//! Critical section handling
//!
//! Thin layer over the `critical-section` crate. The platform (or the
//! `cs-single-core` feature on Cortex-M, or the `std` implementation on a
//! host) supplies the actual acquire/release.

pub use ::critical_section::CriticalSection;

/// Execute a closure inside a critical section
///
/// The closure receives the critical section token, which can be used to
/// access [`CsCell`](crate::core::cs_cell::CsCell) protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}

/// Check if currently executing in an ISR context
#[inline]
pub fn is_isr_context() -> bool {
    #[cfg(target_arch = "arm")]
    {
        use cortex_m::peripheral::scb::VectActive;
        use cortex_m::peripheral::SCB;

        SCB::vect_active() != VectActive::ThreadMode
    }

    #[cfg(not(target_arch = "arm"))]
    {
        false
    }
}
