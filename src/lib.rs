//! Ownership wrappers for RTOS kernel objects
//!
//! Provides:
//! - A fixed-capacity, critical-section guarded object pool for static
//!   kernel object storage
//! - Software timers bound to pool slots, with blocking teardown and
//!   move-safe kernel bindings
//! - A periodic task driver built on the task collaborator
//!
//! The kernel itself is consumed through the traits in [`port`]; on
//! non-ARM targets [`port::sim`] provides a simulated timer service.

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

extern crate alloc;

// ============ Critical Section ============

#[cfg(all(target_arch = "arm", feature = "cs-single-core"))]
mod cs_impl {
    use cortex_m::interrupt;
    use cortex_m::register::primask;
    use critical_section::{set_impl, Impl, RawRestoreState};

    struct SingleCoreCriticalSection;
    set_impl!(SingleCoreCriticalSection);

    unsafe impl Impl for SingleCoreCriticalSection {
        unsafe fn acquire() -> RawRestoreState {
            let was_active = primask::read().is_active();
            interrupt::disable();
            was_active
        }

        unsafe fn release(was_active: RawRestoreState) {
            if was_active {
                unsafe { interrupt::enable() }
            }
        }
    }
}

// ============ Modules ============

#[macro_use]
mod log;

pub mod core;
pub mod mem;
pub mod port;

#[cfg(feature = "timer")]
pub mod timer;
#[cfg(feature = "periodic")]
pub mod task;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult};
pub use crate::core::time;
pub use crate::core::types;
pub use crate::core::types::*;

pub use mem::pool::{Pool, SlotAllocator};
pub use port::{TaskPort, TimerCommand, TimerPort};

#[cfg(feature = "timer")]
pub use timer::{DefaultTimerPool, Timer, TimerPool};
#[cfg(feature = "periodic")]
pub use task::periodic::{PeriodicTask, WaitMode};
