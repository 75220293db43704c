//! Core type definitions
//!
//! These types provide strong typing for kernel object state.

/// Tick counter type
pub type OsTick = u32;

/// Task notification value
pub type OsNotifyValue = u32;

/// Longest wait budget a kernel command may block for
pub const OS_WAIT_FOREVER: OsTick = OsTick::MAX;

/// Don't block at all when posting a kernel command
pub const OS_NO_WAIT: OsTick = 0;

/// Software timer reload behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TimerMode {
    /// Fire once per start, then go dormant
    OneShot = 0,
    /// Re-arm with the same period after every expiry
    AutoReload = 1,
}

impl TimerMode {
    #[inline]
    pub fn is_auto_reload(self) -> bool {
        self == TimerMode::AutoReload
    }
}

impl From<bool> for TimerMode {
    #[inline]
    fn from(auto_reload: bool) -> Self {
        if auto_reload {
            TimerMode::AutoReload
        } else {
            TimerMode::OneShot
        }
    }
}

/// Observable lifecycle state of a timer
///
/// The transient "quiescing" phase between a delete request and the
/// kernel confirming inactivity is never observable from outside: it is
/// resolved before teardown returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum TimerState {
    /// No kernel object is bound
    Unbound = 0,
    /// Bound, not counting down
    Inactive = 1,
    /// Bound and counting down
    Running = 2,
}
