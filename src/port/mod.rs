//! Port layer - the kernel surface consumed by the wrappers
//!
//! The wrappers never talk to a scheduler directly. A port supplies the
//! timer command API ([`TimerPort`]) and the task primitives used by the
//! periodic driver ([`TaskPort`]). On non-ARM targets [`sim`] provides a
//! simulated timer service for host testing.

use core::ptr::NonNull;

use crate::types::{OsNotifyValue, OsTick, TimerMode};

/// Commands posted to the timer service queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerCommand {
    /// Arm the timer, expiring one period from now
    Start,
    /// Disarm the timer
    Stop,
    /// Re-arm the timer, expiring one period from now
    Reset,
    /// Change the period and re-arm
    ChangePeriod(OsTick),
    /// Delete the kernel object
    Delete,
}

/// Software timer service of the kernel
///
/// Handles are opaque. The kernel stores an identity pointer per timer and
/// hands the handle to the registered callback on expiry; the callback
/// runs on the timer service thread.
///
/// # Quiescence
/// [`is_active`](TimerPort::is_active) must keep returning `true` while an
/// expiry callback for the timer is being dispatched, and while a command
/// posted for the timer is still waiting in the service queue. Teardown
/// relies on this to know when the backing storage may be reused.
pub trait TimerPort: Sync {
    /// Opaque kernel timer handle
    type Handle: Copy + Eq + Send;

    /// Backing storage block for a statically created timer
    type Storage: Send;

    /// Create a timer in caller-provided storage
    ///
    /// Returns `None` if the kernel rejects the parameters.
    ///
    /// # Safety
    /// `storage` must be valid for writes and exclusively lent to the kernel
    /// until the timer has been deleted and `is_active` has reported `false`.
    /// `id` must stay valid for `callback` for the same span.
    unsafe fn create_static(
        &self,
        name: &'static str,
        period: OsTick,
        mode: TimerMode,
        id: *mut (),
        callback: fn(&Self, Self::Handle),
        storage: NonNull<Self::Storage>,
    ) -> Option<Self::Handle>;

    /// Post a command, blocking at most `wait` ticks for queue space
    ///
    /// The budget bounds the enqueue only, not command execution.
    fn send_command(&self, timer: Self::Handle, command: TimerCommand, wait: OsTick) -> bool;

    /// Post a command from interrupt context
    ///
    /// Returns `None` if the command was not queued, otherwise whether a
    /// higher priority task was woken.
    fn send_command_from_isr(&self, timer: Self::Handle, command: TimerCommand) -> Option<bool>;

    /// Is the timer armed (or not yet quiesced, see above)
    fn is_active(&self, timer: Self::Handle) -> bool;

    /// Identity pointer stored at creation
    fn timer_id(&self, timer: Self::Handle) -> *mut ();

    fn period(&self, timer: Self::Handle) -> OsTick;

    fn name(&self, timer: Self::Handle) -> &'static str;

    fn mode(&self, timer: Self::Handle) -> TimerMode;

    fn set_mode(&self, timer: Self::Handle, mode: TimerMode);

    /// Tick at which the timer next expires
    fn expiry_time(&self, timer: Self::Handle) -> OsTick;

    /// Current kernel tick count
    fn tick_count(&self) -> OsTick;

    /// Give up the processor so the timer service can run
    fn yield_now(&self);
}

/// Task primitives used by the periodic driver
pub trait TaskPort {
    /// Has the task neither been terminated nor exited
    fn is_running(&self) -> bool;

    /// Block the calling task for `ticks`
    fn delay(&self, ticks: OsTick);

    /// Block until notified or `ticks` elapse
    ///
    /// Returns the notification value, or `None` on timeout or abort.
    fn notify_wait(&self, ticks: OsTick) -> Option<OsNotifyValue>;

    /// Send a notification to the task
    fn notify(&self, value: OsNotifyValue) -> bool;

    /// Cut a pending delay or notification wait short
    ///
    /// An abort that arrives before the task starts waiting must end its
    /// next wait, otherwise a terminate racing the loop check is lost.
    fn abort_delay(&self) -> bool;

    /// Mark the task as terminated; `is_running` turns false
    fn terminate(&self);
}

impl<T: TaskPort + ?Sized> TaskPort for &T {
    #[inline]
    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    #[inline]
    fn delay(&self, ticks: OsTick) {
        (**self).delay(ticks)
    }

    #[inline]
    fn notify_wait(&self, ticks: OsTick) -> Option<OsNotifyValue> {
        (**self).notify_wait(ticks)
    }

    #[inline]
    fn notify(&self, value: OsNotifyValue) -> bool {
        (**self).notify(value)
    }

    #[inline]
    fn abort_delay(&self) -> bool {
        (**self).abort_delay()
    }

    #[inline]
    fn terminate(&self) {
        (**self).terminate()
    }
}

#[cfg(not(target_arch = "arm"))]
pub mod sim;
