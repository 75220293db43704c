//! Software timers
//!
//! [`Timer`] owns one kernel timer, its callback and a mirrored "started"
//! flag. Lifecycle:
//!
//! ```text
//! Unbound <- construction failed / moved out / deleted
//!    |
//! Inactive <-> Running      (start, stop, reset, change_period)
//!    |
//! quiescing                 (delete accepted, polling until inactive)
//!    |
//! released                  (slot back in the pool)
//! ```
//!
//! The kernel's identity pointer refers to the timer's pool slot rather
//! than to the `Timer` value, so moving a `Timer` never leaves the kernel
//! with a stale back-pointer.

mod allocator;

pub use allocator::{StaticTimerAllocator, TimerCallback, TimerSlot, TimerSlots};

use alloc::boxed::Box;
use core::mem;
use core::ptr::NonNull;

use crate::config::CFG_MAX_STATIC_TIMERS;
use crate::critical::is_isr_context;
use crate::error::{OsError, OsResult};
use crate::mem::pool::Pool;
use crate::port::{TimerCommand, TimerPort};
use crate::time::{ms_to_ticks, ticks_to_ms};
use crate::types::{OsTick, TimerMode, TimerState, OS_WAIT_FOREVER};

/// Fixed-capacity pool of timer slots for kernel `K`
pub type TimerPool<K, const N: usize> = Pool<TimerSlot<K>, N>;

/// Timer pool sized by [`CFG_MAX_STATIC_TIMERS`]
pub type DefaultTimerPool<K> = TimerPool<K, CFG_MAX_STATIC_TIMERS>;

/// Kernel binding of a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binding<H> {
    /// No kernel object
    #[default]
    Unbound,
    /// Live kernel object
    Bound(H),
}

impl<H: Copy> Binding<H> {
    #[inline]
    pub fn handle(&self) -> OsResult<H> {
        match *self {
            Binding::Bound(handle) => Ok(handle),
            Binding::Unbound => Err(OsError::Unbound),
        }
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        matches!(self, Binding::Bound(_))
    }

    /// Move the binding out, leaving `Unbound` behind
    #[inline]
    pub fn take(&mut self) -> Self {
        mem::take(self)
    }
}

/// Expiry entry point registered with the kernel
///
/// Runs on the timer service thread. Takes no lock: teardown guarantees
/// the slot outlives every dispatch by waiting for the kernel to report
/// the timer inactive.
fn trampoline<K: TimerPort>(kernel: &K, handle: K::Handle) {
    let slot = kernel.timer_id(handle).cast::<TimerSlot<K>>();
    if let Some(slot) = NonNull::new(slot) {
        unsafe { TimerSlot::invoke(slot) }
    }
}

/// Kernel software timer backed by a pool slot
pub struct Timer<K: TimerPort + 'static> {
    kernel: &'static K,
    allocator: StaticTimerAllocator<K>,
    binding: Binding<K::Handle>,
    started: bool,
}

impl<K: TimerPort + 'static> Timer<K> {
    /// Create a timer
    ///
    /// Never fails: if the pool is exhausted or the kernel refuses the
    /// timer, the result is an inert `Unbound` timer whose operations all
    /// return `Err(OsError::Unbound)`. Use [`try_new`](Self::try_new) to
    /// get the reason instead.
    ///
    /// # Arguments
    /// * `kernel` - Timer service to create the timer in
    /// * `pool` - Slot pool backing the kernel object
    /// * `name` - Timer name for debugging
    /// * `period` - Period in ticks (non-zero)
    /// * `mode` - One-shot or auto-reload
    /// * `callback` - Run on the timer service thread on every expiry
    pub fn new<F>(
        kernel: &'static K,
        pool: &'static TimerSlots<K>,
        name: &'static str,
        period: OsTick,
        mode: TimerMode,
        callback: F,
    ) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let mut timer = Self::unbound(kernel, pool);
        if let Err(_err) = timer.bind(name, period, mode, Box::new(callback)) {
            warn!("timer '{=str}': left unbound: {}", name, _err);
        }
        timer
    }

    /// Create a timer, reporting why construction failed
    ///
    /// # Returns
    /// * `Ok(timer)` - Bound, inactive timer
    /// * `Err(OsError::CreateIsr)` - Called from interrupt context
    /// * `Err(OsError::TmrInvalidPeriod)` - `period` is zero
    /// * `Err(OsError::PoolExhausted)` - No free slot in `pool`
    /// * `Err(OsError::KernelRejected)` - Kernel refused the timer
    pub fn try_new<F>(
        kernel: &'static K,
        pool: &'static TimerSlots<K>,
        name: &'static str,
        period: OsTick,
        mode: TimerMode,
        callback: F,
    ) -> OsResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let mut timer = Self::unbound(kernel, pool);
        timer.bind(name, period, mode, Box::new(callback))?;
        Ok(timer)
    }

    /// A timer with no kernel object
    pub const fn unbound(kernel: &'static K, pool: &'static TimerSlots<K>) -> Self {
        Timer {
            kernel,
            allocator: StaticTimerAllocator::new(pool),
            binding: Binding::Unbound,
            started: false,
        }
    }

    fn bind(
        &mut self,
        name: &'static str,
        period: OsTick,
        mode: TimerMode,
        callback: TimerCallback,
    ) -> OsResult<()> {
        if is_isr_context() {
            return Err(OsError::CreateIsr);
        }
        if period == 0 {
            return Err(OsError::TmrInvalidPeriod);
        }

        let handle = unsafe {
            self.allocator
                .create(self.kernel, name, period, mode, callback, trampoline::<K>)?
        };
        self.binding = Binding::Bound(handle);
        self.started = false;

        debug!("timer '{=str}': bound, period {=u32}", name, period);
        Ok(())
    }

    // ============ Commands ============

    fn command(&self, command: TimerCommand, wait: OsTick) -> OsResult<()> {
        let handle = self.binding.handle()?;
        if self.kernel.send_command(handle, command, wait) {
            Ok(())
        } else {
            error!("timer: kernel rejected {}", command);
            Err(OsError::KernelRejected)
        }
    }

    fn command_from_isr(&self, command: TimerCommand) -> OsResult<bool> {
        let handle = self.binding.handle()?;
        self.kernel
            .send_command_from_isr(handle, command)
            .ok_or(OsError::KernelRejected)
    }

    /// Start the timer
    ///
    /// `wait` bounds how long the call may block enqueueing the command,
    /// not how long until the timer service executes it.
    pub fn start(&mut self, wait: OsTick) -> OsResult<()> {
        self.command(TimerCommand::Start, wait)?;
        self.started = true;
        Ok(())
    }

    /// Stop the timer
    pub fn stop(&mut self, wait: OsTick) -> OsResult<()> {
        self.command(TimerCommand::Stop, wait)?;
        self.started = false;
        Ok(())
    }

    /// Restart the countdown from now; starts a dormant timer
    pub fn reset(&mut self, wait: OsTick) -> OsResult<()> {
        self.command(TimerCommand::Reset, wait)?;
        self.started = true;
        Ok(())
    }

    /// Change the period; starts a dormant timer
    pub fn change_period(&mut self, period: OsTick, wait: OsTick) -> OsResult<()> {
        if period == 0 {
            return Err(OsError::TmrInvalidPeriod);
        }
        self.command(TimerCommand::ChangePeriod(period), wait)?;
        self.started = true;
        Ok(())
    }

    /// [`change_period`](Self::change_period) with both durations in
    /// milliseconds
    ///
    /// Periods shorter than one tick are rejected with `TmrInvalidPeriod`.
    pub fn change_period_ms(&mut self, period_ms: u32, wait_ms: u32) -> OsResult<()> {
        self.change_period(ms_to_ticks(period_ms), ms_to_ticks(wait_ms))
    }

    /// [`start`](Self::start) from interrupt context
    ///
    /// Returns whether a higher priority task was woken.
    pub fn start_from_isr(&mut self) -> OsResult<bool> {
        let woken = self.command_from_isr(TimerCommand::Start)?;
        self.started = true;
        Ok(woken)
    }

    /// [`stop`](Self::stop) from interrupt context
    pub fn stop_from_isr(&mut self) -> OsResult<bool> {
        let woken = self.command_from_isr(TimerCommand::Stop)?;
        self.started = false;
        Ok(woken)
    }

    /// [`reset`](Self::reset) from interrupt context
    pub fn reset_from_isr(&mut self) -> OsResult<bool> {
        let woken = self.command_from_isr(TimerCommand::Reset)?;
        self.started = true;
        Ok(woken)
    }

    /// [`change_period`](Self::change_period) from interrupt context
    pub fn change_period_from_isr(&mut self, period: OsTick) -> OsResult<bool> {
        if period == 0 {
            return Err(OsError::TmrInvalidPeriod);
        }
        let woken = self.command_from_isr(TimerCommand::ChangePeriod(period))?;
        self.started = true;
        Ok(woken)
    }

    // ============ Queries ============

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.binding.is_bound()
    }

    /// Kernel handle, if bound
    #[inline]
    pub fn handle(&self) -> Option<K::Handle> {
        self.binding.handle().ok()
    }

    /// Wrapper-side mirror of the last successful start/stop
    #[inline(always)]
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Ask the kernel whether the timer is active
    pub fn is_running(&self) -> bool {
        self.binding
            .handle()
            .map_or(false, |handle| self.kernel.is_active(handle))
    }

    pub fn state(&self) -> TimerState {
        match self.binding {
            Binding::Unbound => TimerState::Unbound,
            Binding::Bound(handle) if self.kernel.is_active(handle) => TimerState::Running,
            Binding::Bound(_) => TimerState::Inactive,
        }
    }

    pub fn period(&self) -> OsResult<OsTick> {
        Ok(self.kernel.period(self.binding.handle()?))
    }

    pub fn name(&self) -> OsResult<&'static str> {
        Ok(self.kernel.name(self.binding.handle()?))
    }

    pub fn mode(&self) -> OsResult<TimerMode> {
        Ok(self.kernel.mode(self.binding.handle()?))
    }

    pub fn set_mode(&mut self, mode: TimerMode) -> OsResult<()> {
        self.kernel.set_mode(self.binding.handle()?, mode);
        Ok(())
    }

    /// Ticks until the next expiry
    pub fn remaining_ticks(&self) -> OsResult<OsTick> {
        let handle = self.binding.handle()?;
        Ok(self
            .kernel
            .expiry_time(handle)
            .wrapping_sub(self.kernel.tick_count()))
    }

    pub fn period_ms(&self) -> OsResult<u64> {
        self.period().map(ticks_to_ms)
    }

    /// Milliseconds until the next expiry, rounded down
    pub fn remaining_ms(&self) -> OsResult<u64> {
        self.remaining_ticks().map(ticks_to_ms)
    }

    // ============ Ownership ============

    /// Move the kernel binding, callback and started flag into a new timer
    ///
    /// `self` is left `Unbound`. The kernel identity is the pool slot,
    /// which moves along untouched, so no kernel call is made.
    pub fn take(&mut self) -> Self {
        let pool = self.allocator.pool();
        Timer {
            kernel: self.kernel,
            allocator: mem::replace(&mut self.allocator, StaticTimerAllocator::new(pool)),
            binding: self.binding.take(),
            started: mem::take(&mut self.started),
        }
    }

    /// Replace this timer with `src`, leaving `src` `Unbound`
    ///
    /// The current kernel object is deleted first (blocking until the
    /// kernel confirms it inactive). If the kernel refuses the delete,
    /// `self` ends up `Unbound`, `src` is left untouched and
    /// `Err(OsError::KernelRejected)` is returned.
    pub fn assign(&mut self, src: &mut Self) -> OsResult<()> {
        self.teardown()?;

        mem::swap(&mut self.kernel, &mut src.kernel);
        mem::swap(&mut self.allocator, &mut src.allocator);
        mem::swap(&mut self.binding, &mut src.binding);
        self.started = mem::take(&mut src.started);
        Ok(())
    }

    /// Delete the kernel object now, leaving the timer `Unbound`
    ///
    /// Blocks until the kernel confirms the timer inactive. Does nothing on
    /// an unbound timer.
    pub fn delete(&mut self) -> OsResult<()> {
        self.teardown()
    }

    // ============ Teardown ============

    fn teardown(&mut self) -> OsResult<()> {
        let Binding::Bound(handle) = self.binding.take() else {
            return Ok(());
        };
        self.started = false;

        if !self.kernel.send_command(handle, TimerCommand::Delete, OS_WAIT_FOREVER) {
            // The kernel may still reach the slot; keep it and its callback alive.
            error!("timer: delete rejected, slot leaked");
            self.allocator.leak();
            return Err(OsError::KernelRejected);
        }

        let _polls = self.quiesce(handle);
        trace!("timer: quiesced after {=u32} polls", _polls);

        self.allocator.release();
        debug!("timer: deleted");
        Ok(())
    }

    fn poll_quiesced(&self, handle: K::Handle) -> OsResult<()> {
        if self.kernel.is_active(handle) {
            Err(OsError::TeardownIncomplete)
        } else {
            Ok(())
        }
    }

    /// Wait until no callback can be in flight
    ///
    /// Deletion is processed asynchronously by the timer service, so an
    /// accepted delete does not mean the trampoline is done with the slot.
    /// Not interruptible.
    fn quiesce(&self, handle: K::Handle) -> u32 {
        let mut polls: u32 = 0;
        while self.poll_quiesced(handle).is_err() {
            polls = polls.wrapping_add(1);
            self.kernel.yield_now();
        }
        polls
    }
}

impl<K: TimerPort + 'static> Drop for Timer<K> {
    fn drop(&mut self) {
        if let Err(_err) = self.teardown() {
            error!("timer: teardown failed: {}", _err);
        }
    }
}
