//! Periodic task driver
//!
//! Runs `on_start` once, then alternates "wait one period" and the
//! periodic routine until the task stops running, then runs `on_stop`
//! once. [`PeriodicTask::run`] is the task body; the kernel task that
//! executes it is whatever the [`TaskPort`] stands for.

use alloc::boxed::Box;
use core::cell::UnsafeCell;

use portable_atomic::{AtomicBool, Ordering};

use crate::error::{OsError, OsResult};
use crate::port::TaskPort;
use crate::types::{OsNotifyValue, OsTick};

/// Hook run by the driver on the task's own thread
pub type TaskHook = Box<dyn FnMut() + Send + 'static>;

/// How the driver waits out a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WaitMode {
    /// Block on the task notification; a notification ends the period early
    #[default]
    Notify,
    /// Plain timed delay
    Sleep,
}

struct Hooks {
    on_start: TaskHook,
    on_stop: TaskHook,
    routine: TaskHook,
}

/// Repeat loop bound to one task
pub struct PeriodicTask<T: TaskPort> {
    task: T,
    period: OsTick,
    wait_mode: WaitMode,
    /// Only touched by the thread that won `executing`
    hooks: UnsafeCell<Hooks>,
    executing: AtomicBool,
}

// The hooks are only reached through `run`, which admits one caller at a time.
unsafe impl<T: TaskPort + Sync> Sync for PeriodicTask<T> {}

impl<T: TaskPort> PeriodicTask<T> {
    /// Create a driver
    ///
    /// A zero `period` runs the routine back to back without waiting.
    pub fn new<S, P, R>(task: T, period: OsTick, on_start: S, on_stop: P, routine: R) -> Self
    where
        S: FnMut() + Send + 'static,
        P: FnMut() + Send + 'static,
        R: FnMut() + Send + 'static,
    {
        PeriodicTask {
            task,
            period,
            wait_mode: WaitMode::default(),
            hooks: UnsafeCell::new(Hooks {
                on_start: Box::new(on_start),
                on_stop: Box::new(on_stop),
                routine: Box::new(routine),
            }),
            executing: AtomicBool::new(false),
        }
    }

    pub fn with_wait_mode(mut self, wait_mode: WaitMode) -> Self {
        self.wait_mode = wait_mode;
        self
    }

    /// Task body
    ///
    /// Returns once the task stops running, after `on_stop` has run.
    ///
    /// # Returns
    /// * `Ok(())` - Loop finished
    /// * `Err(OsError::TaskRunning)` - Body already executing elsewhere
    pub fn run(&self) -> OsResult<()> {
        if self
            .executing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(OsError::TaskRunning);
        }

        let hooks = unsafe { &mut *self.hooks.get() };

        info!("periodic: start, period {=u32}", self.period);
        (hooks.on_start)();

        while self.task.is_running() {
            if self.period != 0 {
                self.wait_period();
            }
            // Terminated during the wait
            if !self.task.is_running() {
                break;
            }
            (hooks.routine)();
        }

        (hooks.on_stop)();
        info!("periodic: stop");

        self.executing.store(false, Ordering::Release);
        Ok(())
    }

    fn wait_period(&self) {
        match self.wait_mode {
            WaitMode::Notify => {
                let _ = self.task.notify_wait(self.period);
            }
            WaitMode::Sleep => self.task.delay(self.period),
        }
    }

    /// Stop the loop, cutting the current wait short
    ///
    /// `on_stop` still runs on the task's thread.
    pub fn terminate(&self) {
        self.task.terminate();
        self.task.abort_delay();
    }

    /// Drive one iteration now (notification wait mode only)
    pub fn notify(&self, value: OsNotifyValue) -> bool {
        self.task.notify(value)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.task.is_running()
    }

    /// Is the task body currently executing
    #[inline]
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    #[inline(always)]
    pub fn period(&self) -> OsTick {
        self.period
    }

    #[inline(always)]
    pub fn wait_mode(&self) -> WaitMode {
        self.wait_mode
    }

    pub fn task(&self) -> &T {
        &self.task
    }
}

impl<T: TaskPort> Drop for PeriodicTask<T> {
    fn drop(&mut self) {
        self.task.abort_delay();
    }
}
