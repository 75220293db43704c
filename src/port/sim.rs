//! Simulated kernel for host builds
//!
//! [`SimKernel`] models the timer service task: a bounded command queue
//! drained either on every post (immediate mode, the default) or only when
//! the service gets to run (deferred mode: on [`SimKernel::service`], on
//! `yield_now`, and on every simulated tick). Time only moves when
//! [`SimKernel::advance`] is called, so tests are fully deterministic.
//!
//! Deleted timers are kept as tombstones, the way a statically allocated
//! kernel timer keeps its identity in its storage block until the block is
//! reused.
//!
//! [`SimTask`] is a task collaborator whose waits advance the simulated
//! clock one tick at a time, so timer callbacks can notify it or abort its
//! wait mid-period.

use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::ptr::{self, NonNull};

use critical_section::Mutex;
use portable_atomic::{AtomicBool, AtomicU32, Ordering};

use crate::config::CFG_TIMER_QUEUE_LEN;
use crate::port::{TaskPort, TimerCommand, TimerPort};
use crate::types::{OsNotifyValue, OsTick, TimerMode, OS_NO_WAIT};

/// Marker written into the storage block of every simulated timer ('TMR ')
pub const SIM_TIMER_MAGIC: u32 = 0x544D_5220;

/// Simulated timer handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimHandle(u32);

impl SimHandle {
    #[inline(always)]
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// Storage block the simulated kernel writes into on creation
#[repr(C)]
#[allow(dead_code)]
pub struct SimTimerStorage {
    magic: u32,
    handle: u32,
    reserved: [u32; 6],
}

struct SimTimer {
    name: &'static str,
    period: OsTick,
    mode: TimerMode,
    id: usize,
    callback: fn(&SimKernel, SimHandle),
    storage: usize,
    active: bool,
    expiry: OsTick,
    deleted: bool,
}

struct Pending {
    timer: SimHandle,
    command: TimerCommand,
    issued: OsTick,
}

/// Forced "still active" answers, see [`SimKernel::hold_active`]
struct Hold {
    timer: SimHandle,
    polls: u32,
}

struct SimState {
    tick: OsTick,
    timers: Vec<SimTimer>,
    queue: VecDeque<Pending>,
    queue_len: usize,
    deferred: bool,
    in_flight: Option<SimHandle>,
    hold: Option<Hold>,
    reject_create: bool,
    reject_command: bool,
    yields: u32,
    active_polls: u32,
}

impl SimState {
    fn timer(&self, handle: SimHandle) -> Option<&SimTimer> {
        self.timers.get(handle.index())
    }

    fn live_timer(&self, handle: SimHandle) -> Option<&SimTimer> {
        self.timer(handle).filter(|timer| !timer.deleted)
    }

    /// Run the service task over every queued command
    fn drain(&mut self) {
        while let Some(pending) = self.queue.pop_front() {
            self.apply(pending);
        }
    }

    fn apply(&mut self, pending: Pending) {
        let Some(timer) = self.timers.get_mut(pending.timer.index()) else {
            return;
        };
        if timer.deleted {
            return;
        }

        match pending.command {
            TimerCommand::Start | TimerCommand::Reset => {
                timer.active = true;
                timer.expiry = pending.issued.wrapping_add(timer.period);
            }
            TimerCommand::Stop => {
                timer.active = false;
            }
            TimerCommand::ChangePeriod(period) => {
                timer.period = period;
                timer.active = true;
                timer.expiry = pending.issued.wrapping_add(period);
            }
            TimerCommand::Delete => {
                timer.active = false;
                timer.deleted = true;
            }
        }
    }

    /// Advance one tick and collect the timers that expire on it
    fn step(&mut self) -> Vec<SimHandle> {
        self.tick = self.tick.wrapping_add(1);
        self.drain();

        let now = self.tick;
        let mut due = Vec::new();
        for (index, timer) in self.timers.iter_mut().enumerate() {
            if timer.deleted || !timer.active || timer.expiry != now {
                continue;
            }
            if timer.mode.is_auto_reload() {
                timer.expiry = now.wrapping_add(timer.period);
            } else {
                timer.active = false;
            }
            due.push(SimHandle(index as u32));
        }
        due
    }
}

/// Simulated timer service
pub struct SimKernel {
    state: Mutex<RefCell<SimState>>,
}

impl SimKernel {
    pub const fn new() -> Self {
        SimKernel {
            state: Mutex::new(RefCell::new(SimState {
                tick: 0,
                timers: Vec::new(),
                queue: VecDeque::new(),
                queue_len: CFG_TIMER_QUEUE_LEN,
                deferred: false,
                in_flight: None,
                hold: None,
                reject_create: false,
                reject_command: false,
                yields: 0,
                active_polls: 0,
            })),
        }
    }

    #[inline]
    fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.state.borrow_ref_mut(cs)))
    }

    // ============ Test controls ============

    /// Leave posted commands queued until the service runs
    pub fn set_deferred(&self, deferred: bool) {
        self.with(|s| s.deferred = deferred);
    }

    /// Resize the command queue
    pub fn set_queue_len(&self, len: usize) {
        self.with(|s| s.queue_len = len);
    }

    /// Make the next `create_static` fail
    pub fn reject_next_create(&self) {
        self.with(|s| s.reject_create = true);
    }

    /// Make the next posted command fail
    pub fn reject_next_command(&self) {
        self.with(|s| s.reject_command = true);
    }

    /// Pretend an expiry callback for `timer` is in flight
    ///
    /// The next `polls` calls to `is_active(timer)` report `true`
    /// regardless of the timer's state. The last of them completes the
    /// in-flight invocation by running the timer's callback once.
    pub fn hold_active(&self, timer: SimHandle, polls: u32) {
        self.with(|s| s.hold = (polls > 0).then_some(Hold { timer, polls }));
    }

    /// Run the service task over all queued commands
    pub fn service(&self) {
        self.with(SimState::drain);
    }

    /// Advance simulated time, firing expired timers tick by tick
    pub fn advance(&self, ticks: OsTick) {
        for _ in 0..ticks {
            let due = self.with(SimState::step);
            for timer in due {
                self.dispatch(timer);
            }
        }
    }

    /// Invoke one expiry callback, flagged as in flight while it runs
    fn dispatch(&self, timer: SimHandle) {
        let callback = self.with(|s| {
            let callback = s.live_timer(timer)?.callback;
            s.in_flight = Some(timer);
            Some(callback)
        });

        if let Some(callback) = callback {
            callback(self, timer);
            self.with(|s| s.in_flight = None);
        }
    }

    fn post(&self, timer: SimHandle, command: TimerCommand, wait: OsTick) -> bool {
        self.with(|s| {
            if core::mem::take(&mut s.reject_command) || s.live_timer(timer).is_none() {
                return false;
            }
            if command == TimerCommand::ChangePeriod(0) {
                return false;
            }
            if s.queue.len() >= s.queue_len {
                if wait == OS_NO_WAIT {
                    return false;
                }
                // Blocking on a full queue lets the service task run
                s.drain();
            }

            let issued = s.tick;
            s.queue.push_back(Pending { timer, command, issued });
            if !s.deferred {
                s.drain();
            }
            true
        })
    }

    // ============ Inspection ============

    /// Current simulated tick
    pub fn now(&self) -> OsTick {
        self.with(|s| s.tick)
    }

    /// Commands waiting for the service task
    pub fn pending_commands(&self) -> usize {
        self.with(|s| s.queue.len())
    }

    /// Timers created and not yet deleted
    pub fn live_timers(&self) -> usize {
        self.with(|s| s.timers.iter().filter(|timer| !timer.deleted).count())
    }

    /// Has the service processed a delete for `timer`
    pub fn is_deleted(&self, timer: SimHandle) -> bool {
        self.with(|s| s.timer(timer).map_or(false, |timer| timer.deleted))
    }

    /// Address of the storage block `timer` was created in
    pub fn storage_addr(&self, timer: SimHandle) -> Option<usize> {
        self.with(|s| s.timer(timer).map(|timer| timer.storage))
    }

    /// Number of `yield_now` calls so far
    pub fn yields(&self) -> u32 {
        self.with(|s| s.yields)
    }

    /// Number of `is_active` queries so far
    pub fn active_polls(&self) -> u32 {
        self.with(|s| s.active_polls)
    }
}

impl Default for SimKernel {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerPort for SimKernel {
    type Handle = SimHandle;
    type Storage = SimTimerStorage;

    unsafe fn create_static(
        &self,
        name: &'static str,
        period: OsTick,
        mode: TimerMode,
        id: *mut (),
        callback: fn(&Self, SimHandle),
        storage: NonNull<SimTimerStorage>,
    ) -> Option<SimHandle> {
        let handle = self.with(|s| {
            if core::mem::take(&mut s.reject_create) || period == 0 {
                return None;
            }
            let handle = SimHandle(s.timers.len() as u32);
            s.timers.push(SimTimer {
                name,
                period,
                mode,
                id: id as usize,
                callback,
                storage: storage.as_ptr() as usize,
                active: false,
                expiry: 0,
                deleted: false,
            });
            Some(handle)
        })?;

        unsafe {
            storage.as_ptr().write(SimTimerStorage {
                magic: SIM_TIMER_MAGIC,
                handle: handle.0,
                reserved: [0; 6],
            });
        }
        Some(handle)
    }

    fn send_command(&self, timer: SimHandle, command: TimerCommand, wait: OsTick) -> bool {
        self.post(timer, command, wait)
    }

    fn send_command_from_isr(&self, timer: SimHandle, command: TimerCommand) -> Option<bool> {
        self.post(timer, command, OS_NO_WAIT).then_some(false)
    }

    fn is_active(&self, timer: SimHandle) -> bool {
        let (active, completion) = self.with(|s| {
            s.active_polls = s.active_polls.wrapping_add(1);

            if let Some(hold) = s.hold.as_mut().filter(|hold| hold.timer == timer) {
                hold.polls -= 1;
                if hold.polls > 0 {
                    return (true, None);
                }
                s.hold = None;
                return (true, s.timer(timer).map(|t| t.callback));
            }

            let queued = s.queue.iter().any(|pending| pending.timer == timer);
            let armed = s.live_timer(timer).map_or(false, |t| t.active);
            (armed || queued || s.in_flight == Some(timer), None)
        });

        if let Some(callback) = completion {
            callback(self, timer);
        }
        active
    }

    fn timer_id(&self, timer: SimHandle) -> *mut () {
        self.with(|s| s.timer(timer).map_or(ptr::null_mut(), |t| t.id as *mut ()))
    }

    fn period(&self, timer: SimHandle) -> OsTick {
        self.with(|s| s.live_timer(timer).map_or(0, |t| t.period))
    }

    fn name(&self, timer: SimHandle) -> &'static str {
        self.with(|s| s.live_timer(timer).map_or("", |t| t.name))
    }

    fn mode(&self, timer: SimHandle) -> TimerMode {
        self.with(|s| s.live_timer(timer).map_or(TimerMode::OneShot, |t| t.mode))
    }

    fn set_mode(&self, timer: SimHandle, mode: TimerMode) {
        self.with(|s| {
            if let Some(t) = s.timers.get_mut(timer.index()).filter(|t| !t.deleted) {
                t.mode = mode;
            }
        });
    }

    fn expiry_time(&self, timer: SimHandle) -> OsTick {
        self.with(|s| s.live_timer(timer).map_or(0, |t| t.expiry))
    }

    fn tick_count(&self) -> OsTick {
        self.now()
    }

    fn yield_now(&self) {
        self.with(|s| {
            s.yields = s.yields.wrapping_add(1);
            s.drain();
        });
    }
}

// ============ Task ============

/// Simulated task collaborator
///
/// Waits advance the owning [`SimKernel`] one tick at a time and end early
/// on notification (for `notify_wait`) or on `abort_delay`. An abort sent
/// while no wait is in progress ends the next one immediately.
pub struct SimTask {
    kernel: &'static SimKernel,
    running: AtomicBool,
    abort: AtomicBool,
    notified: AtomicBool,
    value: AtomicU32,
    waits: AtomicU32,
}

impl SimTask {
    pub const fn new(kernel: &'static SimKernel) -> Self {
        SimTask {
            kernel,
            running: AtomicBool::new(true),
            abort: AtomicBool::new(false),
            notified: AtomicBool::new(false),
            value: AtomicU32::new(0),
            waits: AtomicU32::new(0),
        }
    }

    /// Number of delays and notification waits entered
    pub fn waits(&self) -> u32 {
        self.waits.load(Ordering::Relaxed)
    }

    fn take_notification(&self) -> Option<OsNotifyValue> {
        self.notified
            .swap(false, Ordering::AcqRel)
            .then(|| self.value.load(Ordering::Acquire))
    }

    fn wait(&self, ticks: OsTick, wake_on_notify: bool) -> Option<OsNotifyValue> {
        self.waits.fetch_add(1, Ordering::Relaxed);

        let mut woken = None;
        for _ in 0..ticks {
            if wake_on_notify {
                woken = self.take_notification();
                if woken.is_some() {
                    break;
                }
            }
            if self.abort.swap(false, Ordering::AcqRel) {
                break;
            }
            self.kernel.advance(1);
        }
        if woken.is_none() && wake_on_notify {
            woken = self.take_notification();
        }
        woken
    }
}

impl TaskPort for SimTask {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn delay(&self, ticks: OsTick) {
        self.wait(ticks, false);
    }

    fn notify_wait(&self, ticks: OsTick) -> Option<OsNotifyValue> {
        self.wait(ticks, true)
    }

    fn notify(&self, value: OsNotifyValue) -> bool {
        self.value.store(value, Ordering::Release);
        self.notified.store(true, Ordering::Release);
        true
    }

    fn abort_delay(&self) -> bool {
        self.abort.store(true, Ordering::Release);
        true
    }

    fn terminate(&self) {
        self.running.store(false, Ordering::Release);
    }
}
