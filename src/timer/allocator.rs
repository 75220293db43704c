//! Static timer allocator
//!
//! Claims exactly one pool slot per timer and creates the kernel timer in
//! it. The slot doubles as the timer's control block: it holds the kernel
//! storage and the user callback, and its address is the identity the
//! kernel hands back to the expiry trampoline. Slots never move, so the
//! front-end `Timer` can be moved freely without touching the kernel.

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::{self, NonNull};

use crate::error::{OsError, OsResult};
use crate::mem::pool::SlotAllocator;
use crate::port::TimerPort;
use crate::types::{OsTick, TimerMode};

/// Deferred zero-argument action run on every expiry
pub type TimerCallback = Box<dyn FnMut() + Send + 'static>;

/// Slot allocator that timers of kernel `K` draw from
pub type TimerSlots<K> = dyn SlotAllocator<TimerSlot<K>> + Sync;

/// Pool slot backing one timer
#[repr(C)]
pub struct TimerSlot<K: TimerPort> {
    /// Kernel-owned storage while the timer exists
    storage: UnsafeCell<MaybeUninit<K::Storage>>,
    /// Only touched by the timer service, or by the owner once quiesced
    callback: UnsafeCell<Option<TimerCallback>>,
}

impl<K: TimerPort> TimerSlot<K> {
    /// Run the slot's callback
    ///
    /// # Safety
    /// `slot` must be a live, initialised slot and no other reference to
    /// its callback may exist for the duration of the call.
    pub(crate) unsafe fn invoke(slot: NonNull<Self>) {
        let callback = unsafe { &mut *(*slot.as_ptr()).callback.get() };
        if let Some(callback) = callback.as_mut() {
            callback();
        }
    }
}

/// Draws one slot from a pool and creates a kernel timer in it
pub struct StaticTimerAllocator<K: TimerPort + 'static> {
    pool: &'static TimerSlots<K>,
    slot: Option<NonNull<TimerSlot<K>>>,
}

// The slot is exclusively owned by this allocator.
unsafe impl<K: TimerPort + 'static> Send for StaticTimerAllocator<K> {}

impl<K: TimerPort + 'static> StaticTimerAllocator<K> {
    /// Create an allocator that has not claimed anything yet
    pub const fn new(pool: &'static TimerSlots<K>) -> Self {
        StaticTimerAllocator { pool, slot: None }
    }

    /// Pool this allocator draws from
    #[inline(always)]
    pub fn pool(&self) -> &'static TimerSlots<K> {
        self.pool
    }

    /// Does this allocator currently hold a slot
    #[inline(always)]
    pub fn is_allocated(&self) -> bool {
        self.slot.is_some()
    }

    /// Claim a slot and create a kernel timer in it
    ///
    /// The slot address is registered as the timer identity, so
    /// `trampoline` receives a handle whose `timer_id` resolves to the
    /// slot. Pool exhaustion and kernel rejection leave the allocator
    /// exactly as it was.
    ///
    /// # Returns
    /// * `Ok(handle)` - Kernel timer created in the claimed slot
    /// * `Err(OsError::TmrAlreadyBound)` - A slot is already held
    /// * `Err(OsError::PoolExhausted)` - No free slot
    /// * `Err(OsError::KernelRejected)` - Kernel refused to create the timer
    ///
    /// # Safety
    /// The caller must delete the kernel timer and observe it inactive
    /// before calling [`release`](Self::release) or dropping the allocator.
    pub unsafe fn create(
        &mut self,
        kernel: &K,
        name: &'static str,
        period: OsTick,
        mode: TimerMode,
        callback: TimerCallback,
        trampoline: fn(&K, K::Handle),
    ) -> OsResult<K::Handle> {
        if self.slot.is_some() {
            return Err(OsError::TmrAlreadyBound);
        }

        let slot = self.pool.allocate().ok_or(OsError::PoolExhausted)?;
        unsafe {
            slot.as_ptr().write(TimerSlot {
                storage: UnsafeCell::new(MaybeUninit::uninit()),
                callback: UnsafeCell::new(Some(callback)),
            });
        }

        let storage = unsafe {
            let cell = (*slot.as_ptr()).storage.get();
            NonNull::new_unchecked(cell.cast::<K::Storage>())
        };
        let id = slot.as_ptr().cast::<()>();

        match unsafe { kernel.create_static(name, period, mode, id, trampoline, storage) } {
            Some(handle) => {
                self.slot = Some(slot);
                Ok(handle)
            }
            None => {
                // The kernel never saw the slot; it is still ours alone.
                unsafe {
                    ptr::drop_in_place(slot.as_ptr());
                    self.pool.deallocate(slot);
                }
                Err(OsError::KernelRejected)
            }
        }
    }

    /// Drop the callback and give the slot back to the pool
    ///
    /// Returns `false` if nothing was held.
    pub fn release(&mut self) -> bool {
        let Some(slot) = self.slot.take() else {
            return false;
        };
        // Claimed by `create`, and the kernel is done with it per its contract.
        unsafe {
            ptr::drop_in_place(slot.as_ptr());
            self.pool.deallocate(slot)
        }
    }

    /// Forget the slot without releasing it
    ///
    /// Used when the kernel refused to delete the timer: the slot and its
    /// callback stay valid for as long as the kernel might reach them.
    pub fn leak(&mut self) {
        self.slot = None;
    }
}

impl<K: TimerPort + 'static> Drop for StaticTimerAllocator<K> {
    fn drop(&mut self) {
        self.release();
    }
}
