//! Fixed-capacity object pool
//!
//! Hands out up to `N` non-overlapping storage blocks of type `T` from a
//! statically sized table. The occupancy table is only touched inside a
//! critical section; the storage itself is handed out uninitialised and is
//! owned by the requester until it is given back.
//!
//! Allocation is first-fit over a linear scan. `N` is a small compile-time
//! constant and allocation happens at object construction time, so the
//! time spent inside the critical section is short and bounded by `N`.

use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::core::cs_cell::CsCell;
use crate::critical::critical_section;

/// Contract every slot allocator honours
///
/// A slot returned by [`allocate`](SlotAllocator::allocate) is borrowed, not
/// owned: the requester initialises it, calls
/// [`deallocate`](SlotAllocator::deallocate) exactly once when it is done,
/// and never touches the slot afterwards.
pub trait SlotAllocator<T> {
    /// Claim a free slot, or `None` when every slot is taken
    fn allocate(&self) -> Option<NonNull<T>>;

    /// Give a slot back
    ///
    /// Returns `false` if `slot` was not handed out by this allocator or is
    /// not currently claimed. The table is left unchanged in that case.
    ///
    /// # Safety
    /// If `slot` is one of this allocator's slots and is currently claimed,
    /// the caller must be the one that claimed it through
    /// [`allocate`](SlotAllocator::allocate), any value it wrote there must
    /// already be dropped, and the caller must not touch the slot again.
    unsafe fn deallocate(&self, slot: NonNull<T>) -> bool;
}

/// Fixed-capacity object pool
///
/// Usually declared as a `static` and passed by `&'static` reference to the
/// objects that draw from it:
///
/// ```ignore
/// static TIMERS: TimerPool<MyKernel, 4> = Pool::new();
/// ```
pub struct Pool<T, const N: usize> {
    /// Occupancy flag per slot
    used: CsCell<[bool; N]>,
    /// Slot storage, initialised by whoever claims a slot
    slots: UnsafeCell<MaybeUninit<[T; N]>>,
}

// Slots are only reachable through pointers handed out under the critical
// section, one owner at a time.
unsafe impl<T: Send, const N: usize> Sync for Pool<T, N> {}
unsafe impl<T: Send, const N: usize> Send for Pool<T, N> {}

impl<T, const N: usize> Pool<T, N> {
    /// Create an empty pool
    ///
    /// Slots are told apart by address, so `T` must not be zero-sized.
    pub const fn new() -> Self {
        assert!(core::mem::size_of::<T>() != 0, "pool slots must not be zero-sized");
        Pool {
            used: CsCell::new([false; N]),
            slots: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// Total number of slots
    #[inline(always)]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Number of slots currently claimed
    pub fn in_use(&self) -> usize {
        critical_section(|cs| self.used.borrow_mut(cs).iter().filter(|used| **used).count())
    }

    /// Number of free slots
    #[inline]
    pub fn available(&self) -> usize {
        N - self.in_use()
    }

    /// Check whether `ptr` is the address of one of this pool's slots
    ///
    /// Says nothing about whether the slot is currently claimed.
    pub fn contains(&self, ptr: NonNull<T>) -> bool {
        self.index_of(ptr).is_some()
    }

    /// Address of slot `index`
    #[inline(always)]
    fn slot_ptr(&self, index: usize) -> NonNull<T> {
        debug_assert!(index < N);
        let base = self.slots.get().cast::<T>();
        unsafe { NonNull::new_unchecked(base.add(index)) }
    }

    /// Linear scan for the slot whose address equals `ptr`
    fn index_of(&self, ptr: NonNull<T>) -> Option<usize> {
        (0..N).find(|&index| self.slot_ptr(index) == ptr)
    }

    /// Claim the first free slot
    ///
    /// # Returns
    /// * `Some(slot)` - Uninitialised storage owned by the caller until it
    ///   is deallocated
    /// * `None` - All `N` slots are claimed
    pub fn allocate(&self) -> Option<NonNull<T>> {
        let claimed = critical_section(|cs| {
            let used = self.used.borrow_mut(cs);
            let index = used.iter().position(|used| !*used)?;
            used[index] = true;
            Some(index)
        });

        match claimed {
            Some(index) => {
                trace!("pool: claimed slot {=usize}/{=usize}", index, N);
                Some(self.slot_ptr(index))
            }
            None => {
                warn!("pool: exhausted ({=usize} slots)", N);
                None
            }
        }
    }

    /// Release a previously claimed slot
    ///
    /// Only the claimant may release a claimed slot, so this is not callable
    /// from safe code:
    ///
    /// ```compile_fail,E0133
    /// let pool: kobj::Pool<u32, 1> = kobj::Pool::new();
    /// let slot = pool.allocate().unwrap();
    /// pool.deallocate(slot);
    /// ```
    ///
    /// # Returns
    /// * `true` - The slot belonged to this pool and was claimed
    /// * `false` - Foreign address or slot already free; nothing changed
    ///
    /// # Safety
    /// Same contract as [`SlotAllocator::deallocate`].
    pub unsafe fn deallocate(&self, ptr: NonNull<T>) -> bool {
        let Some(index) = self.index_of(ptr) else {
            warn!("pool: deallocate of foreign address");
            return false;
        };

        let released = critical_section(|cs| {
            let used = self.used.borrow_mut(cs);
            core::mem::replace(&mut used[index], false)
        });

        if !released {
            warn!("pool: slot {=usize} was not claimed", index);
        }
        released
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> SlotAllocator<T> for Pool<T, N> {
    #[inline]
    fn allocate(&self) -> Option<NonNull<T>> {
        Pool::allocate(self)
    }

    #[inline]
    unsafe fn deallocate(&self, slot: NonNull<T>) -> bool {
        unsafe { Pool::deallocate(self, slot) }
    }
}
