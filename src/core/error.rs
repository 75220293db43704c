//! Error types
//!
//! Uses Rust's Result pattern instead of C-style status codes.

/// Kernel object error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u16)]
pub enum OsError {
    /// No error
    None = 0,

    // ============ ISR errors ============
    /// Cannot create object from ISR
    CreateIsr = 12001,

    // ============ Pool errors ============
    /// Every pool slot is occupied
    PoolExhausted = 22210,

    // ============ Object errors ============
    /// No kernel object is bound to the wrapper
    Unbound = 24003,

    // ============ Kernel errors ============
    /// The kernel refused the request (invalid period, full command queue, ...)
    KernelRejected = 24301,
    /// The kernel accepted a stop/delete but has not confirmed it yet.
    /// Resolved by polling inside teardown, never returned to callers.
    TeardownIncomplete = 24302,

    // ============ Task errors ============
    /// Periodic task body is already executing
    TaskRunning = 29016,

    // ============ Time errors ============
    /// Malformed hours/minutes/seconds/milliseconds value
    TimeInvalid = 29310,

    // ============ Timer errors ============
    /// Timer period must be non-zero
    TmrInvalidPeriod = 29504,
    /// Allocator already backs a live timer
    TmrAlreadyBound = 29505,
}

/// Result type alias for kernel object operations
pub type OsResult<T> = Result<T, OsError>;

impl OsError {
    #[inline]
    pub fn is_ok(self) -> bool {
        self == OsError::None
    }

    #[inline]
    pub fn is_err(self) -> bool {
        self != OsError::None
    }

    /// Numeric error code
    #[inline]
    pub fn code(self) -> u16 {
        self as u16
    }
}
