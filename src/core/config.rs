//! Compile-time configuration
//!
//! These constants control resource limits and the tick base used by the
//! time conversion helpers.

/// System tick rate in Hz
pub const CFG_TICK_RATE_HZ: u32 = 1000;

/// Default capacity of a static timer pool
pub const CFG_MAX_STATIC_TIMERS: usize = 8;

/// Depth of the simulated timer command queue
pub const CFG_TIMER_QUEUE_LEN: usize = 10;
