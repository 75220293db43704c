//! Logging macros
//!
//! Forward to `defmt` when the `defmt` feature is enabled. Without it the
//! arguments are dropped at expansion time, so logging costs nothing in
//! builds that do not carry a defmt transport.

macro_rules! log_at {
    ($level:ident, $($arg:tt)*) => {{
        #[cfg(feature = "defmt")]
        ::defmt::$level!($($arg)*);
    }};
}

/// Trace message
macro_rules! trace {
    ($($arg:tt)*) => { log_at!(trace, $($arg)*) };
}

/// Debug message
macro_rules! debug {
    ($($arg:tt)*) => { log_at!(debug, $($arg)*) };
}

/// Info message
macro_rules! info {
    ($($arg:tt)*) => { log_at!(info, $($arg)*) };
}

/// Warning message
macro_rules! warn {
    ($($arg:tt)*) => { log_at!(warn, $($arg)*) };
}

/// Error message
macro_rules! error {
    ($($arg:tt)*) => { log_at!(error, $($arg)*) };
}
