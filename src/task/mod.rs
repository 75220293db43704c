//! Task drivers
//!
//! Task creation and scheduling belong to the kernel and reach this crate
//! only through [`TaskPort`](crate::port::TaskPort).

pub mod periodic;

pub use periodic::{PeriodicTask, TaskHook, WaitMode};
