//! Core building blocks
//!
//! Configuration, critical sections, error and tick types shared by the
//! pool, timer and task modules.

pub mod config;
pub mod critical;
pub mod cs_cell;
pub mod error;
pub mod time;
pub mod types;
