//! Static memory management
//!
//! Contains the fixed-capacity object pool used as backing storage for
//! statically allocated kernel objects.

pub mod pool;
