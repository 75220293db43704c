//! Tick conversions
//!
//! Kernel periods and wait budgets are expressed in ticks; these helpers
//! convert wall-clock quantities using [`CFG_TICK_RATE_HZ`].

use crate::config::CFG_TICK_RATE_HZ;
use crate::error::{OsError, OsResult};
use crate::types::OsTick;

/// Convert milliseconds to ticks, rounding down
///
/// Saturates at [`OsTick::MAX`].
#[inline]
pub const fn ms_to_ticks(ms: u32) -> OsTick {
    let ticks = (ms as u64 * CFG_TICK_RATE_HZ as u64) / 1000;
    if ticks > OsTick::MAX as u64 {
        OsTick::MAX
    } else {
        ticks as OsTick
    }
}

/// Convert ticks to milliseconds, rounding down
#[inline]
pub const fn ticks_to_ms(ticks: OsTick) -> u64 {
    (ticks as u64 * 1000) / CFG_TICK_RATE_HZ as u64
}

/// Hours, minutes, seconds, milliseconds to ticks
///
/// # Arguments
/// * `hours` - Hours (0-999)
/// * `minutes` - Minutes (0-59)
/// * `seconds` - Seconds (0-59)
/// * `milliseconds` - Milliseconds (0-999)
///
/// # Returns
/// * `Ok(ticks)` - Converted tick count
/// * `Err(OsError::TimeInvalid)` - A component is out of range or the
///   result does not fit in [`OsTick`]
pub fn hmsm_to_ticks(hours: u16, minutes: u8, seconds: u8, milliseconds: u16) -> OsResult<OsTick> {
    if hours > 999 || minutes > 59 || seconds > 59 || milliseconds > 999 {
        return Err(OsError::TimeInvalid);
    }

    let total_ms = (hours as u64) * 3_600_000
        + (minutes as u64) * 60_000
        + (seconds as u64) * 1000
        + (milliseconds as u64);

    let ticks = (total_ms * CFG_TICK_RATE_HZ as u64) / 1000;
    OsTick::try_from(ticks).map_err(|_| OsError::TimeInvalid)
}
