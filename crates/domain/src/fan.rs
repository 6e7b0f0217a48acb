//! Fan speed ↔ percentage mapping.
//!
//! The controller exposes ten discrete speed levels (`1..=10`) plus `0`
//! for off. Percentages map linearly onto that range; any positive
//! percentage rounds *up* to the next whole level.

use crate::error::ValidationError;

/// Lowest and highest running speed level.
pub const SPEED_RANGE: (u8, u8) = (1, 10);

/// Number of discrete running speeds.
pub const SPEED_COUNT: u8 = SPEED_RANGE.1 - SPEED_RANGE.0 + 1;

/// Validate a raw percentage from a service call.
///
/// # Errors
///
/// Returns [`ValidationError::PercentageOutOfRange`] outside `0..=100`.
pub fn parse_percentage(raw: i64) -> Result<u8, ValidationError> {
    u8::try_from(raw)
        .ok()
        .filter(|p| *p <= 100)
        .ok_or(ValidationError::PercentageOutOfRange(raw))
}

/// Percentage shown for a speed level.
#[must_use]
pub fn level_to_percentage(level: u8) -> u8 {
    let offset = SPEED_RANGE.0 - 1;
    let level = u16::from(level.min(SPEED_RANGE.1).saturating_sub(offset));
    // at most 100, fits in u8
    u8::try_from(level * 100 / u16::from(SPEED_COUNT)).unwrap_or(100)
}

/// Speed level to request for a percentage; `0` turns the fan off.
#[must_use]
pub fn percentage_to_level(percentage: u8) -> u8 {
    if percentage == 0 {
        return 0;
    }
    let pct = u16::from(percentage.min(100));
    let count = u16::from(SPEED_COUNT);
    let level = (pct * count).div_ceil(100);
    u8::try_from(level)
        .unwrap_or(SPEED_RANGE.1)
        .clamp(SPEED_RANGE.0, SPEED_RANGE.1)
}
