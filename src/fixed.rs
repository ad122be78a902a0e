//! Q16 fixed-point arithmetic for delivery probabilities and blending.
//!
//! The engine is integer-only: probabilities live in Q16 (65536 == 1.0)
//! and moving averages blend with integer percentage weights. Divisors
//! are clamped to 1 inside the helpers so a quiet window can never
//! divide by zero.

/// Fixed-point shift; probabilities and ratios are Q16.
pub const FRAC_BITS: u32 = 16;

/// 1.0 in Q16.
pub const FRAC_ONE: u32 = 1 << FRAC_BITS;

/// `val / div` as a Q16 fraction. A zero divisor is treated as 1.
#[inline]
pub fn frac(val: u32, div: u32) -> u32 {
    (((val as u64) << FRAC_BITS) / div.max(1) as u64) as u32
}

/// Integer part of a Q16 value.
#[inline]
pub fn trunc(val: u32) -> u32 {
    val >> FRAC_BITS
}

/// Exponentially weighted moving average with an integer percentage
/// weight kept on the old value:
/// `(new * (100 - weight) + old * weight) / 100`.
#[inline]
pub fn ewma(old: u32, new: u32, weight: u32) -> u32 {
    ((new as u64 * (100 - weight) as u64 + old as u64 * weight as u64) / 100) as u32
}
