//! Raw encoder register decoding.
//!
//! The counter reports position as a 16-bit unsigned value read one byte at a
//! time. Two transforms turn that into a logical position: a direction
//! reversal for motors mounted mirror-image, and an overflow rejection that
//! zeroes readings produced by running the counter backwards past zero
//! (the counter wraps to 65535 and counts down).

/// Combine the high/low tick register bytes into the raw 16-bit count.
#[inline]
pub fn combine_bytes(msb: u8, lsb: u8) -> u16 {
    u16::from(msb) << 8 | u16::from(lsb)
}

/// Mirror a raw count for a reversed-direction channel: `65536 - t`, with 0
/// mapping to 0. This is exactly two's-complement negation in u16.
#[inline]
pub fn apply_reversal(ticks: u16) -> u16 {
    ticks.wrapping_neg()
}

/// Zero any reading above `limit`. Overshooting toward zero leaves the counter
/// just under 65536; anything above the limit is such an artifact, not travel.
/// The stock limit of 50000 is a tunable heuristic, not a hardware constant.
#[inline]
pub fn reject_overflow(ticks: u16, limit: u16) -> u16 {
    if ticks > limit { 0 } else { ticks }
}

/// Full decode pipeline: reversal (when configured), then overflow rejection.
#[inline]
pub fn logical_ticks(raw: u16, reversed: bool, overflow_limit: u16) -> u16 {
    let t = if reversed { apply_reversal(raw) } else { raw };
    reject_overflow(t, overflow_limit)
}
