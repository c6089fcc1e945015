//! Speed shaping shared by the axis controllers.

/// Clamp a PI output into the dead-zone-avoiding asymmetric band.
///
/// Magnitudes below `lower` are snapped up to `lower` (preserving sign) so the
/// drive can overcome static friction; magnitudes above `upper` are clamped
/// down to `upper` to bound overshoot. An exact zero passes through unchanged.
#[inline]
pub fn clamp_asymmetric(speed: f32, lower: f32, upper: f32) -> f32 {
    if speed >= upper {
        upper
    } else if speed <= lower && speed > 0.0 {
        lower
    } else if speed < 0.0 && speed >= -lower {
        -lower
    } else if speed <= -upper {
        -upper
    } else {
        speed
    }
}

/// Fixed-magnitude nudge in the direction of the error; zero error, no nudge.
#[inline]
pub fn nudge(error: i32, magnitude: f32) -> f32 {
    match error.signum() {
        1 => magnitude,
        -1 => -magnitude,
        _ => 0.0,
    }
}
