//! Signed-speed decomposition for H-bridge style drives.
//!
//! Every motor command reduces to two direction enables plus a duty-cycle
//! magnitude. The sign of the speed selects exactly one enable; zero disables
//! both (coast stop, no braking is modeled).

/// One resolved drive output: direction enables plus duty magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriveCommand {
    pub forward: bool,
    pub reverse: bool,
    pub duty: f32,
}

impl DriveCommand {
    /// Decompose a signed speed into enable bits and duty magnitude.
    ///
    /// The input is expected in [-1, 1] but is not range-checked here;
    /// controllers clamp before commanding.
    pub fn from_speed(speed: f32) -> Self {
        Self {
            forward: speed > 0.0,
            reverse: speed < 0.0,
            duty: speed.abs(),
        }
    }

    /// Both enables off, zero duty.
    pub const STOP: Self = Self {
        forward: false,
        reverse: false,
        duty: 0.0,
    };
}
