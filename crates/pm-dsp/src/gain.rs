//! Gain and pan models

use std::f32::consts::FRAC_PI_2;

/// Convert a user gain in [0, 1] into a multiplicative scale.
///
/// In linear mode the gain passes straight through. Otherwise the gain maps
/// through `a * exp(b * gain)` (roughly a 60 dB(A) range) with a linear
/// taper below 0.1 so the curve reaches zero at zero, clamped to [0, 1].
pub fn gain_to_scale(gain: f32, use_linear_gain: bool) -> f32 {
    if use_linear_gain {
        return gain;
    }

    let gain = gain.clamp(0.0, 1.0);
    const TAPER: f32 = 0.1;
    const A: f32 = 1e-3;
    const B: f32 = 6.908;
    let mut scale = A * (gain * B).exp();
    if gain < TAPER {
        scale *= gain * (1.0 / TAPER);
    }
    scale.min(1.0)
}

/// Constant-power pan scales for a pan position in [0, 1]
/// (0 = hard left, 0.5 = center, 1 = hard right).
#[inline]
pub fn pan_scale(pan: f32) -> (f32, f32) {
    let theta = pan * FRAC_PI_2;
    (theta.cos(), theta.sin())
}
