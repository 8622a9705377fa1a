//! Wave physics primitives: linear dispersion, shoaling, breaking, and the
//! continuous-form Snell turn. All pure scalar functions over depth in feet
//! and angles in radians.

use crate::config::{BREAKING_DEPTH_RATIO, MAX_AMPLIFICATION, MAX_TURN_PER_STEP};

/// kh beyond this counts as deep water (tanh saturated).
const DEEP_WATER_KH: f32 = 10.0;

/// Angular wavenumber k = 2*pi / wavelength.
#[inline]
pub fn wavenumber(wavelength: f32) -> f32 {
    std::f32::consts::TAU / wavelength
}

/// Normalised phase speed c/c_deep = sqrt(tanh(k*depth)). Zero on land.
#[inline]
pub fn phase_speed(k: f32, depth: f32) -> f32 {
    if depth <= 0.0 {
        0.0
    } else {
        (k * depth).tanh().sqrt()
    }
}

/// Derivative of the normalised phase speed with respect to depth, used to
/// project the depth gradient onto the wavefront normal for refraction.
/// c = sqrt(tanh(kd))  =>  dc/dd = k*sech^2(kd) / (2*sqrt(tanh(kd)))
#[inline]
pub fn phase_speed_depth_derivative(k: f32, depth: f32) -> f32 {
    if depth <= 0.0 {
        return 0.0;
    }
    // The derivative blows up as kd -> 0; the turn clamp bounds the damage,
    // this floor just keeps the arithmetic finite.
    let kd = (k * depth).max(1e-4);
    let sech = 1.0 / kd.cosh();
    k * sech * sech / (2.0 * kd.tanh().sqrt())
}

/// Shoaling coefficient K_s: energy-flux conservation amplifies amplitude
/// as the group speed drops in shallow water. 1 in deep water, clamped at
/// MAX_AMPLIFICATION as depth -> 0.
pub fn shoaling(k: f32, depth: f32) -> f32 {
    let kh = k * depth.max(0.0);
    if kh > DEEP_WATER_KH {
        return 1.0;
    }
    if kh < 1e-6 {
        return MAX_AMPLIFICATION;
    }
    // Group-to-phase speed ratio n = 1/2 * (1 + 2kh / sinh(2kh))
    let n = 0.5 * (1.0 + 2.0 * kh / (2.0 * kh).sinh());
    (1.0 / (2.0 * n * kh.tanh()).sqrt()).min(MAX_AMPLIFICATION)
}

/// Depth below which a wave of the given wavelength breaks.
#[inline]
pub fn breaking_depth(wavelength: f32) -> f32 {
    BREAKING_DEPTH_RATIO * wavelength
}

/// Breaking intensity ramp: 0 at the breaking depth, 1 at the waterline.
/// Callers keep the running max so intensity never decreases along a ray.
#[inline]
pub fn breaking_intensity(depth: f32, breaking_depth: f32) -> f32 {
    if depth >= breaking_depth {
        0.0
    } else {
        (1.0 - depth / breaking_depth).clamp(0.0, 1.0)
    }
}

/// Snell's law in continuous form: dtheta = -(1/c) * dc/dn * ds, clamped so
/// one step can never fold the front back on itself.
#[inline]
pub fn snell_turn(speed: f32, speed_gradient_normal: f32, step_len: f32) -> f32 {
    if speed <= 1e-6 {
        return 0.0;
    }
    (-speed_gradient_normal * step_len / speed).clamp(-MAX_TURN_PER_STEP, MAX_TURN_PER_STEP)
}
