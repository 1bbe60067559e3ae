//! dB / Gain Math
//!
//! Pure conversions between decibels and linear amplitude, plus the
//! constant-power pan law used by the graph compiler.

use std::f64::consts::FRAC_PI_4;

// ============================================================================
// Constants
// ============================================================================

/// Silence floor: anything at or below this is treated as fully muted
pub const MIN_DB: f32 = -60.0;

/// Maximum fader boost
pub const MAX_DB: f32 = 12.0;

// ============================================================================
// Conversions
// ============================================================================

/// Convert decibels to linear amplitude
///
/// Returns exactly `0.0` at or below [`MIN_DB`] so a fully pulled-down
/// fader is true silence rather than -60 dB of leakage.
///
/// # Example
/// ```
/// use mixgraph::engine::gain::db_to_gain;
/// assert_eq!(db_to_gain(-60.0), 0.0);
/// assert_eq!(db_to_gain(0.0), 1.0);
/// ```
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    if db <= MIN_DB {
        0.0
    } else {
        10.0_f32.powf(db / 20.0)
    }
}

/// Convert linear amplitude to decibels
///
/// Returns `-f32::INFINITY` for zero or negative input.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

/// Clamp a dB value to the fader range `[MIN_DB, MAX_DB]`
#[inline]
pub fn clamp_db(db: f32) -> f32 {
    db.clamp(MIN_DB, MAX_DB)
}

/// Constant-power pan law
///
/// Maps `pan` in `[-1, 1]` to an angle in `[0, π/2]` and returns
/// `(cos θ, sin θ)` as the left/right multipliers. Out-of-range input is
/// clamped; a non-finite pan is treated as center.
pub fn pan_to_gains(pan: f32) -> (f64, f64) {
    let pan = if pan.is_finite() {
        pan.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let theta = (pan as f64 + 1.0) * FRAC_PI_4;
    (theta.cos(), theta.sin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use test_case::test_case;

    #[test]
    fn test_silence_floor() {
        assert_eq!(db_to_gain(-60.0), 0.0);
        assert_eq!(db_to_gain(-120.0), 0.0);
        assert_eq!(db_to_gain(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn test_unity() {
        assert_eq!(db_to_gain(0.0), 1.0);
        assert_eq!(gain_to_db(1.0), 0.0);
    }

    #[test]
    fn test_gain_to_db_non_positive() {
        assert_eq!(gain_to_db(0.0), f32::NEG_INFINITY);
        assert_eq!(gain_to_db(-0.5), f32::NEG_INFINITY);
    }

    #[test_case(-59.9)]
    #[test_case(-24.0)]
    #[test_case(-6.0)]
    #[test_case(0.0)]
    #[test_case(3.5)]
    #[test_case(12.0)]
    fn test_inverse_inside_range(db: f32) {
        assert_relative_eq!(gain_to_db(db_to_gain(db)), db, epsilon = 1e-4);
    }

    #[test]
    fn test_inverse_sweep() {
        let mut db = -59.5_f32;
        while db <= 12.0 {
            assert_relative_eq!(gain_to_db(db_to_gain(db)), db, epsilon = 1e-4);
            db += 0.25;
        }
    }

    #[test_case(-100.0 => -60.0)]
    #[test_case(-60.0 => -60.0)]
    #[test_case(-3.0 => -3.0)]
    #[test_case(12.0 => 12.0)]
    #[test_case(40.0 => 12.0)]
    fn test_clamp_db(db: f32) -> f32 {
        clamp_db(db)
    }

    #[test]
    fn test_pan_extremes() {
        let (l, r) = pan_to_gains(-1.0);
        assert_relative_eq!(l, 1.0, epsilon = 1e-12);
        assert_relative_eq!(r, 0.0, epsilon = 1e-12);

        let (l, r) = pan_to_gains(1.0);
        assert_relative_eq!(l, 0.0, epsilon = 1e-12);
        assert_relative_eq!(r, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pan_constant_power() {
        for step in -10..=10 {
            let (l, r) = pan_to_gains(step as f32 / 10.0);
            assert_relative_eq!(l * l + r * r, 1.0, epsilon = 1e-9);
        }
        let (l, r) = pan_to_gains(0.0);
        assert_relative_eq!(l, r, epsilon = 1e-12);
    }

    #[test]
    fn test_pan_out_of_range_and_nan() {
        assert_eq!(pan_to_gains(5.0), pan_to_gains(1.0));
        assert_eq!(pan_to_gains(f32::NAN), pan_to_gains(0.0));
    }
}
