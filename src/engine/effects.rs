//! Track insert effects
//!
//! The effect catalog is small and closed, so it is an enum rather than a
//! trait object; the graph compiler matches on it exhaustively. Filters use
//! RBJ cookbook biquads with coefficients computed at compile time.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// An insert effect on a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackEffect {
    Filter(FilterEffect),
}

impl TrackEffect {
    pub fn is_enabled(&self) -> bool {
        match self {
            TrackEffect::Filter(filter) => filter.enabled,
        }
    }
}

/// Filter response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    /// Remove above frequency
    #[default]
    LowPass,
    /// Remove below frequency
    HighPass,
    /// Bell curve boost/cut
    Peak,
    /// Boost/cut below frequency
    LowShelf,
    /// Boost/cut above frequency
    HighShelf,
}

fn default_q() -> f64 {
    std::f64::consts::FRAC_1_SQRT_2
}

fn default_enabled() -> bool {
    true
}

/// A single biquad filter stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterEffect {
    #[serde(default)]
    pub kind: FilterKind,
    /// Cutoff / center frequency in Hz
    pub frequency: f64,
    #[serde(default = "default_q")]
    pub q: f64,
    /// Only used by peak and shelf filters
    #[serde(default)]
    pub gain_db: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl FilterEffect {
    pub fn low_pass(frequency: f64) -> Self {
        Self {
            kind: FilterKind::LowPass,
            frequency,
            q: default_q(),
            gain_db: 0.0,
            enabled: true,
        }
    }

    pub fn high_pass(frequency: f64) -> Self {
        Self {
            kind: FilterKind::HighPass,
            ..Self::low_pass(frequency)
        }
    }

    pub fn peak(frequency: f64, gain_db: f64, q: f64) -> Self {
        Self {
            kind: FilterKind::Peak,
            frequency,
            q,
            gain_db,
            enabled: true,
        }
    }

    /// Normalized coefficients for this filter at `sample_rate`
    ///
    /// `None` when the parameters do not give a usable filter (a NaN
    /// frequency, q or gain, or a non-positive sample rate).
    pub fn coefficients(&self, sample_rate: f64) -> Option<BiquadCoeffs> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return None;
        }
        let coeffs =
            BiquadCoeffs::calculate(self.kind, sample_rate, self.frequency, self.gain_db, self.q);
        coeffs.is_finite().then_some(coeffs)
    }
}

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    /// Calculate coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    pub fn calculate(
        kind: FilterKind,
        sample_rate: f64,
        frequency: f64,
        gain_db: f64,
        q: f64,
    ) -> Self {
        // Clamp frequency to valid range (below Nyquist)
        let max_freq = (sample_rate / 2.0 - 1.0).max(20.0);
        let freq = frequency.clamp(20.0, max_freq);
        let q = q.clamp(0.1, 10.0);

        let w0 = 2.0 * PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a = 10.0_f64.powf(gain_db / 40.0);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterKind::LowPass => (
                (1.0 - cos_w0) / 2.0,
                1.0 - cos_w0,
                (1.0 - cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::HighPass => (
                (1.0 + cos_w0) / 2.0,
                -(1.0 + cos_w0),
                (1.0 + cos_w0) / 2.0,
                1.0 + alpha,
                -2.0 * cos_w0,
                1.0 - alpha,
            ),
            FilterKind::Peak => (
                1.0 + alpha * a,
                -2.0 * cos_w0,
                1.0 - alpha * a,
                1.0 + alpha / a,
                -2.0 * cos_w0,
                1.0 - alpha / a,
            ),
            FilterKind::LowShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterKind::HighShelf => {
                let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
        };

        BiquadCoeffs {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.b0, self.b1, self.b2, self.a1, self.a2]
            .iter()
            .all(|c| c.is_finite())
    }

    /// Gain at DC (z = 1)
    pub fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// Biquad delay line for one signal path
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

impl BiquadState {
    /// Process a single sample (Direct Form I)
    pub fn process(&mut self, input: f64, coeffs: &BiquadCoeffs) -> f64 {
        let output = coeffs.b0 * input + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sine_rms(coeffs: &BiquadCoeffs, frequency: f64, sample_rate: f64) -> f64 {
        let mut state = BiquadState::default();
        let n = (sample_rate * 0.1) as usize;
        let mut sum = 0.0;
        for i in 0..n {
            let x = (2.0 * PI * frequency * i as f64 / sample_rate).sin();
            let y = state.process(x, coeffs);
            // Skip the transient
            if i > n / 2 {
                sum += y * y;
            }
        }
        (sum / (n - n / 2 - 1) as f64).sqrt()
    }

    #[test]
    fn test_low_pass_passes_dc() {
        let coeffs = FilterEffect::low_pass(1000.0).coefficients(48000.0).unwrap();
        assert_relative_eq!(coeffs.dc_gain(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_high_pass_blocks_dc() {
        let coeffs = FilterEffect::high_pass(1000.0).coefficients(48000.0).unwrap();
        assert_relative_eq!(coeffs.dc_gain(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_low_pass_attenuates_highs() {
        let coeffs = FilterEffect::low_pass(1000.0).coefficients(48000.0).unwrap();
        let low = sine_rms(&coeffs, 200.0, 48000.0);
        let high = sine_rms(&coeffs, 8000.0, 48000.0);
        assert!(low > 0.6, "low band should pass, got {}", low);
        assert!(high < 0.05, "high band should be attenuated, got {}", high);
    }

    #[test]
    fn test_zero_gain_peak_is_transparent() {
        let coeffs = FilterEffect::peak(1000.0, 0.0, 1.0).coefficients(48000.0).unwrap();
        assert_relative_eq!(coeffs.b0, 1.0, epsilon = 1e-12);
        assert_relative_eq!(coeffs.b1, coeffs.a1, epsilon = 1e-12);
        assert_relative_eq!(coeffs.b2, coeffs.a2, epsilon = 1e-12);
    }

    #[test]
    fn test_nan_parameters_give_no_coefficients() {
        assert!(FilterEffect::low_pass(f64::NAN).coefficients(48000.0).is_none());
        assert!(FilterEffect::peak(1000.0, f64::NAN, 1.0)
            .coefficients(48000.0)
            .is_none());
        let mut effect = FilterEffect::high_pass(200.0);
        effect.q = f64::NAN;
        assert!(effect.coefficients(48000.0).is_none());
    }

    #[test]
    fn test_tiny_sample_rate_does_not_panic() {
        let coeffs = BiquadCoeffs::calculate(FilterKind::LowPass, 30.0, 1000.0, 0.0, 0.707);
        assert!(coeffs.b0.is_finite());
        assert!(FilterEffect::low_pass(1000.0).coefficients(0.0).is_none());
    }

    #[test]
    fn test_effect_json_shape() {
        let json = r#"{"type":"filter","kind":"high_pass","frequency":120.0}"#;
        let effect: TrackEffect = serde_json::from_str(json).unwrap();
        assert_eq!(effect, TrackEffect::Filter(FilterEffect::high_pass(120.0)));
        assert!(effect.is_enabled());
    }
}
