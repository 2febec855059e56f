//! Double-single ("high/low") encoding of planet-scale coordinates.
//!
//! A 32-bit float carries 24 bits of mantissa, which at Mercator magnitudes
//! (up to ~2e7 m) resolves no better than a couple of meters. Splitting each
//! `f64` into a coarse `high` part (a multiple of 65536) and a small `low`
//! remainder keeps sub-meter precision once the GPU recombines `high + low`
//! relative to an equally-split camera position.

/// Granularity of the `high` half.
pub const SPLIT_STEP: f64 = 65536.0;

/// A value encoded as two `f32` halves.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct DoubleSingle {
    pub high: f32,
    pub low: f32,
}

impl DoubleSingle {
    pub fn new(value: f64) -> Self {
        let (high, low) = split_f64(value);
        Self { high, low }
    }

    /// Recombined value, widened back to `f64`.
    pub fn value(self) -> f64 {
        f64::from(self.high) + f64::from(self.low)
    }
}

/// Split `value` into `(high, low)`.
///
/// `high` is truncated toward zero to a multiple of [`SPLIT_STEP`], so `low`
/// keeps the sign of `value` and `|low| < SPLIT_STEP`.
#[inline]
pub fn split_f64(value: f64) -> (f32, f32) {
    if value >= 0.0 {
        let high = (value / SPLIT_STEP).floor() * SPLIT_STEP;
        (high as f32, (value - high) as f32)
    } else {
        let high = (-value / SPLIT_STEP).floor() * SPLIT_STEP;
        (-high as f32, (value + high) as f32)
    }
}

/// Append the high and low halves of every value of `values` to the two outputs.
pub fn split_into(values: &[f64], high: &mut Vec<f32>, low: &mut Vec<f32>) {
    high.reserve(values.len());
    low.reserve(values.len());
    for &v in values {
        let (h, l) = split_f64(v);
        high.push(h);
        low.push(l);
    }
}

#[cfg(test)]
mod tests {
    use super::{DoubleSingle, SPLIT_STEP, split_f64, split_into};
    use crate::math::mercator::POLE;

    fn assert_round_trip(v: f64) {
        let (high, low) = split_f64(v);
        assert_eq!(f64::from(high) % SPLIT_STEP, 0.0, "high of {v} not a step multiple");
        assert!(f64::from(low).abs() < SPLIT_STEP);
        // The recombined value is the input rounded to f32 precision of the remainder.
        assert_eq!(high + low, v as f32, "f32 reconstruction of {v}");
        assert!((DoubleSingle::new(v).value() - v).abs() < 1e-2, "f64 reconstruction of {v}");
    }

    #[test]
    fn zero() {
        assert_eq!(split_f64(0.0), (0.0, 0.0));
        assert_round_trip(0.0);
    }

    #[test]
    fn small_values_live_in_low() {
        assert_eq!(split_f64(12.5), (0.0, 12.5));
        assert_eq!(split_f64(-12.5), (0.0, -12.5));
        assert_round_trip(0.001);
        assert_round_trip(-0.001);
    }

    #[test]
    fn step_boundary() {
        assert_eq!(split_f64(SPLIT_STEP), (65536.0, 0.0));
        assert_eq!(split_f64(SPLIT_STEP - 0.5), (0.0, 65535.5));
        assert_eq!(split_f64(-SPLIT_STEP - 0.25), (-65536.0, -0.25));
        assert_round_trip(SPLIT_STEP + 1e-3);
    }

    #[test]
    fn planetary_magnitudes_keep_sub_meter_precision() {
        for v in [6_378_137.0, -6_378_137.123, POLE, -POLE, 19_999_999.875] {
            assert_round_trip(v);
        }
        // f32 alone would lose the fraction at this magnitude.
        let v = 20_000_000.125_f64;
        assert_ne!(f64::from(v as f32), v);
        assert_eq!(DoubleSingle::new(v).value(), v);
    }

    #[test]
    fn split_into_appends_in_order() {
        let mut high = vec![1.0];
        let mut low = vec![2.0];
        split_into(&[70_000.5, -3.0], &mut high, &mut low);
        assert_eq!(high, vec![1.0, 65536.0, 0.0]);
        assert_eq!(low, vec![2.0, 4464.5, -3.0]);
    }
}
