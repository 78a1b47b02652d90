//! Response curve and attack/decay smoothing applied to each band level.

use std::f32::consts::PI;

use crate::config::BandShape;

use super::features::finite_unit;

/// Sine ease-in-out over 0-1.
pub fn ease(x: f32) -> f32 {
    (1.0 - (PI * x).cos()) / 2.0
}

/// Power curve, easing, then amplification. Output stays in 0-1.
pub fn shape(raw: f32, band: &BandShape) -> f32 {
    let curved = finite_unit(raw).powf(band.exponent);
    finite_unit(ease(curved) * band.amplification)
}

/// One step of the asymmetric smoother: `attack` while rising, `decay` while falling.
pub fn smooth(current: f32, target: f32, band: &BandShape) -> f32 {
    let coeff = if target > current { band.attack } else { band.decay };
    finite_unit(current + (target - current) * coeff)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn ease_endpoints() {
        assert!(ease(0.0).abs() < 1e-6);
        assert!((ease(0.5) - 0.5).abs() < 1e-6);
        assert!((ease(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn low_exponent_lifts_quiet_input() {
        let mut band = EngineConfig::default().high;
        band.exponent = 1.0;
        let linear = shape(0.2, &band);
        band.exponent = 0.5;
        assert!(shape(0.2, &band) > linear);
    }

    #[test]
    fn amplification_reclamps() {
        let mid = EngineConfig::default().mid;
        assert_eq!(shape(0.9, &mid), 1.0);
        assert_eq!(shape(0.0, &mid), 0.0);
    }

    #[test]
    fn nan_input_is_silence() {
        assert_eq!(shape(f32::NAN, &EngineConfig::default().low), 0.0);
    }

    #[test]
    fn rises_faster_than_it_falls() {
        let low = EngineConfig::default().low;
        let up = smooth(0.0, 1.0, &low);
        let down = 1.0 - smooth(1.0, 0.0, &low);
        assert!((up - 0.5).abs() < 1e-6);
        assert!(down < up);
    }

    #[test]
    fn smoothing_converges_on_target() {
        let level = EngineConfig::default().level;
        let mut value = 1.0;
        for _ in 0..200 {
            value = smooth(value, 0.0, &level);
        }
        assert!(value < 1e-6);
    }
}
