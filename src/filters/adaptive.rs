use super::{
    exponential::{ExponentialSmoother, SmoothingFactors},
    PoseSample,
};
use crate::utils::clamp_unit;

/// Smoothing factor for a frame of the given confidence.
///
/// Full confidence gives `floor`, zero confidence gives `ceiling`, linear in
/// between. The result always lies in `[floor, ceiling]`.
#[must_use]
pub fn adaptive_factor(confidence: f64, floor: f64, ceiling: f64) -> f64 {
    let factor = (ceiling - floor).mul_add(1.0 - clamp_unit(confidence), floor);
    factor.clamp(floor.min(ceiling), ceiling.max(floor))
}

/// Exponential smoothing whose factor follows detection confidence:
/// heavier smoothing when the detector is unsure
#[derive(Debug, Clone, Default)]
pub struct AdaptiveSmoother {
    smoother: ExponentialSmoother,
    last_factor: Option<f64>,
}

impl AdaptiveSmoother {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn seeded(seed: Option<PoseSample>) -> Self {
        Self {
            smoother: ExponentialSmoother::seeded(seed),
            last_factor: None,
        }
    }

    pub fn apply(&mut self, target: &PoseSample, confidence: f64, floor: f64, ceiling: f64) -> PoseSample {
        let factor = adaptive_factor(confidence, floor, ceiling);
        self.last_factor = Some(factor);
        self.smoother.apply(target, SmoothingFactors::uniform(factor))
    }

    /// Factor used for the most recent frame
    #[must_use]
    pub fn last_factor(&self) -> Option<f64> {
        self.last_factor
    }

    pub fn reset(&mut self) {
        self.smoother.reset();
        self.last_factor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn test_factor_follows_confidence() {
        assert!((adaptive_factor(1.0, 0.3, 0.95) - 0.3).abs() < 1e-12);
        assert!((adaptive_factor(0.0, 0.3, 0.95) - 0.95).abs() < 1e-12);
        assert!((adaptive_factor(0.5, 0.3, 0.95) - 0.625).abs() < 1e-12);
    }

    #[test]
    fn test_factor_bounded_for_bad_confidence() {
        for confidence in [-3.0, 7.0, f64::NAN, f64::INFINITY] {
            let factor = adaptive_factor(confidence, 0.3, 0.95);
            assert!((0.3..=0.95).contains(&factor));
        }
    }

    #[test]
    fn test_low_confidence_smooths_more() {
        let start = PoseSample {
            position: Vector3::zeros(),
            rotation: Vector3::zeros(),
            scale: 1.0,
        };
        let target = PoseSample {
            position: Vector3::new(10.0, 0.0, 0.0),
            ..start.clone()
        };

        let mut sure = AdaptiveSmoother::seeded(Some(start.clone()));
        let mut unsure = AdaptiveSmoother::seeded(Some(start));
        let a = sure.apply(&target, 1.0, 0.3, 0.95);
        let b = unsure.apply(&target, 0.1, 0.3, 0.95);
        assert!(a.position.x > b.position.x);
        assert!(unsure.last_factor().unwrap() > sure.last_factor().unwrap());
    }
}
