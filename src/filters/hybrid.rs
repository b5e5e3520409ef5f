use super::{
    adaptive::AdaptiveSmoother,
    kalman::{KalmanPoseFilter, KalmanTuning},
    PoseSample,
};
use crate::utils::{clamp_unit, shortest_angle_delta3, wrap_degrees3};

/// Kalman prediction refined by adaptive smoothing.
///
/// The two outputs are blended by the current stability score: a stable
/// track leans on the Kalman estimate, an unstable one on the more heavily
/// smoothed adaptive output.
#[derive(Debug, Clone, Default)]
pub struct HybridFilter {
    kalman: KalmanPoseFilter,
    adaptive: AdaptiveSmoother,
}

impl HybridFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn seeded(seed: Option<(PoseSample, f64)>, tuning: KalmanTuning) -> Self {
        Self {
            adaptive: AdaptiveSmoother::seeded(seed.as_ref().map(|(sample, _)| sample.clone())),
            kalman: KalmanPoseFilter::seeded(seed, tuning),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &mut self,
        measurement: &PoseSample,
        confidence: f64,
        stability: f64,
        timestamp: f64,
        tuning: KalmanTuning,
        floor: f64,
        ceiling: f64,
    ) -> PoseSample {
        let predicted = self.kalman.apply(measurement, confidence, timestamp, tuning);
        let refined = self.adaptive.apply(&predicted, confidence, floor, ceiling);
        blend(&refined, &predicted, stability)
    }

    #[must_use]
    pub fn kalman(&self) -> &KalmanPoseFilter {
        &self.kalman
    }
}

/// `from + (to - from) * weight`, angles along the shortest arc
#[must_use]
pub fn blend(from: &PoseSample, to: &PoseSample, weight: f64) -> PoseSample {
    let weight = clamp_unit(weight);
    PoseSample {
        position: from.position.lerp(&to.position, weight),
        rotation: wrap_degrees3(&(from.rotation + shortest_angle_delta3(&from.rotation, &to.rotation) * weight)),
        scale: (to.scale - from.scale).mul_add(weight, from.scale),
    }
}
