use super::PoseSample;
use crate::utils::{shortest_angle_delta3, wrap_degrees3};
use nalgebra::Vector3;

/// Per-channel smoothing factors; 0 passes the target through, values near 1
/// hold the previous output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingFactors {
    pub position: f64,
    pub rotation: f64,
    pub scale: f64,
}

impl SmoothingFactors {
    /// Same factor on every channel
    #[must_use]
    pub fn uniform(factor: f64) -> Self {
        Self {
            position: factor,
            rotation: factor,
            scale: factor,
        }
    }
}

/// `smoothed + (target - smoothed) * (1 - factor)`
#[must_use]
pub fn smooth_scalar(smoothed: f64, target: f64, factor: f64) -> f64 {
    (target - smoothed).mul_add(1.0 - factor, smoothed)
}

#[must_use]
pub fn smooth_vector(smoothed: &Vector3<f64>, target: &Vector3<f64>, factor: f64) -> Vector3<f64> {
    smoothed + (target - smoothed) * (1.0 - factor)
}

/// Exponential smoothing of Euler angles along the shortest path, so that
/// crossing +/-180 degrees does not swing the long way round
#[must_use]
pub fn smooth_angles(smoothed: &Vector3<f64>, target: &Vector3<f64>, factor: f64) -> Vector3<f64> {
    let delta = shortest_angle_delta3(smoothed, target);
    wrap_degrees3(&(smoothed + delta * (1.0 - factor)))
}

/// Exponential smoothing over position, rotation and scale
#[derive(Debug, Clone, Default)]
pub struct ExponentialSmoother {
    last: Option<PoseSample>,
}

impl ExponentialSmoother {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Smoother that continues from `seed` instead of snapping to the first target
    #[must_use]
    pub fn seeded(seed: Option<PoseSample>) -> Self {
        Self { last: seed }
    }

    pub fn apply(&mut self, target: &PoseSample, factors: SmoothingFactors) -> PoseSample {
        let filtered = match &self.last {
            Some(last) => PoseSample {
                position: smooth_vector(&last.position, &target.position, factors.position),
                rotation: smooth_angles(&last.rotation, &target.rotation, factors.rotation),
                scale: smooth_scalar(last.scale, target.scale, factors.scale),
            },
            None => target.clone(),
        };
        self.last = Some(filtered.clone());
        filtered
    }

    #[must_use]
    pub fn last(&self) -> Option<&PoseSample> {
        self.last.as_ref()
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
