//! Tracking quality scores computed from the bounded pose history.
//!
//! Every score lies in `[0, 1]`, higher is better. Distances are normalized
//! by the current eye distance so the scores do not depend on how far the
//! face is from the camera.

use crate::{
    constants::{DEFAULT_EYE_DISTANCE, EPSILON},
    face_geometry::FaceGeometry,
    history::{PoseRecord, TrackingHistory},
    utils::clamp_unit,
    Error, Result,
};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Relative weights of the four component scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub stability: f64,
    pub accuracy: f64,
    pub smoothness: f64,
    pub responsiveness: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            stability: 0.3,
            accuracy: 0.3,
            smoothness: 0.2,
            responsiveness: 0.2,
        }
    }
}

impl QualityWeights {
    fn total(&self) -> f64 {
        self.stability + self.accuracy + self.smoothness + self.responsiveness
    }
}

/// Quality scoring parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    /// Number of recent frames scored
    pub window: usize,
    /// Position standard deviation, as a fraction of eye distance, that scores 0.5 stability
    pub variance_fraction: f64,
    /// Mean second difference, as a fraction of eye distance, that scores 0.5 smoothness
    pub jerk_fraction: f64,
    /// Expected eye-distance to face-width ratio, `[low, high]`
    pub eye_face_ratio_band: [f64; 2],
    /// Raw jump, as a fraction of eye distance, that counts as a step change
    pub step_fraction: f64,
    /// Residual, as a fraction of the step, below which the filter has converged
    pub convergence_fraction: f64,
    /// Lag in frames that scores 0 responsiveness
    pub max_lag_frames: usize,
    pub weights: QualityWeights,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            window: 30,
            variance_fraction: 0.05,
            jerk_fraction: 0.02,
            eye_face_ratio_band: [0.35, 0.6],
            step_fraction: 0.25,
            convergence_fraction: 0.1,
            max_lag_frames: 15,
            weights: QualityWeights::default(),
        }
    }
}

impl QualityConfig {
    /// Validate the scoring parameters
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.window < 3 {
            return Err(Error::InvalidConfiguration(format!(
                "quality window must be at least 3, got {}",
                self.window
            )));
        }
        if self.max_lag_frames == 0 {
            return Err(Error::InvalidConfiguration("max_lag_frames must be positive".to_string()));
        }
        for (name, value) in [
            ("variance_fraction", self.variance_fraction),
            ("jerk_fraction", self.jerk_fraction),
            ("step_fraction", self.step_fraction),
            ("convergence_fraction", self.convergence_fraction),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfiguration(format!("{name} must be positive, got {value}")));
            }
        }
        let [low, high] = self.eye_face_ratio_band;
        if !(low.is_finite() && high.is_finite() && 0.0 < low && low < high) {
            return Err(Error::InvalidConfiguration(format!(
                "eye_face_ratio_band must satisfy 0 < low < high, got [{low}, {high}]"
            )));
        }
        let w = &self.weights;
        let weights = [w.stability, w.accuracy, w.smoothness, w.responsiveness];
        if weights.iter().any(|v| !(v.is_finite() && *v >= 0.0)) || w.total() <= EPSILON {
            return Err(Error::InvalidConfiguration(
                "quality weights must be non-negative with a positive sum".to_string(),
            ));
        }
        Ok(())
    }
}

/// Component and aggregate quality of the current track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositioningQuality {
    pub stability: f64,
    pub accuracy: f64,
    pub smoothness: f64,
    pub responsiveness: f64,
    pub overall: f64,
}

impl PositioningQuality {
    /// Quality reported before any frame has been scored
    #[must_use]
    pub fn zero() -> Self {
        Self {
            stability: 0.0,
            accuracy: 0.0,
            smoothness: 0.0,
            responsiveness: 0.0,
            overall: 0.0,
        }
    }
}

/// Summary quality for consumers gating the overlay
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MappingQuality {
    /// Aggregate quality score
    pub confidence: f64,
    pub stability: f64,
    pub accuracy: f64,
    /// Consecutive frames without a usable detection
    pub tracking_loss: u32,
}

impl MappingQuality {
    #[must_use]
    pub fn new(quality: &PositioningQuality, tracking_loss: u32) -> Self {
        Self {
            confidence: clamp_unit(quality.overall),
            stability: clamp_unit(quality.stability),
            accuracy: clamp_unit(quality.accuracy),
            tracking_loss,
        }
    }
}

/// Scores the recent history. Stateless.
#[derive(Debug, Clone, Default)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl QualityScorer {
    #[must_use]
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Score the newest `window` records plus the latest detection
    #[must_use]
    pub fn score(&self, history: &TrackingHistory, geometry: Option<&FaceGeometry>, confidence: f64) -> PositioningQuality {
        let records = history.recent(self.config.window);
        let reference = geometry
            .map(|g| g.eye_distance)
            .filter(|d| d.is_finite() && *d > EPSILON)
            .unwrap_or(DEFAULT_EYE_DISTANCE);

        let stability = self.stability(&records, reference);
        let accuracy = self.accuracy(geometry, confidence);
        let smoothness = self.smoothness(&records, reference);
        let responsiveness = self.responsiveness(&records, reference);

        let w = &self.config.weights;
        let overall = (w.stability * stability
            + w.accuracy * accuracy
            + w.smoothness * smoothness
            + w.responsiveness * responsiveness)
            / w.total().max(EPSILON);

        PositioningQuality {
            stability,
            accuracy,
            smoothness,
            responsiveness,
            overall: clamp_unit(overall),
        }
    }

    /// `1 - v / (v + ref^2)` over the variance `v` of filtered positions
    fn stability(&self, records: &[&PoseRecord], reference: f64) -> f64 {
        let positions: Vec<Point3<f64>> = records.iter().map(|r| r.position).collect();
        let variance = position_variance(&positions);
        let scale = (self.config.variance_fraction * reference).powi(2);
        clamp_unit(1.0 - variance / (variance + scale))
    }

    /// Detector confidence times the face's geometric self-consistency
    fn accuracy(&self, geometry: Option<&FaceGeometry>, confidence: f64) -> f64 {
        let Some(ratio) = geometry.and_then(FaceGeometry::eye_to_face_width_ratio) else {
            return 0.0;
        };
        let [low, high] = self.config.eye_face_ratio_band;
        let width = high - low;
        let outside = if ratio < low {
            low - ratio
        } else if ratio > high {
            ratio - high
        } else {
            0.0
        };
        let consistency = clamp_unit(1.0 - outside / width);
        clamp_unit(clamp_unit(confidence) * consistency)
    }

    /// Inverse of the mean second difference of filtered positions
    fn smoothness(&self, records: &[&PoseRecord], reference: f64) -> f64 {
        if records.len() < 3 {
            return 1.0;
        }
        let jerk: f64 = records
            .windows(3)
            .map(|w| (w[2].position.coords - 2.0 * w[1].position.coords + w[0].position.coords).norm())
            .sum::<f64>()
            / (records.len() - 2) as f64;
        clamp_unit(1.0 / (1.0 + jerk / (self.config.jerk_fraction * reference)))
    }

    /// Frames taken by the filtered output to converge after the latest raw
    /// step, mapped to `1 - lag / max_lag`. No step in the window scores 1.
    fn responsiveness(&self, records: &[&PoseRecord], reference: f64) -> f64 {
        let threshold = self.config.step_fraction * reference;
        let step = (1..records.len()).rev().find_map(|k| {
            let jump = nalgebra::distance(&records[k].raw_position, &records[k - 1].raw_position);
            (jump > threshold).then_some((k, jump))
        });
        let Some((start, size)) = step else {
            return 1.0;
        };

        let tolerance = self.config.convergence_fraction * size;
        let lag = records[start..]
            .iter()
            .position(|r| nalgebra::distance(&r.position, &r.raw_position) <= tolerance)
            .unwrap_or(records.len() - start);
        clamp_unit(1.0 - lag as f64 / self.config.max_lag_frames as f64)
    }
}

/// Sum of the per-axis variances of `points`
#[must_use]
pub fn position_variance(points: &[Point3<f64>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let n = points.len() as f64;
    let mean = points.iter().map(|p| p.coords).sum::<nalgebra::Vector3<f64>>() / n;
    points.iter().map(|p| (p.coords - mean).norm_squared()).sum::<f64>() / n
}
