//! Temporal stabilization of the raw head pose.
//!
//! Four interchangeable strategies smooth position, rotation (Euler degrees)
//! and scale. Switching strategy at runtime seeds the new one from the last
//! output so the glasses never jump.

/// Exponential smoothing with fixed per-channel factors
pub mod exponential;

/// Constant-velocity Kalman filter
pub mod kalman;

/// Confidence-driven exponential smoothing
pub mod adaptive;

/// Kalman followed by adaptive smoothing
pub mod hybrid;

/// Windowed moving average for anchor offsets
pub mod moving_average;

/// Frame-to-frame jump rejection
pub mod outlier;

use crate::{
    pose_estimation::HeadPose,
    utils::{clamp_unit, wrap_degrees3},
    Error, Result,
};
use adaptive::AdaptiveSmoother;
use exponential::{ExponentialSmoother, SmoothingFactors};
use hybrid::HybridFilter;
use kalman::{KalmanPoseFilter, KalmanTuning};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use outlier::{OutlierDecision, OutlierGate};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Pose in filter space: position, `(roll, pitch, yaw)` degrees, scale
#[derive(Debug, Clone, PartialEq)]
pub struct PoseSample {
    pub position: Vector3<f64>,
    pub rotation: Vector3<f64>,
    pub scale: f64,
}

impl PoseSample {
    #[must_use]
    pub fn from_pose(pose: &HeadPose) -> Self {
        Self {
            position: pose.position.coords,
            rotation: pose.euler_degrees(),
            scale: pose.scale,
        }
    }

    #[must_use]
    pub fn to_pose(&self) -> HeadPose {
        HeadPose {
            position: Point3::from(self.position),
            rotation: quaternion_from_degrees(&self.rotation),
            scale: self.scale,
        }
    }
}

/// Quaternion from `(roll, pitch, yaw)` degrees
#[must_use]
pub fn quaternion_from_degrees(angles: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(angles.x.to_radians(), angles.y.to_radians(), angles.z.to_radians())
}

/// Smoothing strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Basic,
    Kalman,
    Adaptive,
    #[default]
    Hybrid,
}

impl AlgorithmKind {
    pub const ALL: [Self; 4] = [Self::Basic, Self::Kalman, Self::Adaptive, Self::Hybrid];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Kalman => "kalman",
            Self::Adaptive => "adaptive",
            Self::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AlgorithmKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "basic" | "exponential" => Ok(Self::Basic),
            "kalman" => Ok(Self::Kalman),
            "adaptive" => Ok(Self::Adaptive),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(Error::InvalidConfiguration(format!("Unknown algorithm: {s}"))),
        }
    }
}

/// Per-frame filter parameters, derived from the positioning config
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterParams {
    pub factors: SmoothingFactors,
    /// Lower bound of the adaptive factor (full confidence)
    pub adaptive_floor: f64,
    /// Upper bound of the adaptive factor (zero confidence)
    pub adaptive_ceiling: f64,
    pub kalman: KalmanTuning,
    pub outlier_threshold: f64,
    pub max_outliers: usize,
    pub position_offset: Vector3<f64>,
    pub rotation_offset: Vector3<f64>,
}

/// The active smoothing strategy and its state
#[derive(Debug, Clone)]
pub enum Strategy {
    Basic(ExponentialSmoother),
    Kalman(KalmanPoseFilter),
    Adaptive(AdaptiveSmoother),
    Hybrid(HybridFilter),
}

impl Strategy {
    /// Fresh strategy of `kind`, continuing from `seed` when given
    #[must_use]
    pub fn new(kind: AlgorithmKind, seed: Option<(PoseSample, f64)>, tuning: KalmanTuning) -> Self {
        match kind {
            AlgorithmKind::Basic => Self::Basic(ExponentialSmoother::seeded(seed.map(|(s, _)| s))),
            AlgorithmKind::Kalman => Self::Kalman(KalmanPoseFilter::seeded(seed, tuning)),
            AlgorithmKind::Adaptive => Self::Adaptive(AdaptiveSmoother::seeded(seed.map(|(s, _)| s))),
            AlgorithmKind::Hybrid => Self::Hybrid(HybridFilter::seeded(seed, tuning)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            Self::Basic(_) => AlgorithmKind::Basic,
            Self::Kalman(_) => AlgorithmKind::Kalman,
            Self::Adaptive(_) => AlgorithmKind::Adaptive,
            Self::Hybrid(_) => AlgorithmKind::Hybrid,
        }
    }

    /// Filter one measurement
    pub fn apply(
        &mut self,
        measurement: &PoseSample,
        confidence: f64,
        stability: f64,
        timestamp: f64,
        params: &FilterParams,
    ) -> PoseSample {
        match self {
            Self::Basic(filter) => filter.apply(measurement, params.factors),
            Self::Kalman(filter) => filter.apply(measurement, confidence, timestamp, params.kalman),
            Self::Adaptive(filter) => {
                filter.apply(measurement, confidence, params.adaptive_floor, params.adaptive_ceiling)
            }
            Self::Hybrid(filter) => filter.apply(
                measurement,
                confidence,
                stability,
                timestamp,
                params.kalman,
                params.adaptive_floor,
                params.adaptive_ceiling,
            ),
        }
    }
}

/// Smoothed placement of the glasses for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct GlassesPositionState {
    pub position: Point3<f64>,
    /// `(roll, pitch, yaw)` degrees, each in (-180, 180]
    pub rotation: Vector3<f64>,
    pub scale: f64,
    pub confidence: f64,
    pub is_stable: bool,
    pub timestamp: f64,
}

impl GlassesPositionState {
    #[must_use]
    pub fn quaternion(&self) -> UnitQuaternion<f64> {
        quaternion_from_degrees(&self.rotation)
    }

    #[must_use]
    pub fn to_pose(&self) -> HeadPose {
        HeadPose {
            position: self.position,
            rotation: self.quaternion(),
            scale: self.scale,
        }
    }
}

/// One filtered frame
#[derive(Debug, Clone, PartialEq)]
pub struct StabilizedFrame {
    /// Output with offsets applied
    pub state: GlassesPositionState,
    /// Filtered pose before offsets
    pub filtered: PoseSample,
    pub rejected: bool,
}

/// Strategy plus outlier gating, offsets and the last output
#[derive(Debug, Clone)]
pub struct Stabilizer {
    strategy: Strategy,
    gate: OutlierGate,
    last: Option<(PoseSample, f64)>,
    last_state: Option<GlassesPositionState>,
}

impl Stabilizer {
    #[must_use]
    pub fn new(kind: AlgorithmKind, tuning: KalmanTuning) -> Self {
        Self {
            strategy: Strategy::new(kind, None, tuning),
            gate: OutlierGate::new(),
            last: None,
            last_state: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> AlgorithmKind {
        self.strategy.kind()
    }

    /// Replace the strategy, seeding it from the last output.
    ///
    /// Returns `false` if `kind` is already active.
    pub fn set_algorithm(&mut self, kind: AlgorithmKind, tuning: KalmanTuning) -> bool {
        if kind == self.strategy.kind() {
            return false;
        }
        self.strategy = Strategy::new(kind, self.last.clone(), tuning);
        true
    }

    /// Gate and filter one raw pose
    pub fn apply(
        &mut self,
        raw: &PoseSample,
        confidence: f64,
        stability: f64,
        timestamp: f64,
        params: &FilterParams,
    ) -> StabilizedFrame {
        let decision = self.gate.check(&raw.position, params.outlier_threshold, params.max_outliers);

        if decision == OutlierDecision::Rejected {
            if let (Some((filtered, _)), Some(state)) = (&self.last, &self.last_state) {
                return StabilizedFrame {
                    state: GlassesPositionState {
                        timestamp,
                        ..state.clone()
                    },
                    filtered: filtered.clone(),
                    rejected: true,
                };
            }
        }

        let filtered = self.strategy.apply(raw, confidence, stability, timestamp, params);
        let state = GlassesPositionState {
            position: Point3::from(filtered.position + params.position_offset),
            rotation: wrap_degrees3(&(filtered.rotation + params.rotation_offset)),
            scale: filtered.scale,
            confidence: clamp_unit(confidence),
            is_stable: false,
            timestamp,
        };
        self.last = Some((filtered.clone(), timestamp));
        self.last_state = Some(state.clone());

        StabilizedFrame {
            state,
            filtered,
            rejected: false,
        }
    }

    /// Last output, if any frame has been filtered
    #[must_use]
    pub fn last_state(&self) -> Option<&GlassesPositionState> {
        self.last_state.as_ref()
    }

    /// Last filtered pose before offsets
    #[must_use]
    pub fn last_filtered(&self) -> Option<&PoseSample> {
        self.last.as_ref().map(|(sample, _)| sample)
    }

    /// Mark the last output stable or not
    pub fn set_stable(&mut self, is_stable: bool) {
        if let Some(state) = self.last_state.as_mut() {
            state.is_stable = is_stable;
        }
    }

    /// Forget the outlier reference so the next position is accepted as is.
    /// Filter state is kept, so the output re-converges instead of jumping.
    pub fn reset_gate(&mut self) {
        self.gate.reset();
    }

    /// Drop all filter state, keeping the selected algorithm
    pub fn reset(&mut self, tuning: KalmanTuning) {
        *self = Self::new(self.kind(), tuning);
    }
}
