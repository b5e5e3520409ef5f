use super::{exponential::smooth_scalar, PoseSample};
use crate::{
    constants::{DEFAULT_FPS, KALMAN_INITIAL_COVARIANCE, MAX_KALMAN_DT, MIN_KALMAN_DT},
    utils::{shortest_angle_delta3, wrap_degrees3},
};
use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

/// State: [x, y, z, vx, vy, vz]
type State = SVector<f64, 6>;
type Matrix6 = SMatrix<f64, 6, 6>;
/// Measurement matrix (we only measure position)
type Matrix3x6 = SMatrix<f64, 3, 6>;
type Matrix6x3 = SMatrix<f64, 6, 3>;

/// Constant-velocity Kalman filter over three axes
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanFilterState {
    state: State,
    covariance: Matrix6,
    /// White-acceleration spectral density
    process_noise: f64,
    /// Measurement variance at full confidence
    measurement_noise: f64,
    /// Time step of the last predict
    dt: f64,
    /// Innovations and state are wrapped to (-180, 180] degrees
    angular: bool,
}

impl KalmanFilterState {
    /// Filter initialized at `position` with zero velocity
    #[must_use]
    pub fn new(position: Vector3<f64>, process_noise: f64, measurement_noise: f64, angular: bool) -> Self {
        let mut state = State::zeros();
        state.fixed_rows_mut::<3>(0).copy_from(&position);
        Self {
            state,
            covariance: Matrix6::identity() * KALMAN_INITIAL_COVARIANCE,
            process_noise,
            measurement_noise,
            dt: 1.0 / DEFAULT_FPS,
            angular,
        }
    }

    /// State transition matrix for `dt`
    fn transition(dt: f64) -> Matrix6 {
        let mut transition = Matrix6::identity();
        transition.fixed_view_mut::<3, 3>(0, 3).copy_from(&(Matrix3::identity() * dt));
        transition
    }

    fn measurement() -> Matrix3x6 {
        let mut h = Matrix3x6::zeros();
        h.fixed_view_mut::<3, 3>(0, 0).copy_from(&Matrix3::identity());
        h
    }

    /// Discrete white-noise acceleration model
    fn process_covariance(&self, dt: f64) -> Matrix6 {
        let q = self.process_noise;
        let mut covariance = Matrix6::zeros();
        for axis in 0..3 {
            covariance[(axis, axis)] = q * dt.powi(4) / 4.0;
            covariance[(axis, axis + 3)] = q * dt.powi(3) / 2.0;
            covariance[(axis + 3, axis)] = q * dt.powi(3) / 2.0;
            covariance[(axis + 3, axis + 3)] = q * dt.powi(2);
        }
        covariance
    }

    /// `x' = x + v*dt`, `v' = v`
    pub fn predict(&mut self, dt: f64) {
        let dt = clamp_dt(dt);
        let transition = Self::transition(dt);

        // Predict state
        self.state = transition * self.state;
        if self.angular {
            let wrapped = wrap_degrees3(&self.position());
            self.state.fixed_rows_mut::<3>(0).copy_from(&wrapped);
        }

        // Predict covariance
        self.covariance = transition * self.covariance * transition.transpose() + self.process_covariance(dt);
        self.dt = dt;
    }

    /// Blend a measurement into the prediction.
    ///
    /// Measurement noise is scaled by `1 / confidence`; at confidence 0 the
    /// measurement carries no weight and the state is left untouched.
    /// Returns whether the update was applied.
    pub fn update(&mut self, measurement: &Vector3<f64>, confidence: f64) -> bool {
        if confidence.is_nan() || confidence <= 0.0 || !measurement.iter().all(|v| v.is_finite()) {
            return false;
        }
        let h = Self::measurement();
        let noise = Matrix3::identity() * (self.measurement_noise / confidence.min(1.0));

        // Innovation
        let predicted = h * self.state;
        let innovation = if self.angular {
            shortest_angle_delta3(&predicted, measurement)
        } else {
            measurement - predicted
        };

        // Innovation covariance
        let innovation_cov = h * self.covariance * h.transpose() + noise;
        let Some(inverse) = innovation_cov.try_inverse() else {
            return false;
        };

        // Kalman gain
        let gain: Matrix6x3 = self.covariance * h.transpose() * inverse;

        // Update state
        self.state += gain * innovation;
        if self.angular {
            let wrapped = wrap_degrees3(&self.position());
            self.state.fixed_rows_mut::<3>(0).copy_from(&wrapped);
        }

        // Update covariance
        self.covariance = (Matrix6::identity() - gain * h) * self.covariance;
        true
    }

    #[must_use]
    pub fn position(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(0).into_owned()
    }

    #[must_use]
    pub fn velocity(&self) -> Vector3<f64> {
        self.state.fixed_rows::<3>(3).into_owned()
    }

    #[must_use]
    pub fn state(&self) -> &SVector<f64, 6> {
        &self.state
    }

    #[must_use]
    pub fn covariance(&self) -> &SMatrix<f64, 6, 6> {
        &self.covariance
    }

    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt
    }
}

/// Clamp a frame interval; a non-positive or non-finite interval falls back
/// to the default frame rate
#[must_use]
pub fn clamp_dt(dt: f64) -> f64 {
    if dt.is_finite() && dt > 0.0 {
        dt.clamp(MIN_KALMAN_DT, MAX_KALMAN_DT)
    } else {
        1.0 / DEFAULT_FPS
    }
}

/// Noise parameters for [`KalmanPoseFilter`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanTuning {
    pub process_noise: f64,
    pub measurement_noise: f64,
    /// Exponential smoothing factor for scale, which has no motion model
    pub scale_factor: f64,
}

/// Kalman filtering of position and Euler angles; scale is exponentially
/// smoothed
#[derive(Debug, Clone, Default)]
pub struct KalmanPoseFilter {
    position: Option<KalmanFilterState>,
    rotation: Option<KalmanFilterState>,
    scale: Option<f64>,
    last_timestamp: Option<f64>,
}

impl KalmanPoseFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter continuing from `seed` at `timestamp` with zero velocity
    #[must_use]
    pub fn seeded(seed: Option<(PoseSample, f64)>, tuning: KalmanTuning) -> Self {
        let Some((sample, timestamp)) = seed else {
            return Self::new();
        };
        let KalmanTuning {
            process_noise,
            measurement_noise,
            ..
        } = tuning;
        Self {
            position: Some(KalmanFilterState::new(sample.position, process_noise, measurement_noise, false)),
            rotation: Some(KalmanFilterState::new(sample.rotation, process_noise, measurement_noise, true)),
            scale: Some(sample.scale),
            last_timestamp: Some(timestamp),
        }
    }

    /// Predict to `timestamp`, then update with `measurement` weighted by `confidence`
    pub fn apply(&mut self, measurement: &PoseSample, confidence: f64, timestamp: f64, tuning: KalmanTuning) -> PoseSample {
        let dt = self.last_timestamp.map_or(1.0 / DEFAULT_FPS, |last| timestamp - last);
        self.last_timestamp = Some(timestamp);

        let position = Self::step(&mut self.position, &measurement.position, confidence, dt, tuning, false);
        let rotation = Self::step(&mut self.rotation, &measurement.rotation, confidence, dt, tuning, true);

        let scale = match self.scale {
            Some(last) if confidence > 0.0 => smooth_scalar(last, measurement.scale, tuning.scale_factor),
            Some(last) => last,
            None => measurement.scale,
        };
        self.scale = Some(scale);

        PoseSample {
            position,
            rotation,
            scale,
        }
    }

    fn step(
        filter: &mut Option<KalmanFilterState>,
        measurement: &Vector3<f64>,
        confidence: f64,
        dt: f64,
        tuning: KalmanTuning,
        angular: bool,
    ) -> Vector3<f64> {
        if let Some(state) = filter.as_mut() {
            state.process_noise = tuning.process_noise;
            state.measurement_noise = tuning.measurement_noise;
            state.predict(dt);
            state.update(measurement, confidence);
            return state.position();
        }
        let state = KalmanFilterState::new(*measurement, tuning.process_noise, tuning.measurement_noise, angular);
        let position = state.position();
        *filter = Some(state);
        position
    }

    #[must_use]
    pub fn position_state(&self) -> Option<&KalmanFilterState> {
        self.position.as_ref()
    }

    #[must_use]
    pub fn rotation_state(&self) -> Option<&KalmanFilterState> {
        self.rotation.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kalman_filter() {
        let mut filter = KalmanFilterState::new(Vector3::new(10.0, 20.0, 30.0), 2.5e5, 4.0, false);

        // Subsequent measurements should be smoothed
        filter.predict(1.0 / 30.0);
        filter.update(&Vector3::new(11.0, 21.0, 31.0), 1.0);
        let p = filter.position();
        assert!(p.x > 10.0 && p.x < 11.0);
        assert!(p.y > 20.0 && p.y < 21.0);
    }

    #[test]
    fn test_zero_confidence_skips_update() {
        let mut filter = KalmanFilterState::new(Vector3::new(1.0, 2.0, 3.0), 2.5e5, 4.0, false);
        filter.predict(1.0 / 30.0);
        filter.update(&Vector3::new(2.0, 3.0, 4.0), 1.0);
        filter.predict(1.0 / 30.0);

        let before = filter.clone();
        assert!(!filter.update(&Vector3::new(100.0, 100.0, 100.0), 0.0));
        assert_eq!(filter, before);
    }

    #[test]
    fn test_lower_confidence_trusts_measurement_less() {
        let mut confident = KalmanFilterState::new(Vector3::zeros(), 2.5e5, 4.0, false);
        let mut doubtful = confident.clone();
        confident.predict(1.0 / 30.0);
        doubtful.predict(1.0 / 30.0);
        confident.update(&Vector3::new(10.0, 0.0, 0.0), 1.0);
        doubtful.update(&Vector3::new(10.0, 0.0, 0.0), 0.1);
        assert!(confident.position().x > doubtful.position().x);
    }

    #[test]
    fn test_constant_velocity_tracking() {
        let mut filter = KalmanFilterState::new(Vector3::zeros(), 2.5e5, 4.0, false);
        let dt = 1.0 / 30.0;
        for i in 1..200 {
            filter.predict(dt);
            filter.update(&Vector3::new(f64::from(i) * 3.0, 0.0, 0.0), 1.0);
        }
        // 3 units per frame = 90 units per second
        assert!((filter.velocity().x - 90.0).abs() < 1.0);
    }

    #[test]
    fn test_angular_innovation_wraps() {
        let mut filter = KalmanFilterState::new(Vector3::new(0.0, 0.0, 175.0), 2.5e5, 4.0, true);
        filter.predict(1.0 / 30.0);
        filter.update(&Vector3::new(0.0, 0.0, -175.0), 1.0);
        let yaw = filter.position().z;
        // moved toward 180 through the short arc
        assert!(yaw > 175.0 || yaw < -175.0);
    }

    #[test]
    fn test_dt_clamp() {
        assert_eq!(clamp_dt(-1.0), 1.0 / DEFAULT_FPS);
        assert_eq!(clamp_dt(f64::NAN), 1.0 / DEFAULT_FPS);
        assert_eq!(clamp_dt(10.0), MAX_KALMAN_DT);
        assert_eq!(clamp_dt(1e-6), MIN_KALMAN_DT);
    }

    #[test]
    fn test_pose_filter_holds_at_zero_confidence() {
        let tuning = KalmanTuning {
            process_noise: 2.5e5,
            measurement_noise: 4.0,
            scale_factor: 0.8,
        };
        let still = PoseSample {
            position: Vector3::new(0.0, 0.0, -500.0),
            rotation: Vector3::zeros(),
            scale: 1.0,
        };
        let mut filter = KalmanPoseFilter::new();
        for i in 0..10 {
            filter.apply(&still, 1.0, f64::from(i) / 30.0, tuning);
        }
        let jump = PoseSample {
            position: Vector3::new(100.0, 0.0, -500.0),
            rotation: Vector3::new(0.0, 0.0, 45.0),
            scale: 2.0,
        };
        let out = filter.apply(&jump, 0.0, 10.0 / 30.0, tuning);
        assert!(out.position.x.abs() < 1.0);
        assert!(out.rotation.z.abs() < 1.0);
        assert_eq!(out.scale, 1.0);
    }
}
