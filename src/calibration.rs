//! Per-session calibration: baseline face measurements and camera intrinsics.
//!
//! A calibration pass is frame-driven: [`CalibrationManager::begin`] opens a
//! session and every subsequent frame is offered through
//! [`CalibrationManager::observe`]. Nothing blocks; the session completes or
//! fails on the frame that settles it.

use crate::{
    constants::{
        DEFAULT_CALIBRATION_SAMPLES, DEFAULT_CALIBRATION_TIMEOUT, DEFAULT_EYE_DISTANCE, DEFAULT_FACE_HEIGHT,
        DEFAULT_FACE_WIDTH, DEFAULT_FOV_Y_DEGREES, DEFAULT_MAX_SCALE, DEFAULT_MIN_SCALE, DEFAULT_VIEWPORT_HEIGHT,
        DEFAULT_VIEWPORT_WIDTH,
    },
    face_geometry::FaceGeometry,
    pose_estimation::HeadPoseEstimator,
    utils::{shortest_angle_delta3, wrap_degrees3},
    Error, Result,
};
use log::{info, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Calibration pass parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Samples collected by a default calibration pass
    pub sample_count: usize,
    /// Seconds a pass may run before it fails
    pub timeout: f64,
    /// Lower scale bound applied by the pose estimator
    pub min_scale: f64,
    /// Upper scale bound applied by the pose estimator
    pub max_scale: f64,
    /// Use the first valid face as a one-sample baseline
    pub seed_from_first_frame: bool,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            sample_count: DEFAULT_CALIBRATION_SAMPLES,
            timeout: DEFAULT_CALIBRATION_TIMEOUT,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
            seed_from_first_frame: true,
        }
    }
}

impl CalibrationConfig {
    /// Validate calibration parameters
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] on a zero sample count,
    /// non-positive timeout or inverted scale bounds.
    pub fn validate(&self) -> Result<()> {
        if self.sample_count == 0 {
            return Err(Error::InvalidConfiguration(
                "Calibration sample count must be greater than 0".to_string(),
            ));
        }
        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(Error::InvalidConfiguration("Calibration timeout must be positive".to_string()));
        }
        validate_scale_bounds(self.min_scale, self.max_scale)
    }
}

/// Baseline measurements and camera intrinsics for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationData {
    /// Vertical focal length in pixels
    pub focal_length: f64,
    /// Principal point `(cx, cy)` in pixels, y measured downward
    pub principal_point: [f64; 2],
    /// Lens distortion `(k1, k2, p1, p2, k3)`; not applied by [`crate::transform::CameraModel`]
    pub distortion: [f64; 5],
    /// Image size the intrinsics refer to
    pub image_size: [u32; 2],

    pub average_eye_distance: f64,
    pub average_face_width: f64,
    pub average_face_height: f64,
    /// Average head orientation during calibration, `(roll, pitch, yaw)` degrees
    pub neutral_rotation: [f64; 3],
    /// Samples behind the averages; 0 means uncalibrated
    pub sample_count: usize,

    /// Depth adjustment `z' = z * depth_scale + depth_offset`
    pub depth_scale: f64,
    pub depth_offset: f64,

    pub min_scale: f64,
    pub max_scale: f64,
}

impl Default for CalibrationData {
    fn default() -> Self {
        let width = DEFAULT_VIEWPORT_WIDTH;
        let height = DEFAULT_VIEWPORT_HEIGHT;
        Self {
            focal_length: focal_length_for_fov(DEFAULT_FOV_Y_DEGREES, height),
            principal_point: [f64::from(width) / 2.0, f64::from(height) / 2.0],
            distortion: [0.0; 5],
            image_size: [width, height],
            average_eye_distance: DEFAULT_EYE_DISTANCE,
            average_face_width: DEFAULT_FACE_WIDTH,
            average_face_height: DEFAULT_FACE_HEIGHT,
            neutral_rotation: [0.0; 3],
            sample_count: 0,
            depth_scale: 1.0,
            depth_offset: 0.0,
            min_scale: DEFAULT_MIN_SCALE,
            max_scale: DEFAULT_MAX_SCALE,
        }
    }
}

impl CalibrationData {
    /// Defaults with the scale bounds taken from `config`
    #[must_use]
    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            min_scale: config.min_scale,
            max_scale: config.max_scale,
            ..Self::default()
        }
    }

    /// Clamp a scale into `[min_scale, max_scale]`
    #[must_use]
    pub fn clamp_scale(&self, scale: f64) -> f64 {
        if scale.is_finite() {
            scale.clamp(self.min_scale, self.max_scale)
        } else {
            1.0_f64.clamp(self.min_scale, self.max_scale)
        }
    }

    /// True once at least one sample has been committed
    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.sample_count > 0
    }

    /// Rescale intrinsics to a new image size
    pub fn rescale_to(&mut self, width: u32, height: u32) {
        let [old_width, old_height] = self.image_size;
        if old_width == 0 || old_height == 0 {
            self.image_size = [width, height];
            return;
        }
        let sx = f64::from(width) / f64::from(old_width);
        let sy = f64::from(height) / f64::from(old_height);
        self.focal_length *= sy;
        self.principal_point = [self.principal_point[0] * sx, self.principal_point[1] * sy];
        self.image_size = [width, height];
    }

    fn validate(&self) -> Result<()> {
        let positive = [
            ("focal_length", self.focal_length),
            ("average_eye_distance", self.average_eye_distance),
            ("average_face_width", self.average_face_width),
            ("average_face_height", self.average_face_height),
            ("depth_scale", self.depth_scale),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfiguration(format!("{name} must be positive, got {value}")));
            }
        }
        if !self.depth_offset.is_finite() || self.principal_point.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfiguration("Calibration values must be finite".to_string()));
        }
        if self.distortion.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidConfiguration("Distortion coefficients must be finite".to_string()));
        }
        validate_scale_bounds(self.min_scale, self.max_scale)
    }
}

/// Partial calibration override; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationUpdate {
    pub focal_length: Option<f64>,
    pub principal_point: Option<[f64; 2]>,
    pub distortion: Option<[f64; 5]>,
    pub average_eye_distance: Option<f64>,
    pub average_face_width: Option<f64>,
    pub average_face_height: Option<f64>,
    pub depth_scale: Option<f64>,
    pub depth_offset: Option<f64>,
    pub min_scale: Option<f64>,
    pub max_scale: Option<f64>,
}

/// Progress of the current calibration pass
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationStatus {
    /// No pass has been requested
    Idle,
    /// A pass is collecting samples
    Collecting { collected: usize, required: usize },
    /// The last pass committed a new baseline
    Completed,
    /// The last pass failed; retry with another `begin`
    Failed(Error),
}

#[derive(Debug, Clone)]
struct CalibrationSession {
    required: usize,
    started_at: Option<f64>,
    accumulator: SampleAccumulator,
}

/// Running sums over calibration samples
#[derive(Debug, Clone, Default)]
struct SampleAccumulator {
    count: usize,
    eye_distance: f64,
    face_width: f64,
    face_height: f64,
    first_rotation: Option<Vector3<f64>>,
    rotation_delta: Vector3<f64>,
}

impl SampleAccumulator {
    fn add(&mut self, geometry: &FaceGeometry) {
        let rotation = HeadPoseEstimator::rotation(&geometry.eye_vector, &geometry.face_normal);
        let (roll, pitch, yaw) = rotation.euler_angles();
        let euler = Vector3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees());

        // angles averaged as offsets from the first sample, so +/-180 does not cancel
        let first = *self.first_rotation.get_or_insert(euler);
        self.rotation_delta += shortest_angle_delta3(&first, &euler);

        self.count += 1;
        self.eye_distance += geometry.eye_distance;
        self.face_width += geometry.face_width;
        self.face_height += geometry.face_height;
    }

    fn commit_into(&self, data: &mut CalibrationData) {
        if self.count == 0 {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let n = self.count as f64;
        data.average_eye_distance = self.eye_distance / n;
        data.average_face_width = self.face_width / n;
        data.average_face_height = self.face_height / n;
        let first = self.first_rotation.unwrap_or_else(Vector3::zeros);
        let neutral = wrap_degrees3(&(first + self.rotation_delta / n));
        data.neutral_rotation = [neutral.x, neutral.y, neutral.z];
        data.sample_count = self.count;
    }
}

/// Owns the session's [`CalibrationData`]
#[derive(Debug, Clone)]
pub struct CalibrationManager {
    config: CalibrationConfig,
    data: CalibrationData,
    session: Option<CalibrationSession>,
    status: CalibrationStatus,
}

impl CalibrationManager {
    #[must_use]
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            data: CalibrationData::from_config(&config),
            config,
            session: None,
            status: CalibrationStatus::Idle,
        }
    }

    /// Current calibration
    #[must_use]
    pub fn data(&self) -> &CalibrationData {
        &self.data
    }

    /// Progress of the current or last pass
    #[must_use]
    pub fn status(&self) -> &CalibrationStatus {
        &self.status
    }

    /// Configuration this manager was built with
    #[must_use]
    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    /// Start a calibration pass of `sample_count` samples, replacing any pass
    /// already running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `sample_count` is zero.
    pub fn begin(&mut self, sample_count: usize) -> Result<()> {
        if sample_count == 0 {
            return Err(Error::InvalidConfiguration(
                "Calibration sample count must be greater than 0".to_string(),
            ));
        }
        info!("Starting calibration pass of {} samples", sample_count);
        self.session = Some(CalibrationSession {
            required: sample_count,
            started_at: None,
            accumulator: SampleAccumulator::default(),
        });
        self.status = CalibrationStatus::Collecting {
            collected: 0,
            required: sample_count,
        };
        Ok(())
    }

    /// Offer one frame to the running pass; `None` marks an invalid frame.
    ///
    /// Invalid frames do not count toward the pass but still advance its
    /// timeout clock.
    pub fn observe(&mut self, geometry: Option<&FaceGeometry>, timestamp: f64) -> &CalibrationStatus {
        let Some(session) = self.session.as_mut() else {
            return &self.status;
        };
        let started_at = *session.started_at.get_or_insert(timestamp);

        if let Some(geometry) = geometry {
            session.accumulator.add(geometry);
        }
        let collected = session.accumulator.count;
        let required = session.required;

        if collected >= required {
            session.accumulator.commit_into(&mut self.data);
            self.session = None;
            self.status = CalibrationStatus::Completed;
            info!(
                "Calibration complete: eye distance {:.2}, face {:.2} x {:.2}",
                self.data.average_eye_distance, self.data.average_face_width, self.data.average_face_height
            );
        } else if timestamp - started_at > self.config.timeout {
            let error = Error::InsufficientCalibrationSamples { collected, required };
            warn!("Calibration failed: {}", error);
            self.session = None;
            self.status = CalibrationStatus::Failed(error);
        } else {
            self.status = CalibrationStatus::Collecting { collected, required };
        }
        &self.status
    }

    /// Commit a baseline from the first valid face when nothing is calibrated
    /// yet and seeding is enabled. Returns true if it seeded.
    pub fn seed(&mut self, geometry: &FaceGeometry) -> bool {
        if !self.config.seed_from_first_frame || self.data.is_calibrated() || self.session.is_some() {
            return false;
        }
        let mut accumulator = SampleAccumulator::default();
        accumulator.add(geometry);
        accumulator.commit_into(&mut self.data);
        info!("Seeded calibration from first face: eye distance {:.2}", self.data.average_eye_distance);
        true
    }

    /// Average a batch of samples into a new baseline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientCalibrationSamples`] when fewer than
    /// `required` samples are supplied; the current baseline is kept.
    pub fn calibrate_from_samples(&mut self, samples: &[FaceGeometry], required: usize) -> Result<&CalibrationData> {
        if samples.is_empty() || samples.len() < required {
            return Err(Error::InsufficientCalibrationSamples {
                collected: samples.len(),
                required: required.max(1),
            });
        }
        let mut accumulator = SampleAccumulator::default();
        for sample in samples {
            accumulator.add(sample);
        }
        accumulator.commit_into(&mut self.data);
        self.status = CalibrationStatus::Completed;
        Ok(&self.data)
    }

    /// Apply a partial override.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the merged calibration is
    /// out of range; the previous calibration is retained.
    pub fn update(&mut self, update: &CalibrationUpdate) -> Result<()> {
        let mut next = self.data.clone();
        if let Some(v) = update.focal_length {
            next.focal_length = v;
        }
        if let Some(v) = update.principal_point {
            next.principal_point = v;
        }
        if let Some(v) = update.distortion {
            next.distortion = v;
        }
        if let Some(v) = update.average_eye_distance {
            next.average_eye_distance = v;
            next.sample_count = next.sample_count.max(1);
        }
        if let Some(v) = update.average_face_width {
            next.average_face_width = v;
        }
        if let Some(v) = update.average_face_height {
            next.average_face_height = v;
        }
        if let Some(v) = update.depth_scale {
            next.depth_scale = v;
        }
        if let Some(v) = update.depth_offset {
            next.depth_offset = v;
        }
        if let Some(v) = update.min_scale {
            next.min_scale = v;
        }
        if let Some(v) = update.max_scale {
            next.max_scale = v;
        }

        if let Err(e) = next.validate() {
            warn!("Rejected calibration update: {}", e);
            return Err(e);
        }
        self.data = next;
        Ok(())
    }

    /// Restore defaults and cancel any running pass
    pub fn reset(&mut self) {
        let image_size = self.data.image_size;
        self.data = CalibrationData::from_config(&self.config);
        self.data.rescale_to(image_size[0], image_size[1]);
        self.session = None;
        self.status = CalibrationStatus::Idle;
    }

    /// Rescale camera intrinsics after a viewport resize
    pub fn resize(&mut self, width: u32, height: u32) {
        self.data.rescale_to(width, height);
    }
}

impl Default for CalibrationManager {
    fn default() -> Self {
        Self::new(CalibrationConfig::default())
    }
}

/// Vertical focal length in pixels for a field of view
#[must_use]
pub fn focal_length_for_fov(fov_y_degrees: f64, image_height: u32) -> f64 {
    (f64::from(image_height) / 2.0) / (fov_y_degrees.to_radians() / 2.0).tan()
}

fn validate_scale_bounds(min_scale: f64, max_scale: f64) -> Result<()> {
    if !(min_scale.is_finite() && max_scale.is_finite() && min_scale > 0.0 && min_scale <= max_scale) {
        return Err(Error::InvalidConfiguration(format!(
            "Scale bounds must satisfy 0 < min <= max, got [{min_scale}, {max_scale}]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Unit};

    fn sample(eye_distance: f64) -> FaceGeometry {
        let half = eye_distance / 2.0;
        FaceGeometry {
            eye_distance,
            face_width: 140.0,
            face_height: 125.0,
            nose_length: 45.0,
            temple_width: 136.0,
            left_eye_center: Point3::new(-half, 0.0, -500.0),
            right_eye_center: Point3::new(half, 0.0, -500.0),
            nose_bridge_top: Point3::new(0.0, 5.0, -495.0),
            nose_bridge_mid: Point3::new(0.0, -10.0, -490.0),
            nose_tip: Point3::new(0.0, -40.0, -480.0),
            left_temple: Point3::new(-68.0, 5.0, -530.0),
            right_temple: Point3::new(68.0, 5.0, -530.0),
            eye_vector: Vector3::x_axis(),
            nose_vector: Unit::new_normalize(Vector3::new(0.0, -45.0, 15.0)),
            face_normal: Vector3::z_axis(),
            confidence: 1.0,
        }
    }

    #[test]
    fn test_session_completes_with_mean() {
        let mut manager = CalibrationManager::default();
        manager.begin(3).unwrap();

        manager.observe(Some(&sample(60.0)), 0.0);
        manager.observe(None, 0.03);
        manager.observe(Some(&sample(62.0)), 0.06);
        assert_eq!(manager.status(), &CalibrationStatus::Collecting { collected: 2, required: 3 });

        manager.observe(Some(&sample(61.0)), 0.09);
        assert_eq!(manager.status(), &CalibrationStatus::Completed);
        assert!((manager.data().average_eye_distance - 61.0).abs() < 1e-12);
        assert_eq!(manager.data().sample_count, 3);
    }

    #[test]
    fn test_session_times_out() {
        let mut manager = CalibrationManager::new(CalibrationConfig {
            timeout: 1.0,
            ..CalibrationConfig::default()
        });
        manager.begin(5).unwrap();
        manager.observe(Some(&sample(60.0)), 10.0);
        manager.observe(None, 10.5);
        let status = manager.observe(None, 11.5).clone();

        assert_eq!(
            status,
            CalibrationStatus::Failed(Error::InsufficientCalibrationSamples { collected: 1, required: 5 })
        );
        // baseline untouched
        assert_eq!(manager.data().sample_count, 0);
    }

    #[test]
    fn test_zero_sample_pass_rejected() {
        let mut manager = CalibrationManager::default();
        assert!(manager.begin(0).is_err());
        assert_eq!(manager.status(), &CalibrationStatus::Idle);
    }

    #[test]
    fn test_update_rejects_and_retains() {
        let mut manager = CalibrationManager::default();
        manager
            .update(&CalibrationUpdate {
                average_eye_distance: Some(58.0),
                ..CalibrationUpdate::default()
            })
            .unwrap();
        assert_eq!(manager.data().average_eye_distance, 58.0);

        let result = manager.update(&CalibrationUpdate {
            average_eye_distance: Some(-1.0),
            min_scale: Some(0.1),
            ..CalibrationUpdate::default()
        });
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
        assert_eq!(manager.data().average_eye_distance, 58.0);
        assert_eq!(manager.data().min_scale, DEFAULT_MIN_SCALE);

        let inverted = manager.update(&CalibrationUpdate {
            min_scale: Some(3.0),
            ..CalibrationUpdate::default()
        });
        assert!(inverted.is_err());
    }

    #[test]
    fn test_seed_only_once() {
        let mut manager = CalibrationManager::default();
        assert!(manager.seed(&sample(70.0)));
        assert!(!manager.seed(&sample(50.0)));
        assert_eq!(manager.data().average_eye_distance, 70.0);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut manager = CalibrationManager::default();
        manager.calibrate_from_samples(&[sample(55.0)], 1).unwrap();
        manager.reset();
        assert_eq!(manager.data(), &CalibrationData::default());
    }

    #[test]
    fn test_rescale_intrinsics() {
        let mut data = CalibrationData::default();
        let focal = data.focal_length;
        data.rescale_to(1280, 960);
        assert!((data.focal_length - 2.0 * focal).abs() < 1e-9);
        assert_eq!(data.principal_point, [640.0, 480.0]);
    }
}
