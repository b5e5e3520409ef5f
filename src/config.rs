//! Configuration for the eyewear pose engine

use crate::{
    anchors::GlassesDimensions,
    calibration::CalibrationConfig,
    filters::{exponential::SmoothingFactors, kalman::KalmanTuning, AlgorithmKind, FilterParams},
    quality::QualityConfig,
    recovery::RecoveryParams,
    transform::CameraConfig,
    Error, Result,
};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Stabilization, recovery and quality parameters
    pub positioning: PositioningConfig,

    /// Calibration pass parameters
    pub calibration: CalibrationConfig,

    /// Camera placement and clip planes
    pub camera: CameraConfig,

    /// Design dimensions of the glasses frame
    pub glasses: GlassesDimensions,
}

/// Stabilization and tracking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositioningConfig {
    /// Smoothing algorithm
    pub algorithm: AlgorithmKind,

    /// Exponential factor for position (0 = raw, close to 1 = frozen)
    pub position_smoothing: f64,

    /// Exponential factor for rotation
    pub rotation_smoothing: f64,

    /// Exponential factor for scale
    pub scale_smoothing: f64,

    /// Adaptive smoothing factor at full confidence
    pub stability_threshold: f64,

    /// Adaptive smoothing factor at zero confidence
    pub adaptive_max_smoothing: f64,

    /// Position jump per frame treated as an outlier
    pub outlier_detection_threshold: f64,

    /// Outliers rejected in a row before a jump is accepted
    pub max_outliers: usize,

    /// Frames below this confidence count as tracking loss
    pub confidence_threshold: f64,

    /// Seconds without a valid frame before tracking is lost
    pub tracking_loss_timeout: f64,

    /// Consecutive valid frames needed to resume tracking
    pub recovery_frames: usize,

    /// Fixed offset added to the filtered position
    pub position_offset: [f64; 3],

    /// Fixed offset added to the filtered rotation, degrees
    pub rotation_offset: [f64; 3],

    /// Kalman white-acceleration variance
    pub kalman_process_noise: f64,

    /// Kalman measurement variance at full confidence
    pub kalman_measurement_noise: f64,

    /// Distance of the lens plane off the face along its normal
    pub anchor_standoff: f64,

    /// Frames averaged when smoothing anchor offsets
    pub anchor_smoothing_window: usize,

    /// Frames kept in the pose history
    pub history_capacity: usize,

    /// Overall quality at or above which a tracked frame is marked stable
    pub stable_quality_threshold: f64,

    /// Minimum seconds between published outputs
    pub output_interval: f64,

    /// Quality scoring parameters
    pub quality: QualityConfig,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::Hybrid,
            position_smoothing: 0.6,
            rotation_smoothing: 0.7,
            scale_smoothing: 0.8,
            stability_threshold: 0.3,
            adaptive_max_smoothing: 0.95,
            outlier_detection_threshold: 40.0,
            max_outliers: 3,
            confidence_threshold: 0.5,
            tracking_loss_timeout: 0.25,
            recovery_frames: 5,
            position_offset: [0.0; 3],
            rotation_offset: [0.0; 3],
            kalman_process_noise: 2.5e5,
            kalman_measurement_noise: 4.0,
            anchor_standoff: 5.0,
            anchor_smoothing_window: 5,
            history_capacity: 60,
            stable_quality_threshold: 0.6,
            output_interval: 0.0,
            quality: QualityConfig::default(),
        }
    }
}

fn check(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::InvalidConfiguration(message()))
    }
}

fn is_factor(value: f64) -> bool {
    (0.0..1.0).contains(&value)
}

impl PositioningConfig {
    /// Validate all parameters
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] describing the first out-of-range field.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("position_smoothing", self.position_smoothing),
            ("rotation_smoothing", self.rotation_smoothing),
            ("scale_smoothing", self.scale_smoothing),
            ("stability_threshold", self.stability_threshold),
            ("adaptive_max_smoothing", self.adaptive_max_smoothing),
        ] {
            check(is_factor(value), || format!("{name} must be in [0, 1), got {value}"))?;
        }
        check(self.adaptive_max_smoothing >= self.stability_threshold, || {
            format!(
                "adaptive_max_smoothing ({}) must not be below stability_threshold ({})",
                self.adaptive_max_smoothing, self.stability_threshold
            )
        })?;
        check((0.0..=1.0).contains(&self.confidence_threshold), || {
            format!("confidence_threshold must be in [0, 1], got {}", self.confidence_threshold)
        })?;
        check((0.0..=1.0).contains(&self.stable_quality_threshold), || {
            format!("stable_quality_threshold must be in [0, 1], got {}", self.stable_quality_threshold)
        })?;

        for (name, value) in [
            ("outlier_detection_threshold", self.outlier_detection_threshold),
            ("kalman_process_noise", self.kalman_process_noise),
            ("kalman_measurement_noise", self.kalman_measurement_noise),
        ] {
            check(value.is_finite() && value > 0.0, || format!("{name} must be positive, got {value}"))?;
        }
        for (name, value) in [
            ("tracking_loss_timeout", self.tracking_loss_timeout),
            ("anchor_standoff", self.anchor_standoff),
            ("output_interval", self.output_interval),
        ] {
            check(value.is_finite() && value >= 0.0, || format!("{name} must not be negative, got {value}"))?;
        }

        check(self.recovery_frames > 0, || "recovery_frames must be greater than 0".to_string())?;
        check(self.anchor_smoothing_window > 0, || "anchor_smoothing_window must be greater than 0".to_string())?;
        check(self.history_capacity >= 3, || {
            format!("history_capacity must be at least 3, got {}", self.history_capacity)
        })?;
        check(
            self.position_offset.iter().chain(&self.rotation_offset).all(|v| v.is_finite()),
            || "offsets must be finite".to_string(),
        )?;

        self.quality.validate()
    }

    /// Per-frame filter parameters
    #[must_use]
    pub fn filter_params(&self) -> FilterParams {
        FilterParams {
            factors: SmoothingFactors {
                position: self.position_smoothing,
                rotation: self.rotation_smoothing,
                scale: self.scale_smoothing,
            },
            adaptive_floor: self.stability_threshold,
            adaptive_ceiling: self.adaptive_max_smoothing,
            kalman: self.kalman_tuning(),
            outlier_threshold: self.outlier_detection_threshold,
            max_outliers: self.max_outliers,
            position_offset: Vector3::from(self.position_offset),
            rotation_offset: Vector3::from(self.rotation_offset),
        }
    }

    #[must_use]
    pub fn kalman_tuning(&self) -> KalmanTuning {
        KalmanTuning {
            process_noise: self.kalman_process_noise,
            measurement_noise: self.kalman_measurement_noise,
            scale_factor: self.scale_smoothing,
        }
    }

    #[must_use]
    pub fn recovery_params(&self) -> RecoveryParams {
        RecoveryParams {
            timeout: self.tracking_loss_timeout,
            recovery_frames: self.recovery_frames,
        }
    }

    /// Merge a partial update, validating the result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the merged configuration is
    /// invalid; `self` is left unchanged.
    pub fn merged(&self, update: &PositioningConfigUpdate) -> Result<Self> {
        let mut merged = self.clone();
        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = &update.$field {
                    merged.$field = value.clone();
                })*
            };
        }
        apply!(
            algorithm,
            position_smoothing,
            rotation_smoothing,
            scale_smoothing,
            stability_threshold,
            adaptive_max_smoothing,
            outlier_detection_threshold,
            max_outliers,
            confidence_threshold,
            tracking_loss_timeout,
            recovery_frames,
            position_offset,
            rotation_offset,
            kalman_process_noise,
            kalman_measurement_noise,
            anchor_standoff,
            anchor_smoothing_window,
            history_capacity,
            stable_quality_threshold,
            output_interval,
            quality,
        );
        merged.validate()?;
        Ok(merged)
    }
}

/// Partial [`PositioningConfig`]; `None` fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositioningConfigUpdate {
    pub algorithm: Option<AlgorithmKind>,
    pub position_smoothing: Option<f64>,
    pub rotation_smoothing: Option<f64>,
    pub scale_smoothing: Option<f64>,
    pub stability_threshold: Option<f64>,
    pub adaptive_max_smoothing: Option<f64>,
    pub outlier_detection_threshold: Option<f64>,
    pub max_outliers: Option<usize>,
    pub confidence_threshold: Option<f64>,
    pub tracking_loss_timeout: Option<f64>,
    pub recovery_frames: Option<usize>,
    pub position_offset: Option<[f64; 3]>,
    pub rotation_offset: Option<[f64; 3]>,
    pub kalman_process_noise: Option<f64>,
    pub kalman_measurement_noise: Option<f64>,
    pub anchor_standoff: Option<f64>,
    pub anchor_smoothing_window: Option<usize>,
    pub history_capacity: Option<usize>,
    pub stable_quality_threshold: Option<f64>,
    pub output_interval: Option<f64>,
    pub quality: Option<QualityConfig>,
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns [`Error::IoError`] if the file cannot be read and
    /// [`Error::ConfigError`] if it does not parse.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::IoError(e.to_string()))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the text does not parse.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if serialization fails and
    /// [`Error::IoError`] if the file cannot be written.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            serde_yaml::to_string(self).map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content).map_err(|e| Error::IoError(e.to_string()))?;

        Ok(())
    }

    /// Validate every section
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for the first invalid section.
    pub fn validate(&self) -> Result<()> {
        self.positioning.validate()?;
        self.calibration.validate()?;
        self.camera.validate()?;
        self.glasses.validate()
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r"# Eyewear Pose Configuration

# Stabilization and tracking
positioning:
  algorithm: hybrid            # basic | kalman | adaptive | hybrid
  position_smoothing: 0.6
  rotation_smoothing: 0.7
  scale_smoothing: 0.8
  stability_threshold: 0.3
  adaptive_max_smoothing: 0.95
  outlier_detection_threshold: 40.0
  max_outliers: 3
  confidence_threshold: 0.5
  tracking_loss_timeout: 0.25
  recovery_frames: 5
  position_offset: [0.0, 0.0, 0.0]
  rotation_offset: [0.0, 0.0, 0.0]
  kalman_process_noise: 250000.0
  kalman_measurement_noise: 4.0
  anchor_standoff: 5.0
  anchor_smoothing_window: 5
  history_capacity: 60
  stable_quality_threshold: 0.6
  output_interval: 0.0
  quality:
    window: 30
    variance_fraction: 0.05
    jerk_fraction: 0.02
    eye_face_ratio_band: [0.35, 0.6]
    step_fraction: 0.25
    convergence_fraction: 0.1
    max_lag_frames: 15
    weights:
      stability: 0.3
      accuracy: 0.3
      smoothness: 0.2
      responsiveness: 0.2

# Calibration pass
calibration:
  sample_count: 30
  timeout: 5.0
  min_scale: 0.5
  max_scale: 2.0
  seed_from_first_frame: true

# Camera placement
camera:
  near: 1.0
  far: 5000.0
  eye: [0.0, 0.0, 0.0]
  target: [0.0, 0.0, -1.0]
  up: [0.0, 1.0, 0.0]

# Glasses frame dimensions
glasses:
  lens_width: 50.0
  lens_height: 40.0
  bridge_width: 18.0
  temple_length: 140.0
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_example_config_matches_defaults() {
        let parsed = Config::from_yaml(EXAMPLE_CONFIG).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed = Config::from_yaml("positioning:\n  algorithm: kalman\n  max_outliers: 1\n").unwrap();
        assert_eq!(parsed.positioning.algorithm, AlgorithmKind::Kalman);
        assert_eq!(parsed.positioning.max_outliers, 1);
        assert_eq!(parsed.positioning.position_smoothing, 0.6);
        assert_eq!(parsed.glasses, GlassesDimensions::default());
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(Config::from_yaml("positioning: ["), Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_smoothing_factor_range() {
        let mut config = PositioningConfig::default();
        config.position_smoothing = 1.0;
        assert!(config.validate().is_err());
        config.position_smoothing = -0.1;
        assert!(config.validate().is_err());
        config.position_smoothing = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_adaptive_bounds_ordered() {
        let config = PositioningConfig {
            stability_threshold: 0.8,
            adaptive_max_smoothing: 0.5,
            ..PositioningConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_rejects_whole_update() {
        let base = PositioningConfig::default();
        let update = PositioningConfigUpdate {
            position_smoothing: Some(0.2),
            outlier_detection_threshold: Some(-5.0),
            ..PositioningConfigUpdate::default()
        };
        assert!(matches!(base.merged(&update), Err(Error::InvalidConfiguration(_))));

        let update = PositioningConfigUpdate {
            position_smoothing: Some(0.2),
            ..PositioningConfigUpdate::default()
        };
        let merged = base.merged(&update).unwrap();
        assert_eq!(merged.position_smoothing, 0.2);
        assert_eq!(merged.rotation_smoothing, base.rotation_smoothing);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("eyewear_pose_config_{}.yaml", std::process::id()));
        let mut config = Config::default();
        config.positioning.algorithm = AlgorithmKind::Adaptive;
        config.positioning.rotation_offset = [0.0, 5.0, 0.0];
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/eyewear.yaml"),
            Err(Error::IoError(_))
        ));
    }
}
