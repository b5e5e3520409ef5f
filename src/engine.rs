//! Per-frame glasses mapping pipeline.
//!
//! landmarks -> face geometry -> head pose -> stabilization -> anchors ->
//! transforms, scored for quality and gated by the tracking state machine.
//! Frames are processed strictly in timestamp order, one call per frame.

use crate::{
    anchors::{AnchorCalculator, AnchorSmoother, GlassesAnchorPoints, GlassesDimensions},
    calibration::{CalibrationData, CalibrationManager, CalibrationStatus, CalibrationUpdate},
    config::{Config, PositioningConfig, PositioningConfigUpdate},
    face_geometry::FaceGeometry,
    filters::{AlgorithmKind, GlassesPositionState, PoseSample, Stabilizer},
    history::{PoseRecord, TrackingHistory},
    landmarks::LandmarkFrame,
    pose_estimation::{HeadPose, HeadPoseEstimator},
    quality::{MappingQuality, PositioningQuality, QualityScorer},
    recovery::{RecoveryStateMachine, TrackingState},
    throttle::RateLimited,
    transform::{CameraConfig, CameraModel, CoordinateTransform, GlassesTransform, Ray, ScreenPoint, TransformBuilder},
    Error, Result,
};
use log::{debug, info, warn};
use nalgebra::Point3;

/// Everything a renderer needs for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct MappingOutput {
    /// Smoothed glasses placement, offsets applied
    pub position: GlassesPositionState,
    /// Unfiltered head pose of the frame that produced this output
    pub raw_pose: HeadPose,
    pub anchors: GlassesAnchorPoints,
    pub coordinate_transform: CoordinateTransform,
    pub glasses_transform: GlassesTransform,
    pub quality: PositioningQuality,
    pub mapping_quality: MappingQuality,
    pub state: TrackingState,
}

/// What happened to a frame
#[derive(Debug, Clone, PartialEq)]
pub enum FrameStatus {
    /// Filtered and published
    Accepted,
    /// Position jump rejected; previous output held
    OutlierRejected,
    /// Not usable; previous output held
    Held(Error),
}

/// Result of [`GlassesMappingEngine::update`]
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub state: TrackingState,
    pub status: FrameStatus,
    /// Current output; `None` until the first face is tracked
    pub output: Option<MappingOutput>,
}

/// Single-face glasses placement engine. Owns all filter and calibration state.
#[derive(Debug, Clone)]
pub struct GlassesMappingEngine {
    config: PositioningConfig,
    camera_config: CameraConfig,
    glasses: GlassesDimensions,
    calibration: CalibrationManager,
    estimator: HeadPoseEstimator,
    anchor_calculator: AnchorCalculator,
    anchor_smoother: AnchorSmoother,
    builder: TransformBuilder,
    stabilizer: Stabilizer,
    recovery: RecoveryStateMachine,
    scorer: QualityScorer,
    history: TrackingHistory,
    quality: PositioningQuality,
    output: Option<MappingOutput>,
    published: RateLimited<MappingOutput>,
    last_timestamp: Option<f64>,
}

impl GlassesMappingEngine {
    /// Create an engine from a validated configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if any section of `config` is invalid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let Config {
            positioning,
            calibration,
            camera,
            glasses,
        } = config;

        let calibration = CalibrationManager::new(calibration);
        let builder = TransformBuilder::new(CameraModel::new(calibration.data(), &camera)?);

        Ok(Self {
            stabilizer: Stabilizer::new(positioning.algorithm, positioning.kalman_tuning()),
            anchor_calculator: AnchorCalculator::new(positioning.anchor_standoff),
            anchor_smoother: AnchorSmoother::new(positioning.anchor_smoothing_window),
            scorer: QualityScorer::new(positioning.quality.clone()),
            history: TrackingHistory::new(positioning.history_capacity),
            published: RateLimited::new(positioning.output_interval),
            config: positioning,
            camera_config: camera,
            glasses,
            calibration,
            estimator: HeadPoseEstimator::new(),
            builder,
            recovery: RecoveryStateMachine::new(),
            quality: PositioningQuality::zero(),
            output: None,
            last_timestamp: None,
        })
    }

    /// Process one detection frame; `None` means the detector found no face.
    ///
    /// Never fails: unusable frames hold the previous output and say why in
    /// the report.
    pub fn update(&mut self, timestamp: f64, frame: Option<&LandmarkFrame>) -> FrameReport {
        if !timestamp.is_finite() {
            return self.report(FrameStatus::Held(Error::InvalidInput(format!("timestamp {timestamp}"))));
        }
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                debug!("Dropping out of order frame at {timestamp} (last {last})");
                return self.report(FrameStatus::Held(Error::OutOfOrderFrame { timestamp, last }));
            }
        }
        self.last_timestamp = Some(timestamp);

        let detection = frame
            .ok_or(Error::NoFaceDetected)
            .and_then(FaceGeometry::estimate)
            .and_then(|geometry| {
                let threshold = self.config.confidence_threshold;
                if geometry.confidence < threshold {
                    Err(Error::LowConfidenceFrame {
                        confidence: geometry.confidence,
                        threshold,
                    })
                } else {
                    Ok(geometry)
                }
            });

        let transition = self
            .recovery
            .observe(detection.is_ok(), timestamp, &self.config.recovery_params());
        if transition.is_some_and(|t| t.from == TrackingState::Lost) {
            // the face may come back anywhere; the pre-loss position is no reference
            self.stabilizer.reset_gate();
        }

        let report = match &detection {
            Ok(geometry) => self.process(geometry, timestamp),
            Err(error) => {
                debug!("Holding output: {error}");
                self.hold(None, timestamp);
                self.report(FrameStatus::Held(error.clone()))
            }
        };

        // a completed pass applies from the next frame
        self.calibration.observe(detection.as_ref().ok(), timestamp);
        report
    }

    fn process(&mut self, geometry: &FaceGeometry, timestamp: f64) -> FrameReport {
        self.calibration.seed(geometry);
        let raw_pose = self.estimator.estimate(geometry, self.calibration.data());
        let raw = PoseSample::from_pose(&raw_pose);

        let params = self.config.filter_params();
        let frame = self
            .stabilizer
            .apply(&raw, geometry.confidence, self.quality.stability, timestamp, &params);
        if frame.rejected {
            self.hold(Some(geometry), timestamp);
            return self.report(FrameStatus::OutlierRejected);
        }

        self.history.push(PoseRecord {
            timestamp,
            raw_position: raw_pose.position,
            position: Point3::from(frame.filtered.position),
            rotation: frame.filtered.rotation,
            scale: frame.filtered.scale,
            confidence: geometry.confidence,
        });
        self.quality = self.scorer.score(&self.history, Some(geometry), geometry.confidence);

        let state = self.recovery.state();
        let is_stable = state == TrackingState::Tracking && self.quality.overall >= self.config.stable_quality_threshold;
        self.stabilizer.set_stable(is_stable);
        let position = GlassesPositionState {
            is_stable,
            ..frame.state
        };

        let pose = position.to_pose();
        let raw_anchors = self.anchor_calculator.calculate(&raw_pose, geometry, &self.glasses);
        let anchors = self.anchor_smoother.smooth(&raw_anchors, &raw_pose, &pose);
        let (coordinate_transform, glasses_transform) = self.builder.build(&pose, &anchors);

        let output = MappingOutput {
            position,
            raw_pose,
            anchors,
            coordinate_transform,
            glasses_transform,
            quality: self.quality,
            mapping_quality: MappingQuality::new(&self.quality, self.recovery.tracking_loss()),
            state,
        };
        self.publish(output);
        self.report(FrameStatus::Accepted)
    }

    /// Keep the frozen transforms, refreshing the status and quality fields.
    ///
    /// Quality is rescored from the unchanged history with this frame's
    /// detection, so accuracy falls to 0 while no face is seen.
    fn hold(&mut self, geometry: Option<&FaceGeometry>, timestamp: f64) {
        let confidence = geometry.map_or(0.0, |g| g.confidence);
        self.quality = self.scorer.score(&self.history, geometry, confidence);

        let Some(mut output) = self.output.clone() else {
            return;
        };
        output.state = self.recovery.state();
        output.quality = self.quality;
        output.mapping_quality = MappingQuality::new(&self.quality, self.recovery.tracking_loss());
        output.position.timestamp = timestamp;
        if output.state != TrackingState::Tracking {
            output.position.is_stable = false;
        }
        self.publish(output);
    }

    fn publish(&mut self, output: MappingOutput) {
        self.published.set(output.clone());
        self.output = Some(output);
    }

    fn report(&self, status: FrameStatus) -> FrameReport {
        FrameReport {
            state: self.recovery.state(),
            status,
            output: self.output.clone(),
        }
    }

    /// Rate-limited view of the output: the newest output if at least
    /// `output_interval` seconds passed since the last one was released
    pub fn sample(&mut self, now: f64) -> Option<&MappingOutput> {
        self.published.sample(now)
    }

    /// Latest output, unthrottled
    #[must_use]
    pub fn current(&self) -> Option<&MappingOutput> {
        self.output.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> TrackingState {
        self.recovery.state()
    }

    #[must_use]
    pub fn quality(&self) -> &PositioningQuality {
        &self.quality
    }

    #[must_use]
    pub fn mapping_quality(&self) -> MappingQuality {
        MappingQuality::new(&self.quality, self.recovery.tracking_loss())
    }

    #[must_use]
    pub fn config(&self) -> &PositioningConfig {
        &self.config
    }

    #[must_use]
    pub fn algorithm(&self) -> AlgorithmKind {
        self.stabilizer.kind()
    }

    /// Clear filter state, history, outputs and tracking status.
    /// Calibration and configuration are kept.
    pub fn reset(&mut self) {
        self.stabilizer.reset(self.config.kalman_tuning());
        self.anchor_smoother.reset();
        self.recovery.reset();
        self.history.clear();
        self.quality = PositioningQuality::zero();
        self.output = None;
        self.published.clear();
        self.last_timestamp = None;
        info!("Engine reset");
    }

    /// Switch smoothing algorithm, continuing from the current output
    pub fn set_algorithm(&mut self, kind: AlgorithmKind) {
        if self.stabilizer.set_algorithm(kind, self.config.kalman_tuning()) {
            info!("Switched smoothing algorithm to {kind}");
        }
        self.config.algorithm = kind;
    }

    /// Apply a partial configuration update atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the merged configuration is
    /// invalid; the previous configuration stays in effect.
    pub fn update_config(&mut self, update: &PositioningConfigUpdate) -> Result<()> {
        let next = self.config.merged(update).map_err(|e| {
            warn!("Rejected configuration update: {e}");
            e
        })?;

        if next.algorithm != self.stabilizer.kind() {
            self.set_algorithm(next.algorithm);
        }
        if next.anchor_smoothing_window != self.anchor_smoother.window_size() {
            self.anchor_smoother = AnchorSmoother::new(next.anchor_smoothing_window);
        }
        self.history.resize(next.history_capacity);
        self.published.set_interval(next.output_interval);
        self.anchor_calculator = AnchorCalculator::new(next.anchor_standoff);
        self.scorer = QualityScorer::new(next.quality.clone());
        self.config = next;
        Ok(())
    }

    /// Start a calibration pass over the next `sample_count` valid frames
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `sample_count` is zero.
    pub fn calibrate(&mut self, sample_count: usize) -> Result<()> {
        self.calibration.begin(sample_count)
    }

    /// Calibrate from already collected faces
    ///
    /// # Errors
    ///
    /// Returns [`Error::InsufficientCalibrationSamples`] if fewer than the
    /// configured sample count are supplied.
    pub fn calibrate_from_samples(&mut self, samples: &[FaceGeometry]) -> Result<&CalibrationData> {
        let required = self.calibration.config().sample_count;
        self.calibration.calibrate_from_samples(samples, required)
    }

    #[must_use]
    pub fn calibration_status(&self) -> &CalibrationStatus {
        self.calibration.status()
    }

    #[must_use]
    pub fn calibration(&self) -> &CalibrationData {
        self.calibration.data()
    }

    /// Override calibration values; takes effect from the next frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the result is out of range;
    /// the previous calibration is retained.
    pub fn update_calibration(&mut self, update: &CalibrationUpdate) -> Result<()> {
        let mut calibration = self.calibration.clone();
        calibration.update(update)?;
        let camera = CameraModel::new(calibration.data(), &self.camera_config)?;
        self.calibration = calibration;
        self.builder.set_camera(camera);
        Ok(())
    }

    /// Restore default calibration
    pub fn reset_calibration(&mut self) {
        self.calibration.reset();
        match CameraModel::new(self.calibration.data(), &self.camera_config) {
            Ok(camera) => self.builder.set_camera(camera),
            Err(e) => warn!("Keeping previous camera after calibration reset: {e}"),
        }
        info!("Calibration reset to defaults");
    }

    /// Pose history, oldest first
    #[must_use]
    pub fn pose_history(&self) -> Vec<PoseRecord> {
        self.history.to_vec()
    }

    #[must_use]
    pub fn history(&self) -> &TrackingHistory {
        &self.history
    }

    #[must_use]
    pub fn world_to_screen(&self, point: &Point3<f64>) -> Option<ScreenPoint> {
        self.builder.camera().world_to_screen(point)
    }

    #[must_use]
    pub fn screen_to_world_ray(&self, x: f64, y: f64) -> Option<Ray> {
        self.builder.camera().screen_to_world_ray(x, y)
    }

    #[must_use]
    pub fn glasses_dimensions(&self) -> &GlassesDimensions {
        &self.glasses
    }

    /// Select a different frame; takes effect from the next frame
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for non-positive dimensions.
    pub fn set_glasses_dimensions(&mut self, dimensions: GlassesDimensions) -> Result<()> {
        dimensions.validate()?;
        self.glasses = dimensions;
        Ok(())
    }

    /// Rescale intrinsics and viewport to a new image size
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a zero width or height.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidConfiguration(format!("Invalid viewport {width}x{height}")));
        }
        let mut calibration = self.calibration.clone();
        calibration.resize(width, height);
        let camera = CameraModel::new(calibration.data(), &self.camera_config)?;
        self.calibration = calibration;
        self.builder.set_camera(camera);
        Ok(())
    }
}
