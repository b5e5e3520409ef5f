//! End-to-end engine scenarios: occlusion, recovery, outliers, switching

mod test_helpers;

use eyewear_pose::{
    calibration::CalibrationData,
    config::{Config, PositioningConfigUpdate},
    face_geometry::FaceGeometry,
    filters::AlgorithmKind,
    landmarks::LandmarkFrame,
    pose_estimation::{HeadPose, HeadPoseEstimator},
    recovery::TrackingState,
    Error, FrameStatus, GlassesMappingEngine,
};
use nalgebra::Point3;
use rand::{rngs::StdRng, SeedableRng};
use test_helpers::{assert_point_near, frontal_frame, head_pose, noisy_frame, FRAME_INTERVAL};

fn engine() -> GlassesMappingEngine {
    GlassesMappingEngine::new(Config::default()).unwrap()
}

#[test]
fn test_single_missing_frame_holds_frozen_transform() {
    let mut engine = engine();
    let stable = frontal_frame(0.9);

    for i in 0..3 {
        let report = engine.update(f64::from(i) * FRAME_INTERVAL, Some(&stable));
        assert_eq!(report.status, FrameStatus::Accepted);
    }
    assert_eq!(engine.state(), TrackingState::Tracking);
    let frozen = engine.current().cloned().unwrap();

    // frame 4: occluded
    let report = engine.update(3.0 * FRAME_INTERVAL, None);
    assert_eq!(report.status, FrameStatus::Held(Error::NoFaceDetected));
    assert_eq!(report.state, TrackingState::Tracking);
    let held = report.output.unwrap();
    assert_eq!(held.glasses_transform, frozen.glasses_transform);
    assert_eq!(held.coordinate_transform, frozen.coordinate_transform);
    assert_eq!(held.position.position, frozen.position.position);
    assert_eq!(held.mapping_quality.tracking_loss, 1);

    // frame 5: back
    let report = engine.update(4.0 * FRAME_INTERVAL, Some(&frontal_frame(0.95)));
    assert_eq!(report.status, FrameStatus::Accepted);
    assert_eq!(report.state, TrackingState::Tracking);
    assert_eq!(report.output.unwrap().mapping_quality.tracking_loss, 0);
}

#[test]
fn test_long_occlusion_loses_and_recovers_tracking() {
    let mut engine = engine();
    let stable = frontal_frame(0.9);
    let mut t = 0.0;

    for _ in 0..10 {
        engine.update(t, Some(&stable));
        t += FRAME_INTERVAL;
    }
    let frozen = engine.current().cloned().unwrap();

    // 0.25 s timeout at 30 fps: lost on the 8th missing frame
    let mut lost_after = None;
    for n in 1..=20 {
        let report = engine.update(t, None);
        t += FRAME_INTERVAL;
        if report.state == TrackingState::Lost && lost_after.is_none() {
            lost_after = Some(n);
        }
        let output = report.output.unwrap();
        assert_eq!(output.glasses_transform, frozen.glasses_transform);
    }
    assert_eq!(lost_after, Some(8));
    let held = engine.current().unwrap();
    assert!(!held.position.is_stable);
    assert_eq!(held.mapping_quality.tracking_loss, 20);

    let recovery_frames = engine.config().recovery_frames;
    for n in 1..=recovery_frames {
        let report = engine.update(t, Some(&stable));
        t += FRAME_INTERVAL;
        let expected = if n < recovery_frames {
            TrackingState::Recovering
        } else {
            TrackingState::Tracking
        };
        assert_eq!(report.state, expected, "after {n} valid frames");
    }
}

#[test]
fn test_confidence_drops_while_face_is_lost() {
    let mut engine = engine();
    let mut t = 0.0;
    for _ in 0..40 {
        engine.update(t, Some(&frontal_frame(0.95)));
        t += FRAME_INTERVAL;
    }
    let tracked = engine.mapping_quality();
    assert!(tracked.accuracy > 0.9);

    for _ in 0..300 {
        engine.update(t, None);
        t += FRAME_INTERVAL;
    }
    assert_eq!(engine.state(), TrackingState::Lost);

    let lost = engine.mapping_quality();
    assert_eq!(lost.accuracy, 0.0);
    assert!(lost.confidence < tracked.confidence);
    // accuracy carries 0.3 of the default weights
    assert!(lost.confidence <= 0.7 + 1e-9);
    assert_eq!(lost.tracking_loss, 300);

    // the held output reports the same quality as the engine
    let held = engine.current().unwrap();
    assert_eq!(held.mapping_quality, lost);
    assert_eq!(held.quality.accuracy, 0.0);
}

#[test]
fn test_face_reacquired_far_from_where_it_was_lost() {
    let mut engine = engine();
    let mut t = 0.0;
    for _ in 0..20 {
        engine.update(t, Some(&frontal_frame(0.9)));
        t += FRAME_INTERVAL;
    }
    for _ in 0..60 {
        engine.update(t, None);
        t += FRAME_INTERVAL;
    }
    assert_eq!(engine.state(), TrackingState::Lost);

    let moved = LandmarkFrame::from_model(&head_pose([120.0, 0.0, -500.0], [0.0; 3], 1.0), 0.9);
    let report = engine.update(t, Some(&moved));
    t += FRAME_INTERVAL;
    assert_eq!(report.status, FrameStatus::Accepted);
    assert_eq!(report.state, TrackingState::Recovering);
    assert!(report.output.unwrap().position.position.x > 0.0);

    let mut last = None;
    for _ in 0..30 {
        let report = engine.update(t, Some(&moved));
        t += FRAME_INTERVAL;
        assert_eq!(report.status, FrameStatus::Accepted);
        last = report.output;
    }
    assert_eq!(engine.state(), TrackingState::Tracking);
    assert_point_near(&last.unwrap().position.position, &Point3::new(120.0, 0.0, -500.0), 5.0);
}

#[test]
fn test_low_confidence_frames_are_held() {
    let mut engine = engine();
    engine.update(0.0, Some(&frontal_frame(0.9)));

    let report = engine.update(FRAME_INTERVAL, Some(&frontal_frame(0.2)));
    assert!(matches!(report.status, FrameStatus::Held(Error::LowConfidenceFrame { .. })));
    assert_eq!(engine.mapping_quality().tracking_loss, 1);
    assert_eq!(engine.history().len(), 1);
}

#[test]
fn test_out_of_order_frames_are_ignored() {
    let mut engine = engine();
    engine.update(1.0, Some(&frontal_frame(0.9)));

    for timestamp in [0.5, 1.0, f64::NAN] {
        let report = engine.update(timestamp, Some(&frontal_frame(0.9)));
        assert!(matches!(report.status, FrameStatus::Held(_)), "{timestamp} was processed");
    }
    assert_eq!(engine.history().len(), 1);
    assert_eq!(engine.update(1.1, Some(&frontal_frame(0.9))).status, FrameStatus::Accepted);
}

#[test]
fn test_position_jump_rejected_then_followed() {
    let mut engine = engine();
    let mut t = 0.0;
    for _ in 0..5 {
        engine.update(t, Some(&frontal_frame(0.9)));
        t += FRAME_INTERVAL;
    }
    let before = engine.current().unwrap().position.position;

    let jumped = LandmarkFrame::from_model(&head_pose([200.0, 0.0, -500.0], [0.0; 3], 1.0), 0.9);
    let max_outliers = engine.config().max_outliers;
    for _ in 0..max_outliers {
        let report = engine.update(t, Some(&jumped));
        t += FRAME_INTERVAL;
        assert_eq!(report.status, FrameStatus::OutlierRejected);
        assert_eq!(report.output.unwrap().position.position, before);
    }

    let report = engine.update(t, Some(&jumped));
    assert_eq!(report.status, FrameStatus::Accepted);
    assert!(report.output.unwrap().position.position.x > before.x);
}

#[test]
fn test_scale_is_clamped_to_calibrated_bounds() {
    // direct: eye distance three times the baseline
    let calibration = CalibrationData {
        sample_count: 1,
        average_eye_distance: 63.0,
        min_scale: 0.5,
        max_scale: 2.0,
        ..CalibrationData::default()
    };
    let wide = head_pose([0.0, 0.0, -500.0], [0.0; 3], 3.0);
    let geometry = FaceGeometry::estimate(&LandmarkFrame::from_model(&wide, 1.0)).unwrap();
    let pose = HeadPoseEstimator::new().estimate(&geometry, &calibration);
    assert_eq!(pose.scale, 2.0);

    // through the engine, calibrated from the first face
    let mut engine = engine();
    engine.update(0.0, Some(&frontal_frame(1.0)));
    let report = engine.update(FRAME_INTERVAL, Some(&LandmarkFrame::from_model(&wide, 1.0)));
    assert_eq!(report.output.unwrap().raw_pose.scale, 2.0);
}

#[test]
fn test_algorithm_switch_continues_from_current_output() {
    let mut rng = StdRng::seed_from_u64(7);
    let pose: HeadPose = head_pose([10.0, -5.0, -480.0], [2.0, -4.0, 12.0], 1.0);
    let mut engine = engine();
    let mut t = 0.0;
    for _ in 0..30 {
        engine.update(t, Some(&noisy_frame(&pose, 0.9, 1.0, &mut rng)));
        t += FRAME_INTERVAL;
    }

    for kind in [AlgorithmKind::Basic, AlgorithmKind::Kalman, AlgorithmKind::Adaptive, AlgorithmKind::Hybrid] {
        let before = engine.current().unwrap().position.position;
        engine.set_algorithm(kind);
        assert_eq!(engine.algorithm(), kind);

        let report = engine.update(t, Some(&noisy_frame(&pose, 0.9, 1.0, &mut rng)));
        t += FRAME_INTERVAL;
        assert_eq!(report.status, FrameStatus::Accepted);
        assert_point_near(&report.output.unwrap().position.position, &before, 3.0);
    }
}

#[test]
fn test_invalid_config_update_keeps_previous_config() {
    let mut engine = engine();
    let before = engine.config().clone();

    let update = PositioningConfigUpdate {
        position_smoothing: Some(1.5),
        algorithm: Some(AlgorithmKind::Kalman),
        ..Default::default()
    };
    assert!(matches!(engine.update_config(&update), Err(Error::InvalidConfiguration(_))));
    assert_eq!(engine.config(), &before);
    assert_eq!(engine.algorithm(), AlgorithmKind::Hybrid);

    let update = PositioningConfigUpdate {
        algorithm: Some(AlgorithmKind::Kalman),
        history_capacity: Some(10),
        ..Default::default()
    };
    engine.update_config(&update).unwrap();
    assert_eq!(engine.algorithm(), AlgorithmKind::Kalman);

    for i in 0..20 {
        engine.update(f64::from(i) * FRAME_INTERVAL, Some(&frontal_frame(0.9)));
    }
    assert_eq!(engine.pose_history().len(), 10);
}

#[test]
fn test_output_is_rate_limited() {
    let mut config = Config::default();
    config.positioning.output_interval = 0.1;
    let mut engine = GlassesMappingEngine::new(config).unwrap();

    let mut published = 0;
    for i in 0..30 {
        let t = f64::from(i) * FRAME_INTERVAL;
        engine.update(t, Some(&frontal_frame(0.9)));
        if let Some(output) = engine.sample(t) {
            published += 1;
            assert_eq!(output.position.timestamp, t);
        }
    }
    // every frame was still filtered
    assert_eq!(engine.history().len(), 30);
    // every third or fourth frame, depending on rounding of the frame times
    assert!((8..=10).contains(&published), "published {published} outputs");
}

#[test]
fn test_reset_clears_tracking_but_keeps_calibration() {
    let mut engine = engine();
    for i in 0..5 {
        engine.update(f64::from(i) * FRAME_INTERVAL, Some(&frontal_frame(0.9)));
    }
    let calibration = engine.calibration().clone();
    assert!(calibration.is_calibrated());

    engine.reset();
    assert!(engine.current().is_none());
    assert!(engine.history().is_empty());
    assert_eq!(engine.state(), TrackingState::Lost);
    assert_eq!(engine.calibration(), &calibration);

    // timestamps may restart after a reset
    let report = engine.update(0.0, Some(&frontal_frame(0.9)));
    assert_eq!(report.status, FrameStatus::Accepted);
}

#[test]
fn test_stable_face_is_marked_stable() {
    let mut engine = engine();
    let mut last = None;
    for i in 0..40 {
        last = engine.update(f64::from(i) * FRAME_INTERVAL, Some(&frontal_frame(0.95))).output;
    }
    let output = last.unwrap();
    assert!(output.position.is_stable);
    assert!(output.quality.overall >= 0.6);
    assert_point_near(&output.position.position, &Point3::new(0.0, 0.0, -500.0), 1e-6);
}
