//! Helper functions and utilities for tests

#![allow(dead_code)]

use eyewear_pose::{
    constants::DEFAULT_EYE_DISTANCE, face_geometry::FaceGeometry, landmarks::LandmarkFrame,
    pose_estimation::HeadPose,
};
use nalgebra::{Point3, UnitQuaternion, Vector3};
use rand::{rngs::StdRng, Rng};

/// Frame interval of a 30 fps camera
pub const FRAME_INTERVAL: f64 = 1.0 / 30.0;

/// Head pose from a position, Euler angles in degrees and a scale
pub fn head_pose(position: [f64; 3], degrees: [f64; 3], scale: f64) -> HeadPose {
    HeadPose {
        position: Point3::from(position),
        rotation: UnitQuaternion::from_euler_angles(
            degrees[0].to_radians(),
            degrees[1].to_radians(),
            degrees[2].to_radians(),
        ),
        scale,
    }
}

/// Frontal face half a metre in front of the camera
pub fn frontal_frame(confidence: f64) -> LandmarkFrame {
    LandmarkFrame::from_model(&head_pose([0.0, 0.0, -500.0], [0.0; 3], 1.0), confidence)
}

/// Frame at `pose` with uniform jitter of `amplitude` on every coordinate
pub fn noisy_frame(pose: &HeadPose, confidence: f64, amplitude: f64, rng: &mut StdRng) -> LandmarkFrame {
    let clean = LandmarkFrame::from_model(pose, confidence);
    if amplitude <= 0.0 {
        return clean;
    }
    let points = clean
        .points()
        .iter()
        .map(|p| {
            p + Vector3::new(
                rng.gen_range(-amplitude..=amplitude),
                rng.gen_range(-amplitude..=amplitude),
                rng.gen_range(-amplitude..=amplitude),
            )
        })
        .collect();
    LandmarkFrame::new(points, confidence)
}

/// Geometry of a frontal face whose eyes are `eye_distance` apart
pub fn geometry_with_eye_distance(eye_distance: f64) -> FaceGeometry {
    let pose = head_pose([0.0, 0.0, -500.0], [0.0; 3], eye_distance / DEFAULT_EYE_DISTANCE);
    FaceGeometry::estimate(&LandmarkFrame::from_model(&pose, 1.0)).expect("model face is complete")
}

/// Assert two points are within `tolerance` of each other
pub fn assert_point_near(actual: &Point3<f64>, expected: &Point3<f64>, tolerance: f64) {
    let distance = nalgebra::distance(actual, expected);
    assert!(
        distance <= tolerance,
        "expected {expected} within {tolerance}, got {actual} (off by {distance})"
    );
}
