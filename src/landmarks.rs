//! Canonical landmark frames supplied by the external face tracker.
//!
//! The detector adapter converts whatever mesh its model produces into the
//! fixed [`LandmarkId`] ordering below. Coordinates are right-handed with
//! x to the right, y up and +z toward the viewer; the camera sits at the
//! origin looking down -z. Units are millimetre-like.

use crate::{constants::NUM_LANDMARKS, pose_estimation::HeadPose};
use nalgebra::{Point3, Vector3};

/// Canonical landmark indices. The order is fixed and never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkId {
    LeftEyeOuter = 0,
    LeftEyeInner = 1,
    LeftEyeCenter = 2,
    RightEyeInner = 3,
    RightEyeOuter = 4,
    RightEyeCenter = 5,
    NoseBridgeTop = 6,
    NoseBridgeMid = 7,
    NoseTip = 8,
    LeftTemple = 9,
    RightTemple = 10,
    LeftEyebrow = 11,
    RightEyebrow = 12,
    LeftCheek = 13,
    RightCheek = 14,
    Chin = 15,
    Forehead = 16,
}

impl LandmarkId {
    /// All landmark ids in canonical order
    pub const ALL: [Self; NUM_LANDMARKS] = [
        Self::LeftEyeOuter,
        Self::LeftEyeInner,
        Self::LeftEyeCenter,
        Self::RightEyeInner,
        Self::RightEyeOuter,
        Self::RightEyeCenter,
        Self::NoseBridgeTop,
        Self::NoseBridgeMid,
        Self::NoseTip,
        Self::LeftTemple,
        Self::RightTemple,
        Self::LeftEyebrow,
        Self::RightEyebrow,
        Self::LeftCheek,
        Self::RightCheek,
        Self::Chin,
        Self::Forehead,
    ];

    /// Position of this landmark in a frame's point array
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// Average adult face in head coordinates: origin at the eye midpoint, x
/// toward the right eye, y up, +z out of the face. The eye line and the nose
/// ridge span a plane facing +z, so this model has an identity head pose.
pub const FACE_MODEL: [[f64; 3]; NUM_LANDMARKS] = [
    [-45.0, 0.0, 0.0],   // left eye outer
    [-18.0, 0.0, 0.0],   // left eye inner
    [-31.5, 0.0, 0.0],   // left eye center
    [18.0, 0.0, 0.0],    // right eye inner
    [45.0, 0.0, 0.0],    // right eye outer
    [31.5, 0.0, 0.0],    // right eye center
    [0.0, 5.0, 12.0],    // nose bridge top
    [0.0, -10.0, 14.0],  // nose bridge mid
    [0.0, -40.0, 12.0],  // nose tip
    [-68.0, 5.0, -30.0], // left temple
    [68.0, 5.0, -30.0],  // right temple
    [-31.5, 15.0, 2.0],  // left eyebrow
    [31.5, 15.0, 2.0],   // right eyebrow
    [-70.0, -40.0, -20.0], // left cheek
    [70.0, -40.0, -20.0],  // right cheek
    [0.0, -95.0, -5.0],  // chin
    [0.0, 30.0, -5.0],   // forehead
];

/// One detection frame: the canonical landmark set plus detector confidence
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkFrame {
    points: Vec<Point3<f64>>,
    confidence: f64,
}

impl LandmarkFrame {
    /// Create a frame from landmark points in canonical order.
    ///
    /// Confidence is sanitised into `[0, 1]`; a non-finite value counts as 0.
    /// A frame with the wrong number of points is accepted here and treated
    /// as "no detection" by the geometry estimator.
    #[must_use]
    pub fn new(points: Vec<Point3<f64>>, confidence: f64) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self { points, confidence }
    }

    /// [`FACE_MODEL`] placed at `pose`; the eye midpoint lands on `pose.position`
    #[must_use]
    pub fn from_model(pose: &HeadPose, confidence: f64) -> Self {
        let points = FACE_MODEL
            .iter()
            .map(|p| pose.position + pose.rotation * (Vector3::from(*p) * pose.scale))
            .collect();
        Self::new(points, confidence)
    }

    /// Detector confidence in `[0, 1]`
    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Raw points in canonical order
    #[must_use]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    /// True when the frame carries the full canonical set of finite points
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.points.len() == NUM_LANDMARKS
            && self
                .points
                .iter()
                .all(|p| p.x.is_finite() && p.y.is_finite() && p.z.is_finite())
    }

    /// Look up a landmark by id
    #[must_use]
    pub fn get(&self, id: LandmarkId) -> Option<&Point3<f64>> {
        self.points.get(id.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_dense_and_ordered() {
        for (i, id) in LandmarkId::ALL.iter().enumerate() {
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn test_confidence_sanitised() {
        let points = vec![Point3::origin(); NUM_LANDMARKS];
        assert_eq!(LandmarkFrame::new(points.clone(), 1.5).confidence(), 1.0);
        assert_eq!(LandmarkFrame::new(points.clone(), -0.2).confidence(), 0.0);
        assert_eq!(LandmarkFrame::new(points, f64::NAN).confidence(), 0.0);
    }

    #[test]
    fn test_completeness() {
        let full = LandmarkFrame::new(vec![Point3::origin(); NUM_LANDMARKS], 1.0);
        assert!(full.is_complete());

        let short = LandmarkFrame::new(vec![Point3::origin(); 3], 1.0);
        assert!(!short.is_complete());

        let mut points = vec![Point3::origin(); NUM_LANDMARKS];
        points[4].x = f64::NAN;
        assert!(!LandmarkFrame::new(points, 1.0).is_complete());
    }

    #[test]
    fn test_model_frame_places_eye_midpoint() {
        let pose = HeadPose {
            position: Point3::new(5.0, -3.0, -450.0),
            rotation: nalgebra::UnitQuaternion::from_euler_angles(0.0, 0.3, 0.0),
            scale: 1.2,
        };
        let frame = LandmarkFrame::from_model(&pose, 0.8);
        assert!(frame.is_complete());

        let left = frame.get(LandmarkId::LeftEyeCenter).unwrap();
        let right = frame.get(LandmarkId::RightEyeCenter).unwrap();
        assert!((nalgebra::center(left, right) - pose.position).norm() < 1e-9);
        assert!((nalgebra::distance(left, right) - 63.0 * 1.2).abs() < 1e-9);
    }
}
