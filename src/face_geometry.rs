//! Semantic face measurements derived from one landmark frame.
//!
//! Purely geometric: no smoothing and no state, identical input always gives
//! identical output.

use crate::{
    constants::EPSILON,
    landmarks::{LandmarkFrame, LandmarkId},
    Error, Result,
};
use nalgebra::{Point3, Unit, Vector3};

/// Measurements and reference vectors of a detected face
#[derive(Debug, Clone, PartialEq)]
pub struct FaceGeometry {
    /// Distance between the two eye centers (IOD)
    pub eye_distance: f64,
    /// Cheek-to-cheek width of the face outline
    pub face_width: f64,
    /// Forehead-to-chin height
    pub face_height: f64,
    /// Nose bridge top to nose tip
    pub nose_length: f64,
    /// Temple-to-temple width
    pub temple_width: f64,

    pub left_eye_center: Point3<f64>,
    pub right_eye_center: Point3<f64>,
    pub nose_bridge_top: Point3<f64>,
    pub nose_bridge_mid: Point3<f64>,
    pub nose_tip: Point3<f64>,
    pub left_temple: Point3<f64>,
    pub right_temple: Point3<f64>,

    /// Unit vector from the left eye center to the right eye center
    pub eye_vector: Unit<Vector3<f64>>,
    /// Unit vector from the nose bridge top to the nose tip
    pub nose_vector: Unit<Vector3<f64>>,
    /// Unit normal of the face plane, pointing toward the camera
    pub face_normal: Unit<Vector3<f64>>,

    /// Detector confidence of the source frame
    pub confidence: f64,
}

impl FaceGeometry {
    /// Derive face geometry from a landmark frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoFaceDetected`] if the frame is incomplete or its
    /// reference landmarks coincide so no orientation can be derived.
    pub fn estimate(frame: &LandmarkFrame) -> Result<Self> {
        if !frame.is_complete() {
            return Err(Error::NoFaceDetected);
        }
        let at = |id: LandmarkId| frame.points()[id.index()];

        let left_eye_center = at(LandmarkId::LeftEyeCenter);
        let right_eye_center = at(LandmarkId::RightEyeCenter);
        let nose_bridge_top = at(LandmarkId::NoseBridgeTop);
        let nose_bridge_mid = at(LandmarkId::NoseBridgeMid);
        let nose_tip = at(LandmarkId::NoseTip);
        let left_temple = at(LandmarkId::LeftTemple);
        let right_temple = at(LandmarkId::RightTemple);

        let eye_vector = Unit::try_new(right_eye_center - left_eye_center, EPSILON).ok_or(Error::NoFaceDetected)?;
        let nose_vector = Unit::try_new(nose_tip - nose_bridge_top, EPSILON).ok_or(Error::NoFaceDetected)?;

        let eye_mid = nalgebra::center(&left_eye_center, &right_eye_center);
        let face_normal = Self::face_normal(&eye_vector, &nose_vector, &(nose_tip - eye_mid));

        Ok(Self {
            eye_distance: nalgebra::distance(&left_eye_center, &right_eye_center),
            face_width: nalgebra::distance(&at(LandmarkId::LeftCheek), &at(LandmarkId::RightCheek)),
            face_height: nalgebra::distance(&at(LandmarkId::Forehead), &at(LandmarkId::Chin)),
            nose_length: nalgebra::distance(&nose_bridge_top, &nose_tip),
            temple_width: nalgebra::distance(&left_temple, &right_temple),
            left_eye_center,
            right_eye_center,
            nose_bridge_top,
            nose_bridge_mid,
            nose_tip,
            left_temple,
            right_temple,
            eye_vector,
            nose_vector,
            face_normal,
            confidence: frame.confidence(),
        })
    }

    /// Normalized `eye x nose`, flipped to face the camera (+z).
    ///
    /// In a near-profile view the z component vanishes; the nose protrudes
    /// out of the eye plane, so the eye-midpoint-to-nose-tip direction breaks
    /// the tie.
    fn face_normal(
        eye_vector: &Unit<Vector3<f64>>,
        nose_vector: &Unit<Vector3<f64>>,
        nose_protrusion: &Vector3<f64>,
    ) -> Unit<Vector3<f64>> {
        let Some(normal) = Unit::try_new(eye_vector.cross(nose_vector), EPSILON) else {
            return Vector3::z_axis();
        };

        let facing = if normal.z.abs() > 1e-6 {
            normal.z
        } else {
            normal.dot(nose_protrusion)
        };

        if facing < 0.0 {
            -normal
        } else {
            normal
        }
    }

    /// Midpoint between the two eye centers
    #[must_use]
    pub fn eye_midpoint(&self) -> Point3<f64> {
        nalgebra::center(&self.left_eye_center, &self.right_eye_center)
    }

    /// Eye distance relative to face width, used as a self-consistency check
    #[must_use]
    pub fn eye_to_face_width_ratio(&self) -> Option<f64> {
        (self.face_width > EPSILON).then(|| self.eye_distance / self.face_width)
    }
}
