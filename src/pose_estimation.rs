//! Raw head pose from face geometry and calibration.

use crate::{
    calibration::CalibrationData,
    constants::EPSILON,
    face_geometry::FaceGeometry,
    utils::wrap_degrees3,
    Error, Result,
};
use nalgebra::{Matrix3, Point3, Rotation3, Unit, UnitQuaternion, Vector3};

/// Rigid placement of the tracked head: position, rotation, uniform scale
#[derive(Debug, Clone, PartialEq)]
pub struct HeadPose {
    /// Midpoint between the eyes, depth-adjusted
    pub position: Point3<f64>,
    /// Orientation of the face frame (x = eye axis, z = face normal)
    pub rotation: UnitQuaternion<f64>,
    /// Eye distance relative to the calibrated baseline, always positive
    pub scale: f64,
}

impl HeadPose {
    /// Identity pose at `position`
    #[must_use]
    pub fn at(position: Point3<f64>) -> Self {
        Self {
            position,
            rotation: UnitQuaternion::identity(),
            scale: 1.0,
        }
    }

    /// Rotation as `(roll, pitch, yaw)` in degrees
    #[must_use]
    pub fn euler_degrees(&self) -> Vector3<f64> {
        let (roll, pitch, yaw) = self.rotation.euler_angles();
        wrap_degrees3(&Vector3::new(roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()))
    }
}

/// Builds a [`HeadPose`] from [`FaceGeometry`]. Stateless.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadPoseEstimator;

impl HeadPoseEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Estimate the unfiltered head pose.
    ///
    /// Before the first calibration sample the scale falls back to 1.0
    /// (clamped to the configured bounds) instead of failing.
    #[must_use]
    pub fn estimate(&self, geometry: &FaceGeometry, calibration: &CalibrationData) -> HeadPose {
        let mut position = geometry.eye_midpoint();
        position.z = position.z.mul_add(calibration.depth_scale, calibration.depth_offset);

        let scale = Self::scale(geometry, calibration).unwrap_or_else(|e| {
            log::debug!("{e}; using identity scale");
            calibration.clamp_scale(1.0)
        });

        HeadPose {
            position,
            rotation: Self::rotation(&geometry.eye_vector, &geometry.face_normal),
            scale,
        }
    }

    /// Eye distance over the calibrated average, clamped to the scale bounds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UncalibratedState`] if no calibration sample has been
    /// committed yet.
    pub fn scale(geometry: &FaceGeometry, calibration: &CalibrationData) -> Result<f64> {
        if calibration.sample_count == 0 || calibration.average_eye_distance <= EPSILON {
            return Err(Error::UncalibratedState);
        }
        Ok(calibration.clamp_scale(geometry.eye_distance / calibration.average_eye_distance))
    }

    /// Orthonormal basis from the eye axis and the face normal.
    ///
    /// Landmark noise leaves the normal slightly off-perpendicular to the eye
    /// axis, so it is re-orthogonalized (Gram-Schmidt) before the third axis
    /// is taken as their cross product.
    #[must_use]
    pub fn rotation(eye_vector: &Unit<Vector3<f64>>, face_normal: &Unit<Vector3<f64>>) -> UnitQuaternion<f64> {
        let x_axis = eye_vector.into_inner();
        let projected = face_normal.into_inner() - x_axis * face_normal.dot(&x_axis);
        let Some(z_axis) = Unit::try_new(projected, EPSILON) else {
            return UnitQuaternion::rotation_between(&Vector3::x(), &x_axis).unwrap_or_else(UnitQuaternion::identity);
        };
        let z_axis = z_axis.into_inner();
        let y_axis = z_axis.cross(&x_axis);

        let basis = Matrix3::from_columns(&[x_axis, y_axis, z_axis]);
        UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(basis))
    }
}
