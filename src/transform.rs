//! Face, world, camera and screen transforms.
//!
//! `face_to_world = T(position) * R(rotation) * S(scale)`; component
//! transforms are `face_to_world * local_offset(component)`. The projection
//! utilities are pure functions of the camera and safe to call at any rate.

use crate::{
    anchors::GlassesAnchorPoints,
    calibration::CalibrationData,
    constants::{DEFAULT_FAR_PLANE, DEFAULT_NEAR_PLANE, EPSILON},
    pose_estimation::HeadPose,
    Error, Result,
};
use nalgebra::{Matrix4, Point2, Point3, Unit, Vector3, Vector4};
use serde::{Deserialize, Serialize};

/// Camera placement and clip planes; intrinsics come from calibration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub near: f64,
    pub far: f64,
    /// Camera position in world space
    pub eye: [f64; 3],
    /// Point the camera looks at
    pub target: [f64; 3],
    pub up: [f64; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            near: DEFAULT_NEAR_PLANE,
            far: DEFAULT_FAR_PLANE,
            eye: [0.0, 0.0, 0.0],
            target: [0.0, 0.0, -1.0],
            up: [0.0, 1.0, 0.0],
        }
    }
}

impl CameraConfig {
    /// Validate clip planes and camera orientation
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for `near <= 0`, `far <= near`,
    /// or a degenerate view direction.
    pub fn validate(&self) -> Result<()> {
        if !(self.near.is_finite() && self.near > 0.0 && self.far.is_finite() && self.far > self.near) {
            return Err(Error::InvalidConfiguration(format!(
                "Clip planes must satisfy 0 < near < far, got near={} far={}",
                self.near, self.far
            )));
        }
        let forward = Vector3::from(self.target) - Vector3::from(self.eye);
        if forward.cross(&Vector3::from(self.up)).norm() < EPSILON {
            return Err(Error::InvalidConfiguration(
                "Camera up vector must not be parallel to the view direction".to_string(),
            ));
        }
        Ok(())
    }
}

/// A world-space ray
#[derive(Debug, Clone, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
}

impl Ray {
    /// Perpendicular distance from `point` to the ray's line
    #[must_use]
    pub fn distance_to(&self, point: &Point3<f64>) -> f64 {
        let offset = point - self.origin;
        (offset - self.direction.into_inner() * offset.dot(self.direction.as_ref())).norm()
    }
}

/// Screen-space position in pixels, y down, with NDC depth in `[-1, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub position: Point2<f64>,
    pub depth: f64,
}

/// World, camera and viewport matrices for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinateTransform {
    pub face_to_world: Matrix4<f64>,
    pub world_to_face: Matrix4<f64>,
    pub view: Matrix4<f64>,
    pub projection: Matrix4<f64>,
    pub viewport: Matrix4<f64>,
}

/// Per-component model matrices for the glasses
#[derive(Debug, Clone, PartialEq)]
pub struct GlassesTransform {
    pub frame: Matrix4<f64>,
    pub left_lens: Matrix4<f64>,
    pub right_lens: Matrix4<f64>,
    /// Temple hinge; the temple model extends along local -z
    pub left_temple: Matrix4<f64>,
    pub right_temple: Matrix4<f64>,
    pub bridge: Matrix4<f64>,
}

/// Pinhole camera with view, projection and viewport matrices.
///
/// Projection is ideal pinhole: the calibration's distortion coefficients are
/// carried for consumers that undistort images but are not applied here.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraModel {
    width: f64,
    height: f64,
    view: Matrix4<f64>,
    projection: Matrix4<f64>,
    viewport: Matrix4<f64>,
}

impl CameraModel {
    /// Build from calibrated intrinsics and the camera placement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the camera config is
    /// invalid or the image size is zero.
    pub fn new(calibration: &CalibrationData, config: &CameraConfig) -> Result<Self> {
        config.validate()?;
        let [width, height] = calibration.image_size;
        if width == 0 || height == 0 {
            return Err(Error::InvalidConfiguration("Image size must be non-zero".to_string()));
        }
        let (w, h) = (f64::from(width), f64::from(height));
        let fy = calibration.focal_length;
        // square pixels
        let fx = fy;
        let [cx, cy] = calibration.principal_point;
        let (n, f) = (config.near, config.far);

        #[rustfmt::skip]
        let projection = Matrix4::new(
            2.0 * fx / w, 0.0,          1.0 - 2.0 * cx / w,   0.0,
            0.0,          2.0 * fy / h, 2.0 * cy / h - 1.0,   0.0,
            0.0,          0.0,          -(f + n) / (f - n),   -2.0 * f * n / (f - n),
            0.0,          0.0,          -1.0,                 0.0,
        );

        #[rustfmt::skip]
        let viewport = Matrix4::new(
            w / 2.0, 0.0,      0.0, w / 2.0,
            0.0,     -h / 2.0, 0.0, h / 2.0,
            0.0,     0.0,      0.5, 0.5,
            0.0,     0.0,      0.0, 1.0,
        );

        let view = Matrix4::look_at_rh(
            &Point3::from(config.eye),
            &Point3::from(config.target),
            &Vector3::from(config.up),
        );

        Ok(Self {
            width: w,
            height: h,
            view,
            projection,
            viewport,
        })
    }

    #[must_use]
    pub fn view(&self) -> &Matrix4<f64> {
        &self.view
    }

    #[must_use]
    pub fn projection(&self) -> &Matrix4<f64> {
        &self.projection
    }

    #[must_use]
    pub fn viewport(&self) -> &Matrix4<f64> {
        &self.viewport
    }

    /// Project a world point to pixels. `None` if it is behind the camera.
    #[must_use]
    pub fn world_to_screen(&self, point: &Point3<f64>) -> Option<ScreenPoint> {
        let clip = self.projection * self.view * point.to_homogeneous();
        if clip.w <= EPSILON {
            return None;
        }
        let ndc = Vector4::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w, 1.0);
        let pixel = self.viewport * ndc;
        Some(ScreenPoint {
            position: Point2::new(pixel.x, pixel.y),
            depth: ndc.z,
        })
    }

    /// Inverse-project a pixel into a world-space ray starting on the near plane
    #[must_use]
    pub fn screen_to_world_ray(&self, x: f64, y: f64) -> Option<Ray> {
        let inverse = (self.projection * self.view).try_inverse()?;
        let ndc_x = 2.0 * x / self.width - 1.0;
        let ndc_y = 1.0 - 2.0 * y / self.height;

        let unproject = |ndc_z: f64| -> Option<Point3<f64>> {
            let h = inverse * Vector4::new(ndc_x, ndc_y, ndc_z, 1.0);
            (h.w.abs() > EPSILON).then(|| Point3::new(h.x / h.w, h.y / h.w, h.z / h.w))
        };
        let near = unproject(-1.0)?;
        let far = unproject(1.0)?;
        let direction = Unit::try_new(far - near, EPSILON)?;
        Some(Ray { origin: near, direction })
    }
}

/// `T(position) * R(rotation) * S(scale)`
#[must_use]
pub fn face_to_world(pose: &HeadPose) -> Matrix4<f64> {
    Matrix4::new_translation(&pose.position.coords) * pose.rotation.to_homogeneous() * Matrix4::new_scaling(pose.scale)
}

/// Exact inverse of [`face_to_world`]: `S(1/scale) * R^T * T(-position)`
#[must_use]
pub fn world_to_face(pose: &HeadPose) -> Matrix4<f64> {
    Matrix4::new_scaling(1.0 / pose.scale)
        * pose.rotation.inverse().to_homogeneous()
        * Matrix4::new_translation(&(-pose.position.coords))
}

/// Apply a homogeneous transform to a point
#[must_use]
pub fn transform_point(matrix: &Matrix4<f64>, point: &Point3<f64>) -> Point3<f64> {
    let h = matrix * point.to_homogeneous();
    Point3::new(h.x, h.y, h.z) / h.w
}

/// Composes pose, anchors and camera into render transforms
#[derive(Debug, Clone)]
pub struct TransformBuilder {
    camera: CameraModel,
}

impl TransformBuilder {
    #[must_use]
    pub fn new(camera: CameraModel) -> Self {
        Self { camera }
    }

    #[must_use]
    pub fn camera(&self) -> &CameraModel {
        &self.camera
    }

    pub fn set_camera(&mut self, camera: CameraModel) {
        self.camera = camera;
    }

    /// Build the frame's coordinate and component transforms
    #[must_use]
    pub fn build(&self, pose: &HeadPose, anchors: &GlassesAnchorPoints) -> (CoordinateTransform, GlassesTransform) {
        let face_to_world = face_to_world(pose);
        let world_to_face = world_to_face(pose);

        let component = |anchor: &Point3<f64>| {
            let local = transform_point(&world_to_face, anchor);
            face_to_world * Matrix4::new_translation(&local.coords)
        };
        let bridge = component(&anchors.bridge_center);

        let glasses = GlassesTransform {
            frame: bridge,
            left_lens: component(&anchors.left_lens_center),
            right_lens: component(&anchors.right_lens_center),
            left_temple: component(&anchors.left_temple_start),
            right_temple: component(&anchors.right_temple_start),
            bridge,
        };
        let coordinate = CoordinateTransform {
            face_to_world,
            world_to_face,
            view: self.camera.view,
            projection: self.camera.projection,
            viewport: self.camera.viewport,
        };
        (coordinate, glasses)
    }
}
