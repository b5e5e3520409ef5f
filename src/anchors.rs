//! Anchor points where parts of the glasses attach to the face.
//!
//! The glasses are rigid: anchor spacing follows the frame's own design
//! dimensions scaled by the head pose, never the wearer's eye distance.

use crate::{
    constants::*,
    face_geometry::FaceGeometry,
    filters::moving_average::MovingAverageFilter,
    pose_estimation::HeadPose,
    transform::{face_to_world, transform_point, world_to_face},
    Error, Result,
};
use nalgebra::{Point3, Vector3};
use serde::{Deserialize, Serialize};

/// Static design dimensions of the selected frame, in landmark units at scale 1
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlassesDimensions {
    pub lens_width: f64,
    pub lens_height: f64,
    pub bridge_width: f64,
    pub temple_length: f64,
}

impl Default for GlassesDimensions {
    fn default() -> Self {
        Self {
            lens_width: DEFAULT_LENS_WIDTH,
            lens_height: DEFAULT_LENS_HEIGHT,
            bridge_width: DEFAULT_BRIDGE_WIDTH,
            temple_length: DEFAULT_TEMPLE_LENGTH,
        }
    }
}

impl GlassesDimensions {
    /// Validate that every dimension is positive
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] for a non-positive or non-finite dimension.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("lens_width", self.lens_width),
            ("lens_height", self.lens_height),
            ("bridge_width", self.bridge_width),
            ("temple_length", self.temple_length),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfiguration(format!("{name} must be positive, got {value}")));
            }
        }
        Ok(())
    }

    /// Distance between the two lens centers
    #[must_use]
    pub fn lens_center_spacing(&self) -> f64 {
        self.bridge_width + self.lens_width
    }
}

/// Named 3D anchors for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct GlassesAnchorPoints {
    pub bridge_center: Point3<f64>,
    pub left_lens_center: Point3<f64>,
    pub right_lens_center: Point3<f64>,
    /// Temple landmark, used as a rotation and length reference only
    pub left_temple_start: Point3<f64>,
    /// Temple landmark, used as a rotation and length reference only
    pub right_temple_start: Point3<f64>,
    pub dimensions: GlassesDimensions,
}

impl GlassesAnchorPoints {
    /// Anchors in canonical order: bridge, left lens, right lens, left temple, right temple
    #[must_use]
    pub fn points(&self) -> [Point3<f64>; 5] {
        [
            self.bridge_center,
            self.left_lens_center,
            self.right_lens_center,
            self.left_temple_start,
            self.right_temple_start,
        ]
    }

    /// Rebuild from points in the order returned by [`Self::points`]
    #[must_use]
    pub fn from_points(points: [Point3<f64>; 5], dimensions: GlassesDimensions) -> Self {
        Self {
            bridge_center: points[0],
            left_lens_center: points[1],
            right_lens_center: points[2],
            left_temple_start: points[3],
            right_temple_start: points[4],
            dimensions,
        }
    }
}

/// Maps pose and geometry to anchor points. Stateless.
#[derive(Debug, Clone, Copy)]
pub struct AnchorCalculator {
    standoff: f64,
}

impl AnchorCalculator {
    /// Calculator with a standoff (distance off the face surface along the
    /// face normal, in landmark units at scale 1)
    #[must_use]
    pub fn new(standoff: f64) -> Self {
        Self { standoff }
    }

    /// Compute anchors for one frame
    #[must_use]
    pub fn calculate(
        &self,
        pose: &HeadPose,
        geometry: &FaceGeometry,
        dimensions: &GlassesDimensions,
    ) -> GlassesAnchorPoints {
        let standoff: Vector3<f64> = geometry.face_normal.into_inner() * (self.standoff * pose.scale);
        let lateral = pose.rotation * Vector3::x();
        let half_spacing = dimensions.lens_center_spacing() * pose.scale / 2.0;

        let bridge_center = nalgebra::center(&geometry.nose_bridge_top, &geometry.nose_bridge_mid) + standoff;
        let lens_line = geometry.eye_midpoint() + standoff;

        GlassesAnchorPoints {
            bridge_center,
            left_lens_center: lens_line - lateral * half_spacing,
            right_lens_center: lens_line + lateral * half_spacing,
            left_temple_start: geometry.left_temple,
            right_temple_start: geometry.right_temple,
            dimensions: *dimensions,
        }
    }
}

impl Default for AnchorCalculator {
    fn default() -> Self {
        Self::new(5.0)
    }
}

/// Smooths anchors in the face frame so per-landmark jitter does not shake
/// the glasses relative to the head.
///
/// Anchors are expressed relative to the raw pose, averaged, then placed
/// with the filtered pose.
#[derive(Debug, Clone)]
pub struct AnchorSmoother {
    filters: [MovingAverageFilter; 5],
}

impl AnchorSmoother {
    /// # Panics
    ///
    /// Panics if `window_size` is zero
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            filters: std::array::from_fn(|_| MovingAverageFilter::new(window_size)),
        }
    }

    #[must_use]
    pub fn window_size(&self) -> usize {
        self.filters[0].window_size()
    }

    pub fn smooth(&mut self, anchors: &GlassesAnchorPoints, raw_pose: &HeadPose, pose: &HeadPose) -> GlassesAnchorPoints {
        let to_face = world_to_face(raw_pose);
        let to_world = face_to_world(pose);
        let points = anchors.points();
        let smoothed = std::array::from_fn(|i| {
            let local = transform_point(&to_face, &points[i]);
            let averaged = self.filters[i].apply(&local.coords);
            transform_point(&to_world, &Point3::from(averaged))
        });
        GlassesAnchorPoints::from_points(smoothed, anchors.dimensions)
    }

    pub fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}
