//! Small numeric helpers shared by the filters and the quality scorer.

use nalgebra::Vector3;

/// Wrap an angle in degrees into `(-180, 180]`
#[must_use]
pub fn wrap_degrees(angle: f64) -> f64 {
    if !angle.is_finite() {
        return angle;
    }
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

/// Shortest signed delta from `from` to `to`, in degrees
#[must_use]
pub fn shortest_angle_delta(from: f64, to: f64) -> f64 {
    wrap_degrees(to - from)
}

/// Shortest per-component deltas between two Euler triples
#[must_use]
pub fn shortest_angle_delta3(from: &Vector3<f64>, to: &Vector3<f64>) -> Vector3<f64> {
    Vector3::new(
        shortest_angle_delta(from.x, to.x),
        shortest_angle_delta(from.y, to.y),
        shortest_angle_delta(from.z, to.z),
    )
}

/// Wrap each component of an Euler triple
#[must_use]
pub fn wrap_degrees3(angles: &Vector3<f64>) -> Vector3<f64> {
    angles.map(wrap_degrees)
}

/// Clamp into `[0, 1]`, mapping NaN to 0
#[must_use]
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wrap_degrees() {
        assert_eq!(wrap_degrees(0.0), 0.0);
        assert_eq!(wrap_degrees(180.0), 180.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert!((wrap_degrees(190.0) + 170.0).abs() < 1e-12);
        assert!((wrap_degrees(-370.0) + 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_shortest_delta_crosses_boundary() {
        // 170 -> -170 is a 20 degree step, not -340
        assert!((shortest_angle_delta(170.0, -170.0) - 20.0).abs() < 1e-12);
        assert!((shortest_angle_delta(-170.0, 170.0) + 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_unit() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(-1.0), 0.0);
        assert_eq!(clamp_unit(2.0), 1.0);
        assert_eq!(clamp_unit(f64::INFINITY), 1.0);
    }

    proptest! {
        #[test]
        fn prop_wrap_stays_in_range(angle in -1.0e6..1.0e6f64) {
            let wrapped = wrap_degrees(angle);
            prop_assert!(wrapped > -180.0 && wrapped <= 180.0);
        }

        #[test]
        fn prop_delta_magnitude_at_most_half_turn(a in -720.0..720.0f64, b in -720.0..720.0f64) {
            prop_assert!(shortest_angle_delta(a, b).abs() <= 180.0);
        }
    }
}
