//! Constants used throughout the library

/// Number of landmarks in a canonical detection frame
pub const NUM_LANDMARKS: usize = 17;

/// Default calibration baselines (millimetre-like landmark units)
pub const DEFAULT_EYE_DISTANCE: f64 = 63.0;
pub const DEFAULT_FACE_WIDTH: f64 = 140.0;
pub const DEFAULT_FACE_HEIGHT: f64 = 125.0;

/// Default scale bounds
pub const DEFAULT_MIN_SCALE: f64 = 0.5;
pub const DEFAULT_MAX_SCALE: f64 = 2.0;

/// Default camera parameters
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 640;
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 480;
pub const DEFAULT_FOV_Y_DEGREES: f64 = 60.0;
pub const DEFAULT_NEAR_PLANE: f64 = 1.0;
pub const DEFAULT_FAR_PLANE: f64 = 5000.0;

/// Default frame rate assumption
pub const DEFAULT_FPS: f64 = 30.0;

/// Kalman time step bounds in seconds
pub const MIN_KALMAN_DT: f64 = 1.0 / 240.0;
pub const MAX_KALMAN_DT: f64 = 0.1;

/// Initial Kalman covariance on the first measurement
pub const KALMAN_INITIAL_COVARIANCE: f64 = 100.0;

/// Default glasses dimensions (millimetre-like units at scale 1)
pub const DEFAULT_LENS_WIDTH: f64 = 50.0;
pub const DEFAULT_LENS_HEIGHT: f64 = 40.0;
pub const DEFAULT_BRIDGE_WIDTH: f64 = 18.0;
pub const DEFAULT_TEMPLE_LENGTH: f64 = 140.0;

/// Calibration defaults
pub const DEFAULT_CALIBRATION_SAMPLES: usize = 30;
pub const DEFAULT_CALIBRATION_TIMEOUT: f64 = 5.0;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-10;
