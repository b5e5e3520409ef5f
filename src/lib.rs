//! Eyewear pose library: stable glasses placement from noisy face landmarks.
//!
//! Each detection frame flows through a fixed pipeline:
//! 1. Face geometry (eye distance, face normal, reference points) from the
//!    canonical landmark set
//! 2. Raw head pose (position, rotation, scale) against the session calibration
//! 3. Temporal stabilization with one of four interchangeable strategies
//!    (exponential, Kalman, confidence-adaptive, hybrid) plus outlier rejection
//! 4. Glasses anchor points and the render transforms built from them
//! 5. Quality scoring and the tracking loss/recovery state machine
//!
//! The engine performs no I/O and no threading; call it once per frame in
//! timestamp order.
//!
//! # Examples
//!
//! ## Basic Usage
//!
//! ```no_run
//! use eyewear_pose::{config::Config, engine::GlassesMappingEngine, landmarks::LandmarkFrame};
//! use nalgebra::Point3;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = GlassesMappingEngine::new(Config::default())?;
//!
//! // Landmarks from the face tracker, in canonical order
//! let points: Vec<Point3<f64>> = vec![Point3::origin(); 17];
//! let frame = LandmarkFrame::new(points, 0.92);
//!
//! let report = engine.update(0.033, Some(&frame));
//! if let Some(output) = report.output {
//!     println!("{:?} at {}", report.state, output.position.position);
//!     let frame_matrix = output.glasses_transform.frame;
//!     # let _ = frame_matrix;
//! }
//!
//! // No face this frame: the previous placement is held
//! let report = engine.update(0.066, None);
//! # let _ = report;
//! # Ok(())
//! # }
//! ```
//!
//! ## Switching Algorithms and Calibrating
//!
//! ```no_run
//! use eyewear_pose::{config::Config, engine::GlassesMappingEngine, filters::AlgorithmKind};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut engine = GlassesMappingEngine::new(Config::from_file("eyewear.yaml")?)?;
//!
//! // Continues from the current output, no jump
//! engine.set_algorithm(AlgorithmKind::Kalman);
//!
//! // Average the next 30 valid faces into a new baseline
//! engine.calibrate(30)?;
//! println!("{:?}", engine.calibration_status());
//! # Ok(())
//! # }
//! ```
//!
//! ## Throttled Output
//!
//! ```no_run
//! use eyewear_pose::{config::Config, engine::GlassesMappingEngine};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::default();
//! config.positioning.output_interval = 0.1;
//! let mut engine = GlassesMappingEngine::new(config)?;
//!
//! // every frame is filtered, but a new output is released at most every 100 ms
//! for i in 0..30 {
//!     let now = f64::from(i) / 30.0;
//!     engine.update(now, None);
//!     if let Some(output) = engine.sample(now) {
//!         println!("{}", output.mapping_quality.confidence);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Glasses anchor points on the face
pub mod anchors;

/// Session calibration and camera intrinsics
pub mod calibration;

/// Configuration management
pub mod config;

/// Constants used throughout the library
pub mod constants;

/// Per-frame mapping engine
pub mod engine;

/// Error types and result handling
pub mod error;

/// Face measurements from landmarks
pub mod face_geometry;

/// Temporal stabilization algorithms
pub mod filters;

/// Bounded pose history
pub mod history;

/// Canonical landmark frames
pub mod landmarks;

/// Raw head pose estimation
pub mod pose_estimation;

/// Tracking quality scores
pub mod quality;

/// Tracking loss and recovery state machine
pub mod recovery;

/// Output rate limiting
pub mod throttle;

/// Camera and render transforms
pub mod transform;

/// Angle and range helpers
pub mod utils;

pub use engine::{FrameReport, FrameStatus, GlassesMappingEngine, MappingOutput};
pub use error::{Error, Result};
