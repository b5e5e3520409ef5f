//! Error types for the eyewear pose library.

use thiserror::Error;

/// Main error type for the library
///
/// Every per-frame variant is recoverable: the engine degrades to holding its
/// last output or rejecting the update instead of propagating a failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The frame carried no landmarks, or an incomplete landmark set
    #[error("No face detected in landmark frame")]
    NoFaceDetected,

    /// Scale was requested before any calibration sample was committed
    #[error("Calibration has no samples yet")]
    UncalibratedState,

    /// A calibration pass timed out before enough valid samples arrived
    #[error("Insufficient calibration samples: collected {collected} of {required}")]
    InsufficientCalibrationSamples {
        /// Valid samples collected before the timeout
        collected: usize,
        /// Samples the pass asked for
        required: usize,
    },

    /// Detection confidence below the configured threshold
    #[error("Low confidence frame: {confidence:.3} below threshold {threshold:.3}")]
    LowConfidenceFrame {
        /// Confidence reported by the detector
        confidence: f64,
        /// Configured acceptance threshold
        threshold: f64,
    },

    /// A configuration or calibration update was out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Frame timestamp did not advance past the last processed frame
    #[error("Out of order frame: timestamp {timestamp} is not after {last}")]
    OutOfOrderFrame {
        /// Timestamp of the rejected frame
        timestamp: f64,
        /// Timestamp of the last processed frame
        last: f64,
    },

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration file could not be parsed or serialized
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic I/O error with description
    #[error("I/O error: {0}")]
    IoError(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
