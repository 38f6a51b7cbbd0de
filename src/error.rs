//! Error type shared by every engine operation.

use thiserror::Error;

/// Errors produced by the trajectory engine.
///
/// Numerical edge cases that can be recovered locally (temperature clamps,
/// altitudes above the atmosphere model) are logged instead and never
/// surface here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BallisticsError {
    /// A required argument was missing or malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A value fell outside the domain of an operation
    #[error("value error: {0}")]
    Value(String),

    /// A computation would have divided by zero
    #[error("zero division: {0}")]
    ZeroDivision(String),

    /// An index was outside a sequence
    #[error("index {index} out of bounds for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// Growing a buffer failed; the existing buffer is left intact
    #[error("failed to allocate room for {requested} trajectory samples")]
    Allocation { requested: usize },

    /// Drag table is too short or not strictly increasing in Mach
    #[error("invalid drag table: {0}")]
    InvalidDragTable(String),

    /// The requested distance is beyond the maximum achievable range
    #[error(
        "target distance {requested_ft:.2} ft exceeds maximum range {max_range_ft:.2} ft \
         (look angle {look_angle_rad:.6} rad)"
    )]
    OutOfRange {
        requested_ft: f64,
        max_range_ft: f64,
        look_angle_rad: f64,
    },

    /// Zero finding did not converge
    #[error(
        "zero finding failed after {iterations} iterations: {reason} \
         (error {error_ft:.6} ft, last elevation {last_elevation_rad:.6} rad)"
    )]
    ZeroFinding {
        error_ft: f64,
        iterations: usize,
        last_elevation_rad: f64,
        reason: String,
    },

    /// Adaptive step size collapsed below the allowed floor
    #[error("step size {step:e} s fell below the minimum at t = {time:.6} s")]
    StepSizeTooSmall { time: f64, step: f64 },

    /// An internal invariant was violated
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BallisticsError>;
