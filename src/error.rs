use thiserror::Error;

/// Errors raised while building or configuring wake filaments.
///
/// Numerical edge cases inside the velocity kernel never show up here; they
/// are absorbed by the core regularization and the velocity limiter.
#[derive(Error, Debug)]
pub enum WakeError {
    #[error("Invalid subdivision count: {0} (need at least 1)")]
    InvalidSubdivision(usize),

    #[error("Trailing edge and anchor nodes coincide")]
    ZeroLengthFilament,

    #[error("Cannot invert a zero-norm quaternion")]
    ZeroNormQuaternion,

    #[error("Invalid Mach number: {0} (expected 0 <= M < 1)")]
    InvalidMach(f64),

    #[error("Invalid core size: {0}")]
    InvalidCoreSize(f64),

    #[error("Cutoff distance {cutoff} must exceed the longest edge ({edge_length})")]
    CutoffTooSmall { cutoff: f64, edge_length: f64 },

    #[error("First edge {edge_length} is not above the tolerance {tolerance}; use fewer subdivisions")]
    EdgeBelowTolerance { edge_length: f64, tolerance: f64 },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Flow context already installed")]
    ContextAlreadyInstalled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WakeError>;
