//! Error type shared by every module of the crate.
use thiserror::Error;

/// Everything that can go wrong while building grids, sampling sightlines or writing results.
#[derive(Error, Debug)]
pub enum SightlineError {
    /// Invalid configuration, rejected before any sampling begins.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A numerical procedure (typically the distance-to-redshift inversion) did not converge.
    #[error("computation error: {0}")]
    Computation(String),

    /// An integration was requested on a redshift grid with fewer than two points.
    #[error("redshift grid has {points} point(s), but at least 2 are required for integration")]
    InsufficientGrid {
        /// Number of points the grid actually has.
        points: usize,
    },

    /// Two arrays that must be aligned point by point have different lengths.
    #[error("{context} length mismatch: expected {expected}, got {got}")]
    LengthMismatch {
        /// What was being compared.
        context: &'static str,
        /// Length of the reference array (usually the grid).
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV (de)serialization error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A random number generator could not be seeded from its parent stream.
    #[error("random number generator error: {0}")]
    Rng(#[from] rand::Error),
}

impl SightlineError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a computation error.
    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation(message.into())
    }
}

/// Convenience type for `Result<T, SightlineError>`.
pub type Result<T> = std::result::Result<T, SightlineError>;
