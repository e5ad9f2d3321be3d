//! Error types for pipeline configuration.
//!
//! Frame processing itself never fails: bad input produces a flagged-invalid
//! [`DetectionResult`](crate::result::DetectionResult). Only loading and validating
//! configuration can return an error.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is not valid JSON or has the wrong shape.
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A lower HSV bound is above the matching upper bound.
    #[error(
        "invalid color range: channel {channel} lower bound {lower} exceeds upper bound {upper}"
    )]
    InvalidColorRange {
        /// Channel index (0 = hue, 1 = saturation, 2 = value).
        channel: usize,
        /// Lower bound on that channel.
        lower: u8,
        /// Upper bound on that channel.
        upper: u8,
    },

    /// Morphology kernel size out of the supported range.
    #[error("invalid morphology kernel size {size}: must be between 1 and {max}")]
    InvalidKernelSize {
        /// Requested size.
        size: u32,
        /// Largest supported size.
        max: u32,
    },
}

impl ConfigError {
    /// Creates an I/O error for `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
