//! Error types for the filter engine.

use enough::StopReason;
use thiserror::Error;

use crate::face::ClassifierError;

/// Error type for filter invocations.
#[derive(Debug, Error)]
pub enum FilterError {
    /// The operation observed its stop token and unwound.
    ///
    /// This is not a fault: the caller simply has no result to publish.
    #[error("Operation cancelled")]
    Cancelled,

    /// Settings belonging to another filter were passed to `apply`.
    #[error("Filter `{filter}` cannot apply settings for `{got}`")]
    SettingsMismatch {
        /// Id of the filter that was invoked.
        filter: &'static str,
        /// Id of the filter the settings belong to.
        got: &'static str,
    },

    /// The pixel buffer is malformed (sample count or dimensions).
    #[error("Invalid pixel buffer: {0}")]
    InvalidBuffer(String),

    /// A sub-rectangle access fell outside the raster.
    #[error("Region {width}x{height} at ({x}, {y}) is outside the {buffer_width}x{buffer_height} buffer")]
    OutOfBounds {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        buffer_width: u32,
        buffer_height: u32,
    },

    /// The external cascade classifier failed.
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

impl FilterError {
    /// Returns true for cooperative cancellation, which callers must not surface.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FilterError::Cancelled)
    }
}

impl From<StopReason> for FilterError {
    fn from(_: StopReason) -> Self {
        FilterError::Cancelled
    }
}

/// Result type for filter invocations.
pub type FilterResult<T> = Result<T, FilterError>;
