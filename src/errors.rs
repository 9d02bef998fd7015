//! Centralized error handling for nd_image_io
//!
//! Every failure is reported at the point of detection with enough context
//! (offending axis string, file path, expected vs. actual counts) to diagnose
//! the input. Nothing in the crate downgrades these to warnings or retries.

use std::fmt;
use std::path::PathBuf;

/// Main error type for nd_image_io operations
#[derive(Debug)]
pub enum NdImageError {
    /// Unknown or duplicate axis character, or axes that do not line up with a shape
    AxisVocabulary { axes: String, message: String },

    /// Requested axis order cannot be produced from the available axes
    AxisReorder { from: String, to: String, message: String },

    /// File-pattern grid is not dense, not contiguous, or has conflicting tags
    GridInconsistency {
        message: String,
        path: Option<PathBuf>,
    },

    /// No file satisfied the pattern and filters
    NoMatch { root: PathBuf },

    /// Shape cannot be decomposed or handled as requested
    UnsupportedShape(String),

    /// No adapter exists for this URI
    UnsupportedFormat { uri: String },

    /// Partition index beyond the number of partitions
    PartitionOutOfRange { index: usize, npartitions: usize },

    /// Broken internal invariant; indicates a bug rather than bad input
    Internal(String),

    /// I/O operation errors
    IoError(std::io::Error),

    /// Array shape or dimension error
    ArrayError(ndarray::ShapeError),

    /// Invalid axis tag pattern
    PatternError(regex::Error),

    /// Directory traversal error
    WalkError(walkdir::Error),

    /// Sidecar or header (de)serialization error
    JsonError(serde_json::Error),

    /// Failure decoding an `.npy` file
    NpyReadError(ndarray_npy::ReadNpyError),

    /// Failure encoding an `.npy` file
    NpyWriteError(ndarray_npy::WriteNpyError),

    /// TIFF decoding or encoding error
    TiffError(tiff::TiffError),

    /// Thread pool configuration error
    ThreadPoolError(String),

    /// Generic error for messages without a dedicated variant
    Generic(String),
}

impl NdImageError {
    pub fn vocabulary(axes: impl Into<String>, message: impl Into<String>) -> Self {
        Self::AxisVocabulary {
            axes: axes.into(),
            message: message.into(),
        }
    }

    pub fn reorder(
        from: impl Into<String>,
        to: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::AxisReorder {
            from: from.into(),
            to: to.into(),
            message: message.into(),
        }
    }

    pub fn grid(message: impl Into<String>) -> Self {
        Self::GridInconsistency {
            message: message.into(),
            path: None,
        }
    }

    pub fn grid_at(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::GridInconsistency {
            message: message.into(),
            path: Some(path.into()),
        }
    }

    pub fn unsupported_shape(message: impl Into<String>) -> Self {
        Self::UnsupportedShape(message.into())
    }
}

impl fmt::Display for NdImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NdImageError::AxisVocabulary { axes, message } => {
                write!(f, "Invalid axes '{}': {}", axes, message)
            }
            NdImageError::AxisReorder { from, to, message } => {
                write!(f, "Cannot reorder axes '{}' to '{}': {}", from, to, message)
            }
            NdImageError::GridInconsistency { message, path } => match path {
                Some(path) => write!(f, "Inconsistent file grid: {} ({})", message, path.display()),
                None => write!(f, "Inconsistent file grid: {}", message),
            },
            NdImageError::NoMatch { root } => write!(
                f,
                "No files found in '{}' that match the given pattern",
                root.display()
            ),
            NdImageError::UnsupportedShape(msg) => write!(f, "Unsupported shape: {}", msg),
            NdImageError::UnsupportedFormat { uri } => {
                write!(f, "No image adapter available for '{}'", uri)
            }
            NdImageError::PartitionOutOfRange { index, npartitions } => write!(
                f,
                "Partition {} is out of range, source has {} partitions",
                index, npartitions
            ),
            NdImageError::Internal(msg) => write!(f, "Internal error: {}", msg),
            NdImageError::IoError(e) => write!(f, "I/O error: {}", e),
            NdImageError::ArrayError(e) => write!(f, "Array error: {}", e),
            NdImageError::PatternError(e) => write!(f, "Invalid axis tag pattern: {}", e),
            NdImageError::WalkError(e) => write!(f, "Directory traversal error: {}", e),
            NdImageError::JsonError(e) => write!(f, "Metadata JSON error: {}", e),
            NdImageError::NpyReadError(e) => write!(f, "NPY read error: {}", e),
            NdImageError::NpyWriteError(e) => write!(f, "NPY write error: {}", e),
            NdImageError::TiffError(e) => write!(f, "TIFF error: {}", e),
            NdImageError::ThreadPoolError(msg) => write!(f, "Thread pool error: {}", msg),
            NdImageError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for NdImageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NdImageError::IoError(e) => Some(e),
            NdImageError::ArrayError(e) => Some(e),
            NdImageError::PatternError(e) => Some(e),
            NdImageError::WalkError(e) => Some(e),
            NdImageError::JsonError(e) => Some(e),
            NdImageError::NpyReadError(e) => Some(e),
            NdImageError::NpyWriteError(e) => Some(e),
            NdImageError::TiffError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for NdImageError {
    fn from(error: std::io::Error) -> Self {
        NdImageError::IoError(error)
    }
}

impl From<ndarray::ShapeError> for NdImageError {
    fn from(error: ndarray::ShapeError) -> Self {
        NdImageError::ArrayError(error)
    }
}

impl From<regex::Error> for NdImageError {
    fn from(error: regex::Error) -> Self {
        NdImageError::PatternError(error)
    }
}

impl From<walkdir::Error> for NdImageError {
    fn from(error: walkdir::Error) -> Self {
        NdImageError::WalkError(error)
    }
}

impl From<serde_json::Error> for NdImageError {
    fn from(error: serde_json::Error) -> Self {
        NdImageError::JsonError(error)
    }
}

impl From<ndarray_npy::ReadNpyError> for NdImageError {
    fn from(error: ndarray_npy::ReadNpyError) -> Self {
        NdImageError::NpyReadError(error)
    }
}

impl From<ndarray_npy::WriteNpyError> for NdImageError {
    fn from(error: ndarray_npy::WriteNpyError) -> Self {
        NdImageError::NpyWriteError(error)
    }
}

impl From<tiff::TiffError> for NdImageError {
    fn from(error: tiff::TiffError) -> Self {
        NdImageError::TiffError(error)
    }
}

impl From<String> for NdImageError {
    fn from(error: String) -> Self {
        NdImageError::Generic(error)
    }
}

impl From<&str> for NdImageError {
    fn from(error: &str) -> Self {
        NdImageError::Generic(error.to_string())
    }
}

/// Result type alias for nd_image_io operations
pub type Result<T> = std::result::Result<T, NdImageError>;
