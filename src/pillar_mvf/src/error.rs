//! Error types for binning, reduction and fusion.

use thiserror::Error;

/// Errors raised by the binning and reduction core.
///
/// Everything here is a caller contract violation detected at setup time
/// or at the input boundary. Out-of-range points are never an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MvfError {
    #[error("cell size must be finite and positive on every axis, got {0:?}")]
    InvalidCellSize([f32; 3]),

    #[error("range max must exceed range min on every axis (min={min:?}, max={max:?})")]
    InvalidRange { min: [f32; 3], max: [f32; 3] },

    #[error("grid extent on axis {axis} is zero (range too small for cell size)")]
    EmptyExtent { axis: usize },

    #[error("point rows need at least {min} columns, got {width}")]
    PointWidth { width: usize, min: usize },

    #[error("point buffer of length {len} is not a multiple of row width {width}")]
    RaggedPoints { len: usize, width: usize },

    #[error("point {row} has a non-finite value in column {column}")]
    NonFinitePoint { row: usize, column: usize },

    #[error("point {row} has batch id {value}, expected a non-negative integer")]
    InvalidBatchId { row: usize, value: f32 },

    #[error("expected {expected} input channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("channel list is empty")]
    EmptyChannelList,

    #[error("non-final PFN layer needs an even channel count, got {0}")]
    OddChannels(usize),

    #[error("stride list has {strides} entries but {expected} were expected")]
    StrideMismatch { strides: usize, expected: usize },

    #[error("stride must be positive")]
    ZeroStride,

    #[error("grid extent {extent} on keyed axis {axis} exceeds the {max} cells a key field holds")]
    ExtentTooLarge { axis: usize, extent: u32, max: u32 },

    #[error("cell key field {field} value {value} exceeds the {bits}-bit key budget")]
    KeyOverflow { field: usize, value: u64, bits: u32 },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
}

pub type Result<T> = std::result::Result<T, MvfError>;
