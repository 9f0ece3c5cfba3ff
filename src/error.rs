// error.rs -- Error type for the tracking pipeline.
//
// Contract violations that the caller can recover from (wrong buffer sizes,
// too many features for the tracker, bad configuration) come back as
// `TrackingError`. Numerical failure of a single track is not an error: it
// is reported through `KeyPoint::stale`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("image buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    ImageBufferMismatch {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("image {width}x{height} too small for the pyramid, each side needs at least {min_side} pixels")]
    ImageTooSmall {
        width: usize,
        height: usize,
        min_side: usize,
    },

    #[error("pyramid buffer holds {provided} bytes, levels 1.. need {required}")]
    PyramidBufferTooSmall { required: usize, provided: usize },

    #[error("patch pyramid capacity exceeded: {count} features, max {capacity}")]
    CapacityExceeded { count: usize, capacity: usize },

    #[error("cannot track {count} features, tracker capacity is {capacity}")]
    TooManyFeatures { count: usize, capacity: usize },

    #[error("output keypoint buffer holds {provided} entries, need {required}")]
    OutputBufferTooSmall { required: usize, provided: usize },

    #[error("frame holds {actual} bytes, expected {expected}")]
    FrameSizeMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed reference entry {token:?}: {reason}")]
    ReferenceParse { token: String, reason: String },
}
