use thiserror::Error;

// Nothing in here is fatal. The middle layer logs these and carries on;
// out-of-range parameter values never show up here because they get clamped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("cell ({track}, {step}) is outside the grid")]
    InvalidIndex { track: usize, step: usize },

    #[error("no track with index {0}")]
    InvalidTrack(usize),

    #[error("invalid note name: {0:?}")]
    InvalidNote(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}
