use thiserror::Error;

#[derive(Error, Debug)]
pub enum LearnerError {
    // Descriptor errors
    #[error("Unsupported layer kind '{kind}' at index {index}")]
    UnsupportedLayerKind { index: usize, kind: String },

    #[error("Malformed params for '{kind}' at index {index}: {reason}")]
    MalformedParams {
        index: usize,
        kind: String,
        reason: String,
    },

    #[error("Descriptor error: {0}")]
    Descriptor(#[from] serde_json::Error),

    // Forward errors
    // Raised for both the parameter list and the running statistics list
    #[error("Parameter list has {actual} tensors but the architecture requires {expected}")]
    ParameterCountMismatch { expected: usize, actual: usize },

    #[error("Invalid input for '{kind}': {reason}")]
    InvalidInput { kind: &'static str, reason: String },

    #[error("Invalid learner config: {0}")]
    InvalidConfig(String),

    // Shape and dtype errors from the tensor runtime pass through untouched
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

pub type Result<T> = std::result::Result<T, LearnerError>;
