//! Error type shared by every model in the crate.

use thiserror::Error;

/// Errors raised by model construction, trajectory generation and persistence.
///
/// Every error is raised synchronously at the offending call and none of them
/// is transient, so nothing in the crate retries on failure.
#[derive(Debug, Error)]
pub enum SynthError {
    /// Malformed transition matrix (shape, negativity, row sums).
    #[error("invalid transition matrix: {0}")]
    Validation(String),
    /// A backmapper with this name is already registered.
    #[error("backmapper '{0}' is already registered")]
    DuplicateBackmapper(String),
    /// No backmapper with this name is registered.
    #[error("no backmapper named '{0}'")]
    MissingBackmapper(String),
    /// A stored model decoded to a different model kind than requested.
    #[error("model type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    /// Degenerate length or a state index outside `[0, n_states)`.
    #[error("out of bounds: {0}")]
    Bounds(String),
    /// A backmapper could not map a state.
    #[error("backmapping failed: {0}")]
    Backmap(String),
    /// The registry holds a backmapper without a stored form.
    #[error("backmapper '{0}' has no stored form and cannot be serialized")]
    NotPersistable(String),
    /// Bytes are not a model blob this version understands.
    #[error("invalid model file: {0}")]
    Format(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type SynthResult<T> = Result<T, SynthError>;
