use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    /// A value struct failed validation before encoding.
    #[error("invalid scene value: {0}")]
    Invalid(String),

    #[error(transparent)]
    Encode(#[from] bincode::Error),
}

pub type SceneResult<T> = Result<T, SceneError>;
